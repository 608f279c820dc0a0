use crate::server::ServerError;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::{TypedHeader, extract::CookieJar};
use headers::{Authorization, authorization::Bearer};
use murmur_common::model::{Id, auth::AuthToken, user::UserMarker};
use murmur_db::client::DbClient;
use std::sync::Arc;
use time::UtcDateTime;

/// Cookie mirroring the bearer token, set at signin for clients that prefer
/// cookie transport.
pub const TOKEN_COOKIE: &str = "t";

type AuthorizationHeader = TypedHeader<Authorization<Bearer>>;

/// The verified identity of the requester, resolved per request from the
/// `Authorization` header or the token cookie. Handlers that need the
/// caller's identity take this as an argument; there is no ambient auth
/// state anywhere.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct AuthenticatedUser {
    id: Id<UserMarker>,
}

impl AuthenticatedUser {
    #[must_use]
    pub fn user_id(self) -> Id<UserMarker> {
        self.id
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<DbClient>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let raw_token = match AuthorizationHeader::from_request_parts(parts, state).await {
            Ok(header) => header.token().to_owned(),
            Err(rejection) if rejection.is_missing() => CookieJar::from_headers(&parts.headers)
                .get(TOKEN_COOKIE)
                .map(|cookie| cookie.value().to_owned())
                .ok_or(ServerError::MissingToken)?,
            Err(rejection) => return Err(ServerError::InvalidAuthorizationHeader(rejection)),
        };

        let request_token: AuthToken = raw_token.parse()?;
        let token_hash = request_token.hash()?;

        let db = Arc::<DbClient>::from_ref(state);
        let session = db
            .fetch_session(&token_hash)
            .await?
            .ok_or(ServerError::InvalidToken)?;

        if session.is_expired(UtcDateTime::now()) {
            // A dead session will never verify again; drop the row so the
            // table does not accumulate expired tokens.
            db.delete_session(&token_hash).await?;
            return Err(ServerError::InvalidToken);
        }

        Ok(Self { id: session.user })
    }
}
