use crate::server::{
    Result, ServerError, ServerRouter, SessionTtl, auth::TOKEN_COOKIE, json::Json,
    routes::MessageResponse,
};
use axum::extract::State;
use axum_extra::{
    extract::cookie::{Cookie, CookieJar},
    routing::{RouterExt, TypedPath},
};
use murmur_common::model::{
    auth::{AuthToken, Session},
    user::UserSummary,
};
use murmur_db::client::DbClient;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::UtcDateTime;

pub fn routes() -> ServerRouter {
    ServerRouter::new().typed_post(signin).typed_get(signout)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/auth/signin", rejection(ServerError))]
struct SigninPath();

// No Debug derive: the request carries the plaintext password.
#[derive(Clone, Eq, PartialEq, Deserialize)]
struct SigninRequest {
    email: String,
    password: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
struct SigninResponse {
    token: String,
    user: UserSummary,
}

async fn signin(
    SigninPath(): SigninPath,
    State(db): State<Arc<DbClient>>,
    State(SessionTtl(session_ttl)): State<SessionTtl>,
    jar: CookieJar,
    Json(request): Json<SigninRequest>,
) -> Result<(CookieJar, Json<SigninResponse>)> {
    let (user, credential) = db
        .fetch_credential_by_email(&request.email)
        .await?
        .ok_or(ServerError::UserByEmailNotFound)?;

    if !credential.verify(&request.password)? {
        return Err(ServerError::InvalidCredential);
    }

    let token = AuthToken::generate_random(user.id);
    let session = Session {
        user: user.id,
        token_hash: token.hash()?,
        created_at: UtcDateTime::now(),
        expires_after: session_ttl,
    };
    db.create_session(&session).await?;

    let token_str = token.as_token_str();
    let jar = jar.add(
        Cookie::build((TOKEN_COOKIE, token_str.clone()))
            .path("/")
            .http_only(true),
    );

    Ok((
        jar,
        Json(SigninResponse {
            token: token_str,
            user,
        }),
    ))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/auth/signout", rejection(ServerError))]
struct SignoutPath();

/// Deletes the session row when the cookie still carries a valid token, so
/// the token is dead server-side as well, then clears the cookie.
async fn signout(
    SignoutPath(): SignoutPath,
    State(db): State<Arc<DbClient>>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<MessageResponse>)> {
    if let Some(cookie) = jar.get(TOKEN_COOKIE)
        && let Ok(token) = cookie.value().parse::<AuthToken>()
    {
        db.delete_session(&token.hash()?).await?;
    }

    let jar = jar.remove(Cookie::build(TOKEN_COOKIE).path("/"));

    Ok((jar, Json(MessageResponse { message: "signed out" })))
}
