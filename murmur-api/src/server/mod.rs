use axum::{
    Router,
    extract::{
        FromRef, Request,
        multipart::{MultipartError, MultipartRejection},
        rejection::{JsonRejection, PathRejection},
    },
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
};
use axum_extra::typed_header::TypedHeaderRejection;
use json::Json;
use murmur_common::model::{
    Id, ModelValidationError,
    auth::{AuthTokenDecodeError, AuthTokenHashError},
    credential::PasswordHashError,
    post::{CommentMarker, PostMarker},
    user::UserMarker,
};
use murmur_db::client::{DbClient, DbError};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use time::Duration;
use tracing::error;

mod auth;
mod json;
mod multipart;
mod routes;

pub type ServerRouter = Router<ServerState>;

/// Session lifetime applied at signin; `None` means issued tokens never
/// expire.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct SessionTtl(pub Option<Duration>);

#[derive(Clone, Debug, FromRef)]
pub struct ServerState {
    pub db_client: Arc<DbClient>,
    pub session_ttl: SessionTtl,
}

pub fn routes() -> ServerRouter {
    routes::routes().fallback(fallback)
}

pub async fn fallback(request: Request) -> ServerError {
    ServerError::UnknownRoute(request.into_parts().0.uri)
}

pub type Result<T, E = ServerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Unknown route requested: {0}")]
    UnknownRoute(Uri),
    #[error("Path rejected: {0}")]
    PathRejection(#[from] PathRejection),
    #[error("Incoming JSON rejected: {0}")]
    JsonRejection(#[from] JsonRejection),
    #[error("Incoming multipart form rejected: {0}")]
    MultipartRejection(#[from] MultipartRejection),
    #[error("Reading the multipart form failed: {0}")]
    Multipart(#[from] MultipartError),
    #[error("JSON response could not be serialized: {0}")]
    JsonResponse(#[from] serde_json::Error),
    #[error(transparent)]
    Validation(#[from] ModelValidationError),
    #[error("The password could not be hashed: {0}")]
    PasswordHash(#[from] PasswordHashError),
    #[error("Authorization header or token cookie is required")]
    MissingToken,
    #[error("Authorization header was invalid: {0}")]
    InvalidAuthorizationHeader(TypedHeaderRejection),
    #[error("The provided auth token could not be decoded: {0}")]
    InvalidAuthToken(#[from] AuthTokenDecodeError),
    #[error("The auth token could not be hashed: {0}")]
    AuthTokenHash(#[from] AuthTokenHashError),
    #[error("Provided token was invalid")]
    InvalidToken,
    #[error("User not found")]
    UserByEmailNotFound,
    #[error("Email and password don't match.")]
    InvalidCredential,
    #[error("User is not authorized")]
    NotAuthorized,
    #[error("Users cannot follow themselves")]
    SelfFollow,
    #[error(transparent)]
    Database(#[from] DbError),
    #[error("User with id {0} was not found.")]
    UserByIdNotFound(Id<UserMarker>),
    #[error("Post with id {0} was not found.")]
    PostByIdNotFound(Id<PostMarker>),
    #[error("Comment with id {0} was not found.")]
    CommentByIdNotFound(Id<CommentMarker>),
}

impl ServerError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::UnknownRoute(_)
            | ServerError::PathRejection(_)
            | ServerError::UserByIdNotFound(_)
            | ServerError::PostByIdNotFound(_)
            | ServerError::CommentByIdNotFound(_)
            | ServerError::Database(DbError::MissingReference) => StatusCode::NOT_FOUND,
            ServerError::MissingToken
            | ServerError::InvalidAuthorizationHeader(_)
            | ServerError::InvalidAuthToken(_)
            | ServerError::InvalidToken
            | ServerError::UserByEmailNotFound
            | ServerError::InvalidCredential => StatusCode::UNAUTHORIZED,
            ServerError::NotAuthorized => StatusCode::FORBIDDEN,
            ServerError::JsonRejection(_)
            | ServerError::MultipartRejection(_)
            | ServerError::Multipart(_)
            | ServerError::Validation(_)
            | ServerError::SelfFollow
            | ServerError::Database(DbError::DuplicateEmail | DbError::SelfReference) => {
                StatusCode::BAD_REQUEST
            }
            ServerError::JsonResponse(_)
            | ServerError::PasswordHash(_)
            | ServerError::AuthTokenHash(_)
            | ServerError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();

        error!(error = %self, %status, "Replying with error");

        let error_response = ErrorResponse {
            error: self.to_string(),
        };
        (status, Json(error_response)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use crate::server::ServerError;
    use axum::http::StatusCode;
    use murmur_common::model::{
        Id, ModelValidationError, credential::InvalidPasswordError, post::InvalidPostTextError,
    };
    use murmur_db::client::DbError;

    #[test]
    fn validation_failures_are_bad_requests() {
        let errors = [
            ServerError::Validation(ModelValidationError::Password(
                InvalidPasswordError::TooShort,
            )),
            ServerError::Validation(ModelValidationError::PostText(
                InvalidPostTextError::Missing,
            )),
            ServerError::SelfFollow,
            ServerError::Database(DbError::DuplicateEmail),
        ];

        for error in errors {
            assert_eq!(error.status(), StatusCode::BAD_REQUEST, "{error}");
        }
    }

    #[test]
    fn credential_failures_are_unauthorized() {
        assert_eq!(
            ServerError::UserByEmailNotFound.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ServerError::InvalidCredential.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ServerError::MissingToken.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ServerError::InvalidToken.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn ownership_failures_are_forbidden() {
        assert_eq!(ServerError::NotAuthorized.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn missing_resources_are_not_found() {
        assert_eq!(
            ServerError::UserByIdNotFound(Id::random()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServerError::PostByIdNotFound(Id::random()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServerError::Database(DbError::MissingReference).status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn error_body_shape() {
        let error = ServerError::InvalidCredential;
        assert_eq!(error.to_string(), "Email and password don't match.");
    }
}
