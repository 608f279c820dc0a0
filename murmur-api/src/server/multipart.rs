use crate::server::ServerError;
use axum::extract::{FromRequest, Multipart as AxumMultipart, Request};

/// [`AxumMultipart`] with the rejection routed through [`ServerError`], so
/// malformed forms get the same error body as everything else.
#[derive(Debug)]
pub struct Multipart(pub AxumMultipart);

impl<S> FromRequest<S> for Multipart
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        AxumMultipart::from_request(req, state)
            .await
            .map(Self)
            .map_err(ServerError::from)
    }
}
