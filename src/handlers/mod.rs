use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
};

use crate::errors::ServiceError;

pub mod health;
pub mod orders;
pub mod promotions;

/// Request-body extractor that keeps decode failures on the JSON error
/// envelope. The stock extractor answers malformed bodies with plain
/// text and its own status codes.
pub struct AppJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for AppJson<T>
where
    axum::Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(ServiceError::validation_failed(
                "Validation failed",
                vec![rejection.body_text()],
            )),
        }
    }
}
