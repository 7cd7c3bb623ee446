//! Custom Axum extractors.

use crate::AppError;
use axum::{
    Json, async_trait,
    extract::{FromRequest, Request, rejection::JsonRejection},
};
use serde::de::DeserializeOwned;

/// JSON request body whose rejections are [`AppError`]s.
///
/// Any body Axum's `Json` would refuse (wrong content type, invalid JSON,
/// missing or mistyped fields) becomes a 400 with code `BAD_REQUEST` and the
/// rejection text as message.
///
/// # Example
///
/// ```ignore
/// async fn create(JsonBody(request): JsonBody<ReservationRequest>) -> WebResult<StatusCode> {
///     // ...
/// }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBody<T>(pub T);

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(format!("Malformed request body: {}", rejection.body_text()))
    }
}

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}
