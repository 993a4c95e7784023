use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;
use tracing::debug;
use validator::Validate;

use crate::error::ApiError;
use crate::response::FieldError;

/// JSON body that has been deserialized and validated. Any failure becomes a
/// 422 [`ApiError::Validation`].
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| {
                debug!(error = %rejection, "rejected request body");
                ApiError::Validation(vec![FieldError::body(
                    None,
                    rejection.body_text(),
                    rejection_kind(&rejection),
                )])
            })?;

        value.validate().map_err(|errors| {
            debug!(error = %errors, "request body failed validation");
            ApiError::Validation(FieldError::from_validation(&errors))
        })?;

        Ok(Self(value))
    }
}

fn rejection_kind(rejection: &JsonRejection) -> &'static str {
    match rejection {
        JsonRejection::JsonDataError(_) => "json_data",
        JsonRejection::JsonSyntaxError(_) => "json_invalid",
        JsonRejection::MissingJsonContentType(_) => "content_type",
        _ => "body",
    }
}
