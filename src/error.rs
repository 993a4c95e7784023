use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::error;

use crate::db::DbError;
use crate::response::{Envelope, FieldError};

/// Error returned by request handlers; always rendered as an [`Envelope`].
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Validation Error")]
    Validation(Vec<FieldError>),

    /// Business-rule conflict on a unique field (400).
    #[error("{message}")]
    Duplicate {
        field: &'static str,
        message: String,
    },

    #[error(transparent)]
    Database(#[from] DbError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Duplicate { .. } => StatusCode::BAD_REQUEST,
            Self::Database(DbError::Uninitialized) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Database(DbError::Conflict(_)) => StatusCode::CONFLICT,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, %status, "request failed");
        }

        // Server-side details stay in the logs.
        let body = match self {
            Self::Validation(errors) => Envelope::failure("Validation Error", Some(errors)),
            Self::Duplicate { field, message } => {
                let detail = FieldError::body(Some(field), message.clone(), "duplicate");
                Envelope::failure(message, Some(vec![detail]))
            }
            Self::Database(DbError::Conflict(_)) => Envelope::failure("Conflict", None),
            _ => Envelope::failure(
                status.canonical_reason().unwrap_or("Internal Server Error"),
                None,
            ),
        };

        (status, Json(body)).into_response()
    }
}
