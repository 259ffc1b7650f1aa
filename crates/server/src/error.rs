use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum Error {
    // Auth Errors
    #[error("Login failed")]
    LoginFail,
    #[error("No auth token found")]
    AuthFailNoToken,
    #[error("Auth token wrong format")]
    AuthFailTokenWrongFormat,
    #[error("Auth context missing")]
    AuthFailCtxNotInRequestExt,

    // Domain Errors
    /// Empty text, self-addressed message, malformed input
    #[error("{0}")]
    Validation(String),
    /// Unknown sender, receiver or user
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),

    // Generic
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = core::result::Result<T, Error>;

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::LoginFail | Error::AuthFailNoToken | Error::AuthFailTokenWrongFormat => {
                StatusCode::UNAUTHORIZED
            }
            Error::AuthFailCtxNotInRequestExt => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::Database(_) | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Don't leak storage details to callers
        let error_message = match &self {
            Error::Database(e) => {
                error!("Database error: {}", e);
                "Internal storage error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": {
                "message": error_message
            }
        }));

        (status, body).into_response()
    }
}

impl From<bcrypt::BcryptError> for Error {
    fn from(err: bcrypt::BcryptError) -> Self {
        Error::Internal(err.to_string())
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Internal(err.to_string())
    }
}
