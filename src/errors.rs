//! HTTP error responses.
//!
//! [`ApiError`] implements [`axum::response::IntoResponse`] so handlers can
//! return `Err(ApiError::BlobNotFound { .. })` directly.  Storage failures
//! convert through [`From<StorageError>`], keeping their classification.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use crate::storage::StorageError;

/// Response header carrying the request ID.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Generate a 16-character hex request ID.
pub fn generate_request_id() -> String {
    let bytes: [u8; 8] = rand::random();
    hex::encode(bytes).to_uppercase()
}

/// Errors returned by the HTTP surface.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A required query parameter is absent.
    #[error("Required query parameter '{name}' is missing")]
    MissingParameter { name: &'static str },

    /// A request argument is invalid.
    #[error("{message}")]
    InvalidArgument { message: String },

    /// The requested blob does not exist.
    #[error("The specified blob does not exist")]
    BlobNotFound { name: String },

    /// The service identity was rejected.
    #[error("The service is not authorized to access the storage container")]
    AuthenticationFailed { message: String },

    /// The storage service or identity endpoint is temporarily unavailable.
    #[error("The storage service is temporarily unavailable, please try again")]
    ServiceUnavailable { message: String },

    /// The storage settings of this service are unusable.
    #[error("The storage service is misconfigured")]
    ConfigurationError { message: String },

    /// Catch-all for unexpected internal errors.
    #[error("We encountered an internal error, please try again.")]
    InternalError(#[from] anyhow::Error),
}

impl ApiError {
    /// Return the error code string used in response bodies.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::MissingParameter { .. } => "MissingParameter",
            ApiError::InvalidArgument { .. } => "InvalidArgument",
            ApiError::BlobNotFound { .. } => "BlobNotFound",
            ApiError::AuthenticationFailed { .. } => "AuthenticationFailed",
            ApiError::ServiceUnavailable { .. } => "ServiceUnavailable",
            ApiError::ConfigurationError { .. } => "ConfigurationError",
            ApiError::InternalError(_) => "InternalError",
        }
    }

    /// Return the appropriate HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MissingParameter { .. } => StatusCode::BAD_REQUEST,
            ApiError::InvalidArgument { .. } => StatusCode::BAD_REQUEST,
            ApiError::BlobNotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::AuthenticationFailed { .. } => StatusCode::FORBIDDEN,
            ApiError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::ConfigurationError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Internal detail for logs; never sent to the caller.
    fn detail(&self) -> String {
        match self {
            ApiError::BlobNotFound { name } => format!("blob '{name}'"),
            ApiError::AuthenticationFailed { message }
            | ApiError::ServiceUnavailable { message }
            | ApiError::ConfigurationError { message } => message.clone(),
            ApiError::InternalError(e) => format!("{e:#}"),
            other => other.to_string(),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { name } => ApiError::BlobNotFound { name },
            StorageError::Authentication { message, .. } => {
                ApiError::AuthenticationFailed { message }
            }
            StorageError::Transient { message, .. } => ApiError::ServiceUnavailable { message },
            StorageError::Configuration { message } => ApiError::ConfigurationError { message },
            StorageError::Unexpected(e) => ApiError::InternalError(e),
        }
    }
}

/// JSON error body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    code: &'a str,
    message: String,
    request_id: &'a str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let request_id = generate_request_id();
        let status = self.status_code();

        if status.is_server_error() {
            error!(
                request_id = %request_id,
                code = self.code(),
                "Request failed: {}",
                self.detail()
            );
        } else {
            warn!(
                request_id = %request_id,
                code = self.code(),
                "Request rejected: {}",
                self.detail()
            );
        }

        let body = ErrorBody {
            code: self.code(),
            message: self.to_string(),
            request_id: &request_id,
        };
        let body = serde_json::to_string(&body).unwrap_or_default();

        (
            status,
            [
                ("content-type", "application/json".to_string()),
                (REQUEST_ID_HEADER, request_id),
            ],
            body,
        )
            .into_response()
    }
}

// -- Tests --------------------------------------------------------------------
