//! Classified storage failures.
//!
//! Every blob operation reports one of five kinds of failure so the HTTP
//! layer can pick a status code without inspecting SDK or transport errors.

use thiserror::Error;

use crate::identity::CredentialError;

/// A failed blob operation.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The service endpoint, container or client setup is unusable.
    #[error("storage configuration error: {message}")]
    Configuration { message: String },

    /// The credential was rejected by the identity provider or the storage service.
    #[error("storage authentication failed: {message}")]
    Authentication {
        status: Option<u16>,
        message: String,
    },

    /// The named blob does not exist.
    #[error("blob not found: {name}")]
    NotFound { name: String },

    /// Connectivity problem or a service-side failure worth retrying later.
    #[error("storage service unavailable: {message}")]
    Transient {
        status: Option<u16>,
        message: String,
    },

    /// Anything else.
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

/// The taxonomy without payloads, for metrics labels and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Authentication,
    NotFound,
    Transient,
    Unexpected,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Authentication => "authentication",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Transient => "transient",
            ErrorKind::Unexpected => "unexpected",
        }
    }
}

impl StorageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::Configuration { .. } => ErrorKind::Configuration,
            StorageError::Authentication { .. } => ErrorKind::Authentication,
            StorageError::NotFound { .. } => ErrorKind::NotFound,
            StorageError::Transient { .. } => ErrorKind::Transient,
            StorageError::Unexpected(_) => ErrorKind::Unexpected,
        }
    }

    /// Classify a transport-level failure from the HTTP client.
    pub fn from_transport(context: &str, err: reqwest::Error) -> Self {
        if err.is_builder() {
            StorageError::Configuration {
                message: format!("{context}: {err}"),
            }
        } else if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
            StorageError::Transient {
                status: None,
                message: format!("{context}: {err}"),
            }
        } else {
            StorageError::Unexpected(anyhow::anyhow!("{context}: {err}"))
        }
    }
}

impl From<CredentialError> for StorageError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::InvalidEndpoint { .. } => StorageError::Configuration {
                message: err.to_string(),
            },
            CredentialError::Unreachable(_) => StorageError::Transient {
                status: None,
                message: err.to_string(),
            },
            CredentialError::Rejected { status, .. } if is_transient_status(status) => {
                StorageError::Transient {
                    status: Some(status),
                    message: err.to_string(),
                }
            }
            CredentialError::Rejected { status, .. } => StorageError::Authentication {
                status: Some(status),
                message: err.to_string(),
            },
            CredentialError::InvalidResponse(_) => StorageError::Unexpected(err.into()),
        }
    }
}

/// Statuses that indicate a temporary condition on the remote side.
pub fn is_transient_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

// -- Tests --------------------------------------------------------------------
