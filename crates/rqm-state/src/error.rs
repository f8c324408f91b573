//! Error types for rqm-state

use thiserror::Error;

use crate::resource::{ResourceId, ResourceType};

/// Result type for resource client operations
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Errors surfaced by a `ResourceClient` implementation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The requested resource does not exist on the remote side
    #[error("{resource_type} '{id}' not found")]
    NotFound {
        resource_type: ResourceType,
        id: ResourceId,
    },

    /// Login rejected or session no longer valid
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The service refused the request (validation, server error, ...)
    #[error("remote error{}: {message}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Remote {
        status: Option<u16>,
        message: String,
    },

    /// The service answered but the body could not be interpreted
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Network-level failure
    #[error("transport error: {0}")]
    Transport(String),

    /// A create/replace was attempted without a rendered document
    #[error("payload for {0} has no document to send")]
    MissingDocument(ResourceType),
}

impl ClientError {
    /// Shorthand for a remote rejection without a status code.
    pub fn remote(message: impl Into<String>) -> Self {
        ClientError::Remote {
            status: None,
            message: message.into(),
        }
    }

    /// Whether this error means the session cannot continue.
    pub fn is_authentication(&self) -> bool {
        matches!(self, ClientError::Authentication(_))
    }

    /// Whether this error is a plain "does not exist".
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound { .. })
    }
}
