//! Error types for rqm-http

use rqm_state::ClientError;
use thiserror::Error;

/// Errors raised while establishing an RQM session.
///
/// Once connected, every call reports through [`ClientError`] instead.
#[derive(Error, Debug)]
pub enum RqmError {
    #[error("invalid RQM host URL '{0}'")]
    InvalidHost(String),

    #[error("could not find project with name '{0}'")]
    ProjectNotFound(String),

    /// Login succeeded but the server set no session cookie.
    #[error("could not get JSESSIONID from login response")]
    MissingSession,

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error(transparent)]
    Client(#[from] ClientError),
}

impl RqmError {
    pub fn is_authentication(&self) -> bool {
        matches!(self, RqmError::Client(e) if e.is_authentication())
    }
}

pub type Result<T> = std::result::Result<T, RqmError>;
