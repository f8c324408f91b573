//! Connection settings for an RQM server.

use std::fmt;

const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Connection settings for one RQM project.
#[derive(Clone)]
pub struct RqmConfig {
    /// Server root, e.g. `https://rqm.example.com:9443`. No trailing slash.
    pub host: String,
    /// Project area name as shown in the web UI.
    pub project: String,
    pub user: String,
    pub password: String,
    /// RQM servers commonly run with self-signed certificates (default: true)
    pub accept_invalid_certs: bool,
    /// Per-request timeout (default: 60)
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl RqmConfig {
    pub fn new(
        host: impl Into<String>,
        project: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let host: String = host.into();
        Self {
            host: host.trim_end_matches('/').to_string(),
            project: project.into(),
            user: user.into(),
            password: password.into(),
            accept_invalid_certs: true,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: format!("robotlog2rqm/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn with_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Apply optional connection settings from the environment.
    ///
    /// Reads:
    /// - RQM_ACCEPT_INVALID_CERTS (default: "true")
    /// - RQM_TIMEOUT_SECS (default: 60)
    pub fn with_env_overrides(self) -> Self {
        self.with_lookup(|key| std::env::var(key).ok())
    }

    fn with_lookup(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = lookup("RQM_ACCEPT_INVALID_CERTS") {
            self.accept_invalid_certs = !matches!(v.to_lowercase().as_str(), "false" | "0" | "no");
        }
        if let Some(secs) = lookup("RQM_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.timeout_secs = secs;
        }
        self
    }
}

impl fmt::Debug for RqmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RqmConfig")
            .field("host", &self.host)
            .field("project", &self.project)
            .field("user", &self.user)
            .field("password", &"***")
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}
