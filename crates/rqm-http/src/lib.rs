//! RQM HTTP adapter
//!
//! Implements [`rqm_state::ResourceClient`] on top of the RQM / ETM
//! integration service REST API:
//!
//! - form login with `j_security_check` and the `X-Jazz-CSRF-Prevent` token
//! - project and team area lookup through the process API
//! - Atom feed paging for queries
//! - XML document create / replace, plus test plan link patching

pub mod client;
pub mod config;
pub mod error;
pub mod xml;

pub use client::RqmClient;
pub use config::RqmConfig;
pub use error::{Result, RqmError};
