//! Domain models for the importer.
//!
//! - `Run` / `TestCase`: the parsed log
//! - `Policy`: what the engine is allowed to change
//! - `ImportError` / `TestCaseError`: fatal and per-test failures

pub mod error;
pub mod policy;
pub mod run;

pub use error::{ImportError, MappingError, ResolutionStep, Result, TestCaseError};
pub use policy::Policy;
pub use run::{keys, LogSource, Metadata, Run, TestCase, TestStatus};
