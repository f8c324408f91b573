//! Robot Framework result files
//!
//! Locates `output.xml` files and parses them into the [`rqm_import_core::Run`]
//! log model consumed by the import engine.

pub mod discover;
pub mod error;
pub mod parser;

use std::path::Path;

pub use discover::discover_result_files;
pub use error::{LogError, Result};
pub use parser::{parse_file, parse_files};

use rqm_import_core::Run;

/// Discover result files under `path` and parse them into one run.
pub fn load_run(path: &Path, recursive: bool) -> Result<Run> {
    let files = discover_result_files(path, recursive)?;
    parse_files(&files)
}
