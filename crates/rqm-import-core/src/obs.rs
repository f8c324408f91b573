//! Structured observability hooks for the import lifecycle.
//!
//! This module provides:
//! - An import-scoped span (`import_span`) the engine runs inside
//! - Emission functions for lifecycle events: start, per-test outcome, finish, abort
//!
//! Events are emitted at `info!` level; filter with `RUST_LOG`.

use tracing::{info, warn, Span};

/// Span tagged with the import id; attach with `Instrument::instrument`.
pub fn import_span(import_id: &str) -> Span {
    tracing::info_span!("robotlog2rqm.import", import_id = %import_id)
}

/// Emit event: import started against a test plan.
pub fn emit_import_started(import_id: &str, testplan: &str, tests: usize, dry_run: bool) {
    info!(
        event = "import.started",
        import_id = %import_id,
        testplan = %testplan,
        tests = tests,
        dry_run = dry_run,
    );
}

/// Emit event: one test case processed.
pub fn emit_test_processed(test: &str, outcome: &str) {
    info!(event = "import.test_processed", test = %test, outcome = %outcome);
}

/// Emit event: import finished with totals.
pub fn emit_import_finished(
    import_id: &str,
    duration_ms: u64,
    imported: usize,
    skipped: usize,
    failed: usize,
) {
    info!(
        event = "import.finished",
        import_id = %import_id,
        duration_ms = duration_ms,
        imported = imported,
        skipped = skipped,
        failed = failed,
    );
}

/// Emit event: import aborted by a fatal error (warning level).
pub fn emit_import_aborted(import_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "import.aborted", import_id = %import_id, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_span_create() {
        let span = import_span("test-import");
        let _entered = span.enter();
        emit_test_processed("t", "imported");
    }
}
