//! Human and machine-readable import reports.
//!
//! - `ConsoleReporter`: one line per event, `DRYRUN` prefix in dry runs
//! - `ImportReport`: JSON artifact with every event plus the summary

use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rqm_state::{ResourceId, ResourceType};
use serde::{Deserialize, Serialize};

use crate::domain::{LogSource, Policy};
use crate::events::{Action, ImportEvent, ImportSummary, ReportSink};

// ── console ───────────────────────────────────────────────────────────────

/// Render one event as console text.
pub fn format_event(event: &ImportEvent) -> String {
    match event {
        ImportEvent::RunStarted {
            testplan,
            tests,
            sources,
            ..
        } => format!(
            "Importing {tests} test(s) from {} file(s) into test plan {testplan}",
            sources.len()
        ),
        ImportEvent::Action(a) => {
            let label = a.resource_type.label();
            let id = a.id.as_ref().map(ToString::to_string).unwrap_or_default();
            match a.action {
                Action::Created => format!("Created {label} '{}' with ID {id}", a.key),
                Action::Reused => format!("Found existing {label} '{}' with ID {id}", a.key),
                Action::Updated => format!("Updated {label} '{}' with ID {id}", a.key),
                Action::Skipped if a.key.is_empty() => {
                    format!("Skipped {label}: no value in metadata")
                }
                Action::Skipped => format!("Skipped {label} '{}'", a.key),
                Action::Linked => format!("Linked {label} {id} to test plan {}", a.key),
            }
        }
        ImportEvent::Warning { message, .. } => format!("WARNING: {message}"),
        ImportEvent::TestCaseFailed {
            test,
            resource_type,
            error,
        } => format!(
            "ERROR: test '{test}' failed at {}: {error}",
            resource_type.label()
        ),
        ImportEvent::Summary(s) => render_summary(s),
    }
}

fn render_summary(s: &ImportSummary) -> String {
    let mut out = format!(
        "Import summary: {} test(s), {} imported, {} skipped, {} failed",
        s.tests_total, s.tests_imported, s.tests_skipped, s.tests_failed
    );
    for resource_type in ResourceType::ALL {
        let Some(c) = s.by_type.get(&resource_type) else {
            continue;
        };
        out.push_str(&format!(
            "\n  {:<17} created {}, reused {}, updated {}, skipped {}, failed {}, linked {}",
            resource_type.label(),
            c.created,
            c.reused,
            c.updated,
            c.skipped,
            c.failed,
            c.linked
        ));
    }
    out
}

/// Prints events as plain lines.
pub struct ConsoleReporter<W: Write + Send = std::io::Stdout> {
    out: Mutex<W>,
    dry_run: bool,
}

impl ConsoleReporter<std::io::Stdout> {
    pub fn stdout(dry_run: bool) -> Self {
        Self::new(std::io::stdout(), dry_run)
    }
}

impl<W: Write + Send> ConsoleReporter<W> {
    pub fn new(out: W, dry_run: bool) -> Self {
        Self {
            out: Mutex::new(out),
            dry_run,
        }
    }

    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write + Send> ReportSink for ConsoleReporter<W> {
    fn emit(&self, event: &ImportEvent) {
        let prefix = if self.dry_run { "DRYRUN " } else { "" };
        let Ok(mut out) = self.out.lock() else {
            return;
        };
        for line in format_event(event).lines() {
            // Console output is best effort.
            let _ = writeln!(out, "{prefix}{line}");
        }
    }
}

// ── import_report.json ────────────────────────────────────────────────────

/// JSON report of one import.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImportReport {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub import_id: Option<String>,
    pub testplan: Option<ResourceId>,
    pub policy: Option<Policy>,
    pub sources: Vec<LogSource>,
    pub events: Vec<ImportEvent>,
    pub summary: Option<ImportSummary>,
    /// Fatal error that aborted the import, if any.
    pub error: Option<String>,
}

impl ImportReport {
    pub const SCHEMA_VERSION: &'static str = "1.0";

    /// Build a report from the events an import emitted.
    pub fn from_events(events: Vec<ImportEvent>) -> Self {
        let mut report = Self {
            schema_version: Self::SCHEMA_VERSION.to_string(),
            generated_at: Utc::now(),
            import_id: None,
            testplan: None,
            policy: None,
            sources: Vec::new(),
            events: Vec::new(),
            summary: None,
            error: None,
        };
        for event in &events {
            match event {
                ImportEvent::RunStarted {
                    import_id,
                    testplan,
                    policy,
                    sources,
                    ..
                } => {
                    report.import_id = Some(import_id.clone());
                    report.testplan = Some(testplan.clone());
                    report.policy = Some(*policy);
                    report.sources = sources.clone();
                }
                ImportEvent::Summary(s) => report.summary = Some(s.clone()),
                _ => {}
            }
        }
        report.events = events;
        report
    }

    pub fn with_error(mut self, error: &dyn std::fmt::Display) -> Self {
        self.error = Some(error.to_string());
        self
    }

    /// Write the report as pretty JSON.
    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
    }
}
