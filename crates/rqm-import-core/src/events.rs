//! Import events and report sinks.
//!
//! The engine narrates every decision as an `ImportEvent`. Sinks decide what
//! to do with them: keep them (tests, JSON report), log them, or print them.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use rqm_state::{ResourceId, ResourceType};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::{LogSource, Policy};

/// Identifier of a resource as far as this run knows it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedId {
    /// Assigned by the remote service.
    Remote(ResourceId),
    /// Stand-in for a resource a dry run would have created.
    Planned(u64),
}

impl ResolvedId {
    pub fn remote(&self) -> Option<&ResourceId> {
        match self {
            ResolvedId::Remote(id) => Some(id),
            ResolvedId::Planned(_) => None,
        }
    }

    pub fn is_planned(&self) -> bool {
        matches!(self, ResolvedId::Planned(_))
    }
}

impl std::fmt::Display for ResolvedId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolvedId::Remote(id) => write!(f, "{id}"),
            ResolvedId::Planned(n) => write!(f, "planned-{n}"),
        }
    }
}

impl From<ResourceId> for ResolvedId {
    fn from(id: ResourceId) -> Self {
        ResolvedId::Remote(id)
    }
}

/// What happened to a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Created,
    Reused,
    Updated,
    Skipped,
    Linked,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Action::Created => "created",
            Action::Reused => "reused",
            Action::Updated => "updated",
            Action::Skipped => "skipped",
            Action::Linked => "linked",
        };
        write!(f, "{s}")
    }
}

/// One decision about one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceAction {
    pub resource_type: ResourceType,
    pub action: Action,
    /// Natural key (title, version, tcid) the decision was made on.
    pub key: String,
    /// `None` for skipped resources.
    pub id: Option<ResolvedId>,
    /// Test case the action belongs to, `None` for run-level resources.
    pub test: Option<String>,
}

/// Per-resource-type counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeCounts {
    pub created: usize,
    pub reused: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub linked: usize,
}

impl TypeCounts {
    fn record(&mut self, action: Action) {
        match action {
            Action::Created => self.created += 1,
            Action::Reused => self.reused += 1,
            Action::Updated => self.updated += 1,
            Action::Skipped => self.skipped += 1,
            Action::Linked => self.linked += 1,
        }
    }
}

/// Totals for a finished import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub by_type: BTreeMap<ResourceType, TypeCounts>,
    pub tests_total: usize,
    pub tests_imported: usize,
    pub tests_skipped: usize,
    pub tests_failed: usize,
    pub dry_run: bool,
}

impl ImportSummary {
    pub fn record_action(&mut self, resource_type: ResourceType, action: Action) {
        self.by_type.entry(resource_type).or_default().record(action);
    }

    pub fn record_failure(&mut self, resource_type: ResourceType) {
        self.by_type.entry(resource_type).or_default().failed += 1;
    }

    pub fn counts(&self, resource_type: ResourceType) -> TypeCounts {
        self.by_type.get(&resource_type).copied().unwrap_or_default()
    }
}

/// Everything the engine reports, in emission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ImportEvent {
    RunStarted {
        import_id: String,
        testplan: ResourceId,
        policy: Policy,
        tests: usize,
        sources: Vec<LogSource>,
    },
    Action(ResourceAction),
    Warning {
        test: Option<String>,
        message: String,
    },
    TestCaseFailed {
        test: String,
        resource_type: ResourceType,
        error: String,
    },
    Summary(ImportSummary),
}

impl ImportEvent {
    pub fn warning(test: Option<&str>, message: impl Into<String>) -> Self {
        ImportEvent::Warning {
            test: test.map(str::to_string),
            message: message.into(),
        }
    }

    pub fn as_action(&self) -> Option<&ResourceAction> {
        match self {
            ImportEvent::Action(a) => Some(a),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Receiver of import events. Called synchronously, in order.
pub trait ReportSink: Send + Sync {
    fn emit(&self, event: &ImportEvent);
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<ImportEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ImportEvent> {
        self.events
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }

    pub fn actions(&self) -> Vec<ResourceAction> {
        self.events()
            .iter()
            .filter_map(ImportEvent::as_action)
            .cloned()
            .collect()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ImportEvent::Warning { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }
}

impl ReportSink for MemorySink {
    fn emit(&self, event: &ImportEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Logs events as structured `tracing` records.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn emit(&self, event: &ImportEvent) {
        match event {
            ImportEvent::RunStarted {
                import_id,
                testplan,
                tests,
                ..
            } => {
                info!(event = "import.started", import_id = %import_id, testplan = %testplan, tests = *tests);
            }
            ImportEvent::Action(a) => {
                info!(
                    event = "import.action",
                    resource = %a.resource_type,
                    action = %a.action,
                    key = %a.key,
                    id = %a.id.as_ref().map(ToString::to_string).unwrap_or_default(),
                    test = a.test.as_deref().unwrap_or_default(),
                );
            }
            ImportEvent::Warning { test, message } => {
                warn!(event = "import.warning", test = test.as_deref().unwrap_or_default(), message = %message);
            }
            ImportEvent::TestCaseFailed {
                test,
                resource_type,
                error,
            } => {
                warn!(event = "import.test_failed", test = %test, resource = %resource_type, error = %error);
            }
            ImportEvent::Summary(s) => {
                info!(
                    event = "import.summary",
                    tests_total = s.tests_total,
                    tests_imported = s.tests_imported,
                    tests_skipped = s.tests_skipped,
                    tests_failed = s.tests_failed,
                    dry_run = s.dry_run,
                );
            }
        }
    }
}

/// Forwards each event to several sinks.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn ReportSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl ReportSink for FanoutSink {
    fn emit(&self, event: &ImportEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}
