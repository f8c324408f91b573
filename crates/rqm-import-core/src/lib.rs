//! RQM import core
//!
//! Turns a parsed Robot Framework run into remote quality-management
//! resources: test environment, build record, test cases, execution records
//! and execution results, all linked to one test plan.
//!
//! The engine talks to the remote side only through
//! [`rqm_state::ResourceClient`], so it runs unchanged against the HTTP
//! adapter or the in-memory fake.

pub mod domain;
pub mod engine;
pub mod events;
pub mod mapping;
pub mod obs;
pub mod reporter;
pub mod tags;
pub mod telemetry;
pub mod templates;

pub use domain::{
    keys, ImportError, LogSource, MappingError, Metadata, Policy, ResolutionStep, Result, Run,
    TestCase, TestCaseError, TestStatus,
};
pub use engine::{ImportOutcome, ReconciliationEngine};
pub use events::{
    Action, FanoutSink, ImportEvent, ImportSummary, MemorySink, ReportSink, ResolvedId,
    ResourceAction, TracingSink, TypeCounts,
};
pub use mapping::{FieldMapping, FieldRule, FieldSource, MappedFields};
pub use reporter::{ConsoleReporter, ImportReport};
pub use tags::{extract as extract_tags, ExtractedTags, TagField};
pub use telemetry::init_tracing;
pub use templates::{TemplateError, TemplateSet, TemplateValues};
