//! In-memory log model of one parsed test run.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Well-known suite metadata keys.
pub mod keys {
    pub const PROJECT: &str = "project";
    pub const VERSION_SW: &str = "version_sw";
    pub const VERSION_HW: &str = "version_hw";
    pub const VERSION_TEST: &str = "version_test";
    pub const CATEGORY: &str = "category";
    pub const TESTTOOL: &str = "testtool";
    pub const CONFIGFILE: &str = "configfile";
    pub const TESTER: &str = "tester";
    pub const MACHINE: &str = "machine";
    pub const AUTHOR: &str = "author";
    pub const DESCRIPTION: &str = "description";
    pub const COMPONENT: &str = "component";
    pub const TAGS: &str = "tags";
    pub const TEAM_AREA: &str = "team-area";

    /// Every key the importer understands, in display order.
    pub const RECOGNIZED: [&str; 14] = [
        PROJECT,
        VERSION_SW,
        VERSION_HW,
        VERSION_TEST,
        CATEGORY,
        TESTTOOL,
        CONFIGFILE,
        TESTER,
        MACHINE,
        AUTHOR,
        DESCRIPTION,
        COMPONENT,
        TAGS,
        TEAM_AREA,
    ];
}

/// Project used when the log does not name one.
pub const DEFAULT_PROJECT: &str = "ROBFW";

/// Component used when the log does not name one.
pub const DEFAULT_COMPONENT: &str = "unknown";

/// Suite-level key/value metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, String>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults applied before any suite metadata is read.
    pub fn defaults() -> Self {
        let mut meta = Metadata::new();
        for key in keys::RECOGNIZED {
            meta.insert(key, "");
        }
        meta.insert(keys::PROJECT, DEFAULT_PROJECT);
        meta.insert(keys::COMPONENT, DEFAULT_COMPONENT);
        meta
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Value for `key`, `None` when absent or blank.
    pub fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Overlay `other` on top of `self`: keys present in `other` win.
    pub fn overlay(&self, other: &Metadata) -> Metadata {
        let mut merged = self.clone();
        for (k, v) in other.iter() {
            merged.insert(k, v);
        }
        merged
    }

    /// Fill keys missing from `self` with values from `parent`.
    pub fn inherit_from(&self, parent: &Metadata) -> Metadata {
        parent.overlay(self)
    }

    /// Keys present here that the importer never reads.
    pub fn unrecognized_keys(&self) -> Vec<&str> {
        self.0
            .keys()
            .map(String::as_str)
            .filter(|k| !keys::RECOGNIZED.contains(k))
            .collect()
    }
}

impl FromIterator<(String, String)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Metadata(iter.into_iter().collect())
    }
}

/// Outcome of one test case as recorded by the test runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TestStatus {
    Passed,
    Failed,
    Unknown,
}

impl TestStatus {
    /// Map a runner status string (`PASS`, `FAIL`, ...) to a status.
    pub fn from_runner(status: &str) -> Self {
        match status.trim().to_ascii_uppercase().as_str() {
            "PASS" => TestStatus::Passed,
            "FAIL" => TestStatus::Failed,
            _ => TestStatus::Unknown,
        }
    }

    /// Execution state name on the remote service.
    pub fn remote_state(&self) -> &'static str {
        match self {
            TestStatus::Passed => "passed",
            TestStatus::Failed => "failed",
            TestStatus::Unknown => "inconclusive",
        }
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TestStatus::Passed => "PASSED",
            TestStatus::Failed => "FAILED",
            TestStatus::Unknown => "UNKNOWN",
        };
        write!(f, "{s}")
    }
}

/// One executed test case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,
    #[serde(default)]
    pub documentation: String,
    pub status: TestStatus,
    /// Status message (failure reason) written by the runner.
    #[serde(default)]
    pub message: String,
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Name of the suite that owns the test.
    #[serde(default)]
    pub suite: String,
    /// Effective metadata of the owning suite (inherited keys filled in).
    #[serde(default)]
    pub metadata: Metadata,
}

impl TestCase {
    pub fn new(name: impl Into<String>, status: TestStatus) -> Self {
        Self {
            name: name.into(),
            documentation: String::new(),
            status,
            message: String::new(),
            start_time: None,
            end_time: None,
            tags: Vec::new(),
            suite: String::new(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_documentation(mut self, doc: impl Into<String>) -> Self {
        self.documentation = doc.into();
        self
    }

    pub fn with_times(mut self, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        self.start_time = Some(start);
        self.end_time = Some(end);
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Wall-clock duration in milliseconds, never negative.
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds().max(0)),
            _ => None,
        }
    }
}

/// A parsed log file that contributed to the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSource {
    pub path: String,
    /// SHA-256 hex digest of the file bytes.
    pub digest: String,
}

impl LogSource {
    pub fn from_bytes(path: impl Into<String>, data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self {
            path: path.into(),
            digest: hex::encode(hasher.finalize()),
        }
    }
}

/// One parsed test run: suite metadata plus test cases in document order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub metadata: Metadata,
    pub tests: Vec<TestCase>,
    #[serde(default)]
    pub sources: Vec<LogSource>,
}

impl Run {
    pub fn new(metadata: Metadata, tests: Vec<TestCase>) -> Self {
        Self {
            metadata,
            tests,
            sources: Vec::new(),
        }
    }

    pub fn with_sources(mut self, sources: Vec<LogSource>) -> Self {
        self.sources = sources;
        self
    }

    pub fn project(&self) -> Option<&str> {
        self.metadata.non_empty(keys::PROJECT)
    }

    pub fn version_sw(&self) -> Option<&str> {
        self.metadata.non_empty(keys::VERSION_SW)
    }

    /// Metadata for a test: its own suite metadata over the run's.
    pub fn metadata_for(&self, test: &TestCase) -> Metadata {
        self.metadata.overlay(&test.metadata)
    }
}
