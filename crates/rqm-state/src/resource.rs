//! Remote resource model.
//!
//! The importer never invents identifiers: a `ResourceId` is only ever
//! learned from a `create` response or a `get` / `query` result.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field names shared by templates, fakes and the HTTP adapter.
pub mod fields {
    pub const TITLE: &str = "title";
    pub const DESCRIPTION: &str = "description";
    pub const OWNER: &str = "owner";
    pub const TEAM_AREA: &str = "team_area";
    pub const COMPONENT: &str = "component";
    pub const REQUIREMENT_IDS: &str = "requirement_ids";
    pub const SOURCE_REF: &str = "source_ref";
    pub const TESTCASE: &str = "testcase";
    pub const TESTPLAN: &str = "testplan";
    pub const CONFIGURATION: &str = "configuration";
    pub const EXECUTION_RECORD: &str = "executionworkitem";
    pub const BUILD_RECORD: &str = "buildrecord";
    pub const STATE: &str = "state";
    pub const MACHINE: &str = "machine";
    pub const TESTED_BY: &str = "tested_by";
    pub const START_TIME: &str = "start_time";
    pub const END_TIME: &str = "end_time";
    pub const TOTAL_RUN_TIME: &str = "total_run_time";
    pub const DETAILS: &str = "details";
    pub const URL: &str = "url";
}

/// Kinds of remote objects the importer reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    TestEnvironment,
    BuildRecord,
    TestPlan,
    TestCase,
    /// Test Case Execution Record (TCER).
    ExecutionRecord,
    ExecutionResult,
    TeamArea,
}

impl ResourceType {
    /// All resource types, in reconciliation order.
    pub const ALL: [ResourceType; 7] = [
        ResourceType::TestEnvironment,
        ResourceType::BuildRecord,
        ResourceType::TestPlan,
        ResourceType::TeamArea,
        ResourceType::TestCase,
        ResourceType::ExecutionRecord,
        ResourceType::ExecutionResult,
    ];

    /// Name used by the remote integration service.
    pub fn remote_name(&self) -> &'static str {
        match self {
            ResourceType::TestEnvironment => "configuration",
            ResourceType::BuildRecord => "buildrecord",
            ResourceType::TestPlan => "testplan",
            ResourceType::TestCase => "testcase",
            ResourceType::ExecutionRecord => "executionworkitem",
            ResourceType::ExecutionResult => "executionresult",
            ResourceType::TeamArea => "team-area",
        }
    }

    /// Human-readable label for reports.
    pub fn label(&self) -> &'static str {
        match self {
            ResourceType::TestEnvironment => "test environment",
            ResourceType::BuildRecord => "build record",
            ResourceType::TestPlan => "test plan",
            ResourceType::TestCase => "test case",
            ResourceType::ExecutionRecord => "TCER",
            ResourceType::ExecutionResult => "test result",
            ResourceType::TeamArea => "team area",
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.remote_name())
    }
}

/// Opaque identifier assigned by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        ResourceId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        ResourceId(s.to_string())
    }
}

impl From<String> for ResourceId {
    fn from(s: String) -> Self {
        ResourceId(s)
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Read-only view of one remote object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteResource {
    pub resource_type: ResourceType,
    pub id: ResourceId,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
}

impl RemoteResource {
    pub fn new(resource_type: ResourceType, id: impl Into<ResourceId>) -> Self {
        Self {
            resource_type,
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn title(&self) -> Option<&str> {
        self.field_str(fields::TITLE)
    }

    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// Read a field that may hold a single id or a list of ids.
    pub fn field_ids(&self, name: &str) -> Vec<ResourceId> {
        match self.fields.get(name) {
            Some(Value::String(s)) => vec![ResourceId::from(s.as_str())],
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(ResourceId::from)
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Query filter understood by `ResourceClient::query`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceFilter {
    /// Exact title match.
    Title(String),
    /// The execution record linking one test case to one test plan.
    ExecutionRecordFor {
        testcase: ResourceId,
        testplan: ResourceId,
    },
}

impl ResourceFilter {
    /// Evaluate the filter against a resource's fields.
    pub fn matches(&self, resource: &RemoteResource) -> bool {
        match self {
            ResourceFilter::Title(title) => resource.title() == Some(title.as_str()),
            ResourceFilter::ExecutionRecordFor { testcase, testplan } => {
                resource.field_ids(fields::TESTCASE).contains(testcase)
                    && resource.field_ids(fields::TESTPLAN).contains(testplan)
            }
        }
    }
}

impl std::fmt::Display for ResourceFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceFilter::Title(t) => write!(f, "title = '{t}'"),
            ResourceFilter::ExecutionRecordFor { testcase, testplan } => {
                write!(f, "testcase = {testcase}, testplan = {testplan}")
            }
        }
    }
}

/// Body of a create or update call.
///
/// `fields` carry the structured values (what an in-memory backend stores
/// and what reports show); `document` is the rendered template body a wire
/// backend sends. An update without a document is a field-level patch of
/// the current remote document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub fields: BTreeMap<String, Value>,
    pub document: Option<String>,
}

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn with_document(mut self, document: impl Into<String>) -> Self {
        self.document = Some(document.into());
        self
    }

    pub fn title(&self) -> Option<&str> {
        self.fields.get(fields::TITLE).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_names() {
        assert_eq!(ResourceType::ExecutionRecord.remote_name(), "executionworkitem");
        assert_eq!(ResourceType::TestEnvironment.remote_name(), "configuration");
        assert_eq!(ResourceType::TeamArea.to_string(), "team-area");
    }

    #[test]
    fn test_field_ids_accepts_single_and_list() {
        let single = RemoteResource::new(ResourceType::ExecutionRecord, "7")
            .with_field(fields::TESTCASE, "1001");
        assert_eq!(single.field_ids(fields::TESTCASE), vec![ResourceId::from("1001")]);

        let list = RemoteResource::new(ResourceType::TestPlan, "42")
            .with_field(fields::TESTCASE, serde_json::json!(["1", "2"]));
        assert_eq!(list.field_ids(fields::TESTCASE).len(), 2);
        assert!(list.field_ids("missing").is_empty());
    }

    #[test]
    fn test_execution_record_filter() {
        let tcer = RemoteResource::new(ResourceType::ExecutionRecord, "9")
            .with_field(fields::TESTCASE, "1001")
            .with_field(fields::TESTPLAN, "42");

        let hit = ResourceFilter::ExecutionRecordFor {
            testcase: "1001".into(),
            testplan: "42".into(),
        };
        let miss = ResourceFilter::ExecutionRecordFor {
            testcase: "1001".into(),
            testplan: "43".into(),
        };
        assert!(hit.matches(&tcer));
        assert!(!miss.matches(&tcer));
    }

    #[test]
    fn test_resource_id_serializes_transparently() {
        let json = serde_json::to_string(&ResourceId::from("abc")).unwrap();
        assert_eq!(json, "\"abc\"");
    }
}
