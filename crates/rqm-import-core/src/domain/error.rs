//! Error taxonomy for an import.
//!
//! `ImportError` aborts the whole run; `TestCaseError` is contained at the
//! test-case boundary and only counted.

use rqm_state::{ClientError, ResourceId, ResourceType};
use serde::{Deserialize, Serialize};

use crate::templates::TemplateError;

/// Top-level step of an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStep {
    TestEnvironment,
    BuildRecord,
    TestPlan,
    TestCase,
}

impl std::fmt::Display for ResolutionStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResolutionStep::TestEnvironment => "test environment",
            ResolutionStep::BuildRecord => "build record",
            ResolutionStep::TestPlan => "test plan",
            ResolutionStep::TestCase => "test case",
        };
        write!(f, "{s}")
    }
}

/// Invalid field mapping table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MappingError {
    #[error("field '{0}' is mapped more than once")]
    DuplicateField(String),

    #[error("field '{field}' reads unknown metadata key '{key}'")]
    UnknownMetadataKey { field: String, key: String },

    #[error("mapping table is empty")]
    Empty,
}

/// Errors that abort the import.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("authentication failed while resolving {step}: {message}")]
    Authentication {
        step: ResolutionStep,
        message: String,
    },

    #[error("{resource_type} {id} not found while resolving {step}")]
    ResourceNotFound {
        step: ResolutionStep,
        resource_type: ResourceType,
        id: ResourceId,
    },

    #[error("remote error while resolving {step}: {source}")]
    Remote {
        step: ResolutionStep,
        #[source]
        source: ClientError,
    },

    #[error("cannot render {step}: {source}")]
    Template {
        step: ResolutionStep,
        #[source]
        source: TemplateError,
    },

    #[error("invalid field mapping: {0}")]
    Mapping(#[from] MappingError),
}

impl ImportError {
    /// Classify a client error raised during `step`.
    pub fn from_client(step: ResolutionStep, err: ClientError) -> Self {
        match err {
            ClientError::Authentication(message) => ImportError::Authentication { step, message },
            ClientError::NotFound { resource_type, id } => ImportError::ResourceNotFound {
                step,
                resource_type,
                id,
            },
            other => ImportError::Remote { step, source: other },
        }
    }

    /// Step that failed, if the error belongs to one.
    pub fn step(&self) -> Option<ResolutionStep> {
        match self {
            ImportError::Authentication { step, .. }
            | ImportError::ResourceNotFound { step, .. }
            | ImportError::Remote { step, .. }
            | ImportError::Template { step, .. } => Some(*step),
            ImportError::Mapping(_) => None,
        }
    }
}

/// Result type for import operations.
pub type Result<T> = std::result::Result<T, ImportError>;

/// Failure of a single test case; the run continues with the next one.
#[derive(Debug, thiserror::Error)]
pub enum TestCaseError {
    #[error("test case {0} referenced by tcid does not exist")]
    TestCaseNotFound(ResourceId),

    #[error("team area '{0}' does not exist")]
    UnknownTeamArea(String),

    #[error("required fields missing: {}", .0.join(", "))]
    MissingRequired(Vec<String>),

    #[error("cannot render {resource_type}: {source}")]
    Template {
        resource_type: ResourceType,
        #[source]
        source: TemplateError,
    },

    #[error("{action} {resource_type} failed: {source}")]
    Client {
        resource_type: ResourceType,
        action: &'static str,
        #[source]
        source: ClientError,
    },
}

impl TestCaseError {
    pub fn client(resource_type: ResourceType, action: &'static str, source: ClientError) -> Self {
        TestCaseError::Client {
            resource_type,
            action,
            source,
        }
    }

    /// Authentication failures end the run even inside a test case.
    pub fn is_authentication(&self) -> bool {
        matches!(self, TestCaseError::Client { source, .. } if source.is_authentication())
    }

    /// Resource type the failure belongs to, for summary counting.
    pub fn resource_type(&self) -> ResourceType {
        match self {
            TestCaseError::TestCaseNotFound(_) | TestCaseError::MissingRequired(_) => {
                ResourceType::TestCase
            }
            TestCaseError::UnknownTeamArea(_) => ResourceType::TeamArea,
            TestCaseError::Template { resource_type, .. }
            | TestCaseError::Client { resource_type, .. } => *resource_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_client_classifies() {
        let auth = ImportError::from_client(
            ResolutionStep::TestPlan,
            ClientError::Authentication("authfailed".into()),
        );
        assert!(matches!(auth, ImportError::Authentication { .. }));

        let missing = ImportError::from_client(
            ResolutionStep::TestPlan,
            ClientError::NotFound {
                resource_type: ResourceType::TestPlan,
                id: "42".into(),
            },
        );
        assert_eq!(missing.step(), Some(ResolutionStep::TestPlan));
        assert!(missing.to_string().contains("testplan 42 not found"));

        let remote = ImportError::from_client(
            ResolutionStep::BuildRecord,
            ClientError::remote("boom"),
        );
        assert!(matches!(remote, ImportError::Remote { .. }));
    }

    #[test]
    fn test_case_error_authentication() {
        let err = TestCaseError::client(
            ResourceType::ExecutionResult,
            "create",
            ClientError::Authentication("expired".into()),
        );
        assert!(err.is_authentication());
        assert_eq!(err.resource_type(), ResourceType::ExecutionResult);

        let err = TestCaseError::MissingRequired(vec!["title".into(), "owner".into()]);
        assert_eq!(err.to_string(), "required fields missing: title, owner");
        assert!(!err.is_authentication());
    }
}
