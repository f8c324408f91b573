//! Field mapping table.
//!
//! Declares which log value feeds which remote test-case field. The table is
//! validated once at construction; applying it to a test case never fails,
//! it reports missing required fields instead.

use std::collections::{BTreeMap, BTreeSet};

use rqm_state::fields;
use serde::{Deserialize, Serialize};

use crate::domain::run::keys;
use crate::domain::{MappingError, Run, TestCase};
use crate::tags::{ExtractedTags, TagField};

/// Where a mapped value comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "key", rename_all = "snake_case")]
pub enum FieldSource {
    /// Metadata of the top-level suite.
    RunMetadata(String),
    /// Effective metadata of the suite owning the test.
    TestMetadata(String),
    TestName,
    TestDocumentation,
    TestMessage,
    Tag(TagField),
}

/// One row of the mapping table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRule {
    pub field: String,
    pub source: FieldSource,
    #[serde(default)]
    pub required: bool,
}

impl FieldRule {
    pub fn optional(field: &str, source: FieldSource) -> Self {
        Self {
            field: field.to_string(),
            source,
            required: false,
        }
    }

    pub fn required(field: &str, source: FieldSource) -> Self {
        Self {
            field: field.to_string(),
            source,
            required: true,
        }
    }
}

/// Result of applying the table to one test case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappedFields {
    /// Non-empty values by target field.
    pub values: BTreeMap<String, String>,
    /// Required fields whose source yielded nothing.
    pub missing_required: Vec<String>,
}

impl MappedFields {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.values.get(field).map(String::as_str)
    }
}

/// Validated mapping table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    rules: Vec<FieldRule>,
}

impl FieldMapping {
    pub fn new(rules: Vec<FieldRule>) -> Result<Self, MappingError> {
        if rules.is_empty() {
            return Err(MappingError::Empty);
        }
        let mut seen = BTreeSet::new();
        for rule in &rules {
            if !seen.insert(rule.field.as_str()) {
                return Err(MappingError::DuplicateField(rule.field.clone()));
            }
            if let FieldSource::RunMetadata(key) | FieldSource::TestMetadata(key) = &rule.source {
                if !keys::RECOGNIZED.contains(&key.as_str()) {
                    return Err(MappingError::UnknownMetadataKey {
                        field: rule.field.clone(),
                        key: key.clone(),
                    });
                }
            }
        }
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[FieldRule] {
        &self.rules
    }

    /// Resolve every rule against one test case.
    pub fn apply(&self, run: &Run, test: &TestCase, tags: &ExtractedTags) -> MappedFields {
        let test_meta = run.metadata_for(test);
        let mut out = MappedFields::default();

        for rule in &self.rules {
            let value = match &rule.source {
                FieldSource::RunMetadata(key) => run.metadata.non_empty(key).map(str::to_string),
                FieldSource::TestMetadata(key) => test_meta.non_empty(key).map(str::to_string),
                FieldSource::TestName => non_empty(&test.name),
                FieldSource::TestDocumentation => non_empty(&test.documentation),
                FieldSource::TestMessage => non_empty(&test.message),
                FieldSource::Tag(field) => tags.get(*field),
            };
            match value {
                Some(v) => {
                    out.values.insert(rule.field.clone(), v);
                }
                None if rule.required => out.missing_required.push(rule.field.clone()),
                None => {}
            }
        }
        out
    }
}

impl Default for FieldMapping {
    /// Table used for test-case documents.
    fn default() -> Self {
        use FieldSource::*;
        Self {
            rules: vec![
                FieldRule::required(fields::TITLE, TestName),
                FieldRule::optional(fields::DESCRIPTION, TestDocumentation),
                FieldRule::optional(fields::COMPONENT, TestMetadata(keys::COMPONENT.into())),
                FieldRule::optional(fields::TEAM_AREA, TestMetadata(keys::TEAM_AREA.into())),
                FieldRule::optional(fields::MACHINE, TestMetadata(keys::MACHINE.into())),
                FieldRule::optional(fields::REQUIREMENT_IDS, Tag(TagField::RequirementId)),
                FieldRule::optional(fields::SOURCE_REF, Tag(TagField::SourceRef)),
                FieldRule::optional(fields::DETAILS, TestMessage),
            ],
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
