//! Tag extraction.
//!
//! Test cases carry their remote identifiers as tags:
//! `tcid-<id>` (test case), `fid-<id>` (requirement) and
//! `robotfile-<path>` (source file). Prefixes are case-insensitive.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// How to pick the test-case id when several `tcid-` tags are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TieBreak {
    FirstInTagOrder,
    LastInTagOrder,
}

/// Tie-break applied by [`extract`].
pub const TCID_TIE_BREAK: TieBreak = TieBreak::FirstInTagOrder;

/// Field derived from a tag prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagField {
    TestCaseId,
    RequirementId,
    SourceRef,
}

impl TagField {
    pub fn prefix(&self) -> &'static str {
        match self {
            TagField::TestCaseId => "tcid-",
            TagField::RequirementId => "fid-",
            TagField::SourceRef => "robotfile-",
        }
    }
}

/// A tag with a known prefix but an unusable value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MalformedTag {
    pub tag: String,
    pub field: TagField,
}

impl std::fmt::Display for MalformedTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "tag '{}' has prefix '{}' but no usable value",
            self.tag,
            self.field.prefix()
        )
    }
}

/// Fields derived from one test case's tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedTags {
    pub tcid: Option<String>,
    /// Further `tcid-` values that lost the tie-break.
    pub ignored_tcids: Vec<String>,
    pub requirement_ids: Vec<String>,
    pub source_ref: Option<String>,
    pub malformed: Vec<MalformedTag>,
}

impl ExtractedTags {
    pub fn get(&self, field: TagField) -> Option<String> {
        match field {
            TagField::TestCaseId => self.tcid.clone(),
            TagField::RequirementId => {
                (!self.requirement_ids.is_empty()).then(|| self.requirement_ids.join(";"))
            }
            TagField::SourceRef => self.source_ref.clone(),
        }
    }
}

fn patterns() -> &'static [(TagField, Regex); 3] {
    static PATTERNS: OnceLock<[(TagField, Regex); 3]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            TagField::TestCaseId,
            TagField::RequirementId,
            TagField::SourceRef,
        ]
        .map(|field| {
            let re = Regex::new(&format!("(?i)^{}(.*)$", regex::escape(field.prefix())))
                .unwrap_or_else(|e| panic!("invalid built-in tag pattern: {e}"));
            (field, re)
        })
    })
}

fn classify(tag: &str) -> Option<(TagField, &str)> {
    patterns().iter().find_map(|(field, re)| {
        re.captures(tag)
            .and_then(|c| c.get(1))
            .map(|m| (*field, m.as_str()))
    })
}

/// Derive the test-case id, requirement ids and source reference from tags.
pub fn extract(tags: &[String]) -> ExtractedTags {
    extract_with(tags, TCID_TIE_BREAK)
}

/// [`extract`] with an explicit tie-break for competing `tcid-` tags.
pub fn extract_with(tags: &[String], tie_break: TieBreak) -> ExtractedTags {
    let mut out = ExtractedTags::default();
    let mut tcids: Vec<String> = Vec::new();

    for tag in tags {
        let Some((field, value)) = classify(tag) else {
            continue;
        };
        if value.is_empty() || value.chars().any(char::is_whitespace) {
            out.malformed.push(MalformedTag {
                tag: tag.clone(),
                field,
            });
            continue;
        }
        match field {
            TagField::TestCaseId => tcids.push(value.to_string()),
            TagField::RequirementId => {
                if !out.requirement_ids.iter().any(|r| r == value) {
                    out.requirement_ids.push(value.to_string());
                }
            }
            TagField::SourceRef => {
                if out.source_ref.is_none() {
                    out.source_ref = Some(value.to_string());
                }
            }
        }
    }

    if !tcids.is_empty() {
        let chosen = match tie_break {
            TieBreak::FirstInTagOrder => tcids.remove(0),
            TieBreak::LastInTagOrder => tcids.pop().unwrap_or_default(),
        };
        out.tcid = Some(chosen);
        out.ignored_tcids = tcids;
    }
    out
}
