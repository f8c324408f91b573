//! Resource document templates.
//!
//! Each writable resource type has a Handlebars XML skeleton. Optional parts
//! use `{{#if name}}`, repeated parts `{{#each name}}...{{this}}...{{/each}}`.
//!
//! The registry runs in strict mode, so a placeholder without a bound value
//! fails the render instead of leaving a blank. Templates are compiled when
//! the set is built, so a broken override file is reported before any
//! remote call is made.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use handlebars::Handlebars;
use regex::Regex;
use rqm_state::ResourceType;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

/// Template errors.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("{kind} template: {source}")]
    Syntax {
        kind: ResourceType,
        #[source]
        source: Box<handlebars::TemplateError>,
    },

    #[error("{kind} template: unknown placeholder '{name}'")]
    UnknownPlaceholder { kind: ResourceType, name: String },

    #[error("{kind} template: unsupported block helper '{name}'")]
    UnsupportedHelper { kind: ResourceType, name: String },

    #[error("cannot render {kind}: {source}")]
    Render {
        kind: ResourceType,
        #[source]
        source: Box<handlebars::RenderError>,
    },

    #[error("no template for {0}")]
    NoTemplate(ResourceType),

    #[error("cannot read template {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Placeholder names, shared by the engine and the built-in templates.
pub mod vars {
    pub const TITLE: &str = "title";
    pub const DESCRIPTION: &str = "description";
    pub const OWNER: &str = "owner";
    pub const OWNER_URI: &str = "owner_uri";
    pub const TESTER: &str = "tester";
    pub const TESTER_URI: &str = "tester_uri";
    pub const COMPONENT: &str = "component";
    pub const REQUIREMENT_IDS: &str = "requirement_ids";
    pub const SOURCE_REF: &str = "source_ref";
    pub const TEAM_AREA_URI: &str = "team_area_uri";
    pub const TESTCASE_URI: &str = "testcase_uri";
    pub const TESTPLAN_URI: &str = "testplan_uri";
    pub const CONFIGURATION_URI: &str = "configuration_uri";
    pub const EXECUTION_RECORD_URI: &str = "executionworkitem_uri";
    pub const BUILD_RECORD_URI: &str = "buildrecord_uri";
    pub const STATE: &str = "state";
    pub const MACHINE: &str = "machine";
    pub const START_TIME: &str = "start_time";
    pub const END_TIME: &str = "end_time";
    pub const TOTAL_RUN_TIME: &str = "total_run_time";
    pub const DETAILS: &str = "details";
}

/// Placeholders a template of `kind` may use.
pub fn declared_placeholders(kind: ResourceType) -> &'static [&'static str] {
    use vars::*;
    match kind {
        ResourceType::TestCase => &[
            TITLE,
            DESCRIPTION,
            OWNER,
            OWNER_URI,
            COMPONENT,
            REQUIREMENT_IDS,
            SOURCE_REF,
            TEAM_AREA_URI,
        ],
        ResourceType::ExecutionRecord => &[
            TITLE,
            OWNER,
            OWNER_URI,
            TESTCASE_URI,
            TESTPLAN_URI,
            CONFIGURATION_URI,
            TEAM_AREA_URI,
        ],
        ResourceType::ExecutionResult => &[
            TITLE,
            OWNER,
            OWNER_URI,
            TESTER,
            TESTER_URI,
            STATE,
            MACHINE,
            START_TIME,
            END_TIME,
            TOTAL_RUN_TIME,
            DETAILS,
            TESTCASE_URI,
            TESTPLAN_URI,
            EXECUTION_RECORD_URI,
            BUILD_RECORD_URI,
            TEAM_AREA_URI,
        ],
        ResourceType::BuildRecord | ResourceType::TestEnvironment => &[TITLE],
        ResourceType::TestPlan | ResourceType::TeamArea => &[],
    }
}

/// Resource types that are created from a template.
pub const TEMPLATED: [ResourceType; 5] = [
    ResourceType::TestEnvironment,
    ResourceType::BuildRecord,
    ResourceType::TestCase,
    ResourceType::ExecutionRecord,
    ResourceType::ExecutionResult,
];

/// Block helpers a template may open.
const BLOCK_HELPERS: [&str; 3] = ["if", "unless", "each"];

fn builtin_source(kind: ResourceType) -> Option<&'static str> {
    match kind {
        ResourceType::TestEnvironment => Some(include_str!("../templates/configuration.xml")),
        ResourceType::BuildRecord => Some(include_str!("../templates/buildrecord.xml")),
        ResourceType::TestCase => Some(include_str!("../templates/testcase.xml")),
        ResourceType::ExecutionRecord => Some(include_str!("../templates/executionworkitem.xml")),
        ResourceType::ExecutionResult => Some(include_str!("../templates/executionresult.xml")),
        ResourceType::TestPlan | ResourceType::TeamArea => None,
    }
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// Values bound to placeholders for one render.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TemplateValues {
    values: Map<String, Value>,
}

impl TemplateValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: impl Into<String>) -> Self {
        self.values
            .insert(name.to_string(), Value::String(value.into()));
        self
    }

    /// Bind `name` to `value`, or to an empty string when absent.
    pub fn text_or_empty(self, name: &str, value: Option<&str>) -> Self {
        self.text(name, value.unwrap_or_default())
    }

    pub fn list<I, S>(mut self, name: &str, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let items = items
            .into_iter()
            .map(|item| Value::String(item.into()))
            .collect();
        self.values.insert(name.to_string(), Value::Array(items));
        self
    }
}

// ---------------------------------------------------------------------------
// Placeholder check
// ---------------------------------------------------------------------------

fn expression_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{\{?~?\s*([^}]*?)\s*~?\}?\}\}")
            .unwrap_or_else(|e| panic!("invalid built-in expression pattern: {e}"))
    })
}

/// Reject variables not declared for `kind` and helpers other than
/// `if`, `unless` and `each`.
fn check_placeholders(kind: ResourceType, source: &str) -> Result<(), TemplateError> {
    let declared = declared_placeholders(kind);
    for caps in expression_pattern().captures_iter(source) {
        let inner = caps[1].trim();
        if inner.is_empty() || inner == "else" || inner.starts_with(['!', '/']) {
            continue;
        }
        let mut words = inner.split_whitespace();
        let Some(first) = words.next() else {
            continue;
        };
        let names: Vec<&str> = match first.strip_prefix('#') {
            Some(helper) if BLOCK_HELPERS.contains(&helper) => words.collect(),
            Some(helper) => {
                return Err(TemplateError::UnsupportedHelper {
                    kind,
                    name: helper.to_string(),
                })
            }
            None => vec![first],
        };
        for name in names {
            if name == "this" || name == "." || name.starts_with('@') {
                continue;
            }
            if !declared.contains(&name) {
                return Err(TemplateError::UnknownPlaceholder {
                    kind,
                    name: name.to_string(),
                });
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// TemplateSet
// ---------------------------------------------------------------------------

/// Templates for every resource type the engine writes.
#[derive(Clone)]
pub struct TemplateSet {
    registry: Handlebars<'static>,
}

impl fmt::Debug for TemplateSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.registry.get_templates().keys().collect();
        names.sort();
        f.debug_struct("TemplateSet")
            .field("templates", &names)
            .finish()
    }
}

impl TemplateSet {
    /// The templates compiled into the binary.
    pub fn builtin() -> Result<Self, TemplateError> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        let mut set = Self { registry };
        for kind in TEMPLATED {
            if let Some(source) = builtin_source(kind) {
                set.register(kind, source)?;
            }
        }
        Ok(set)
    }

    /// Built-in templates, overridden by `<remote_name>.xml` files in `dir`.
    pub fn from_dir(dir: &Path) -> Result<Self, TemplateError> {
        let mut set = Self::builtin()?;
        for kind in TEMPLATED {
            let path = dir.join(format!("{}.xml", kind.remote_name()));
            if !path.is_file() {
                continue;
            }
            let source = std::fs::read_to_string(&path).map_err(|source| TemplateError::Io {
                path: path.clone(),
                source,
            })?;
            debug!(kind = %kind, path = %path.display(), "using template override");
            set.register(kind, &source)?;
        }
        Ok(set)
    }

    /// Replace the template for `kind`.
    pub fn with_template(mut self, kind: ResourceType, source: &str) -> Result<Self, TemplateError> {
        self.register(kind, source)?;
        Ok(self)
    }

    fn register(&mut self, kind: ResourceType, source: &str) -> Result<(), TemplateError> {
        self.registry
            .register_template_string(kind.remote_name(), source)
            .map_err(|e| TemplateError::Syntax {
                kind,
                source: Box::new(e),
            })?;
        check_placeholders(kind, source)
    }

    pub fn render(
        &self,
        kind: ResourceType,
        values: &TemplateValues,
    ) -> Result<String, TemplateError> {
        let name = kind.remote_name();
        if !self.registry.has_template(name) {
            return Err(TemplateError::NoTemplate(kind));
        }
        self.registry
            .render(name, values)
            .map_err(|e| TemplateError::Render {
                kind,
                source: Box::new(e),
            })
    }
}
