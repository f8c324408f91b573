//! Reconciliation engine.
//!
//! Walks a parsed run in document order and makes the remote service agree
//! with it: one test environment, one build record, the test plan, then per
//! test case the test case itself, its execution record (TCER), a fresh
//! execution result and the test plan link.
//!
//! Run-level failures abort the import. Everything below the test-case
//! boundary is reported and counted, and the next test case proceeds.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

use rqm_state::{
    fields, ClientError, ClientResult, Payload, RemoteResource, ResourceClient, ResourceFilter,
    ResourceId, ResourceType,
};
use serde_json::Value;
use tracing::{debug, Instrument};

use crate::domain::error::{ImportError, ResolutionStep, Result, TestCaseError};
use crate::domain::run::keys;
use crate::domain::{Policy, Run, TestCase};
use crate::events::{Action, ImportEvent, ImportSummary, ReportSink, ResolvedId, ResourceAction};
use crate::mapping::{FieldMapping, MappedFields};
use crate::obs;
use crate::tags::{self, ExtractedTags};
use crate::templates::{vars, TemplateError, TemplateSet, TemplateValues};

/// Prefix of the remote execution state names.
pub const STATE_PREFIX: &str = "com.ibm.rqm.execution.common.state.";

/// Title of the execution record created for a test.
pub fn execution_record_title(test_name: &str) -> String {
    format!("TCER: {test_name}")
}

/// Title of the execution result created for a test.
pub fn execution_result_title(test_name: &str) -> String {
    format!("Execution result: {test_name}")
}

/// Result of a completed (not aborted) import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOutcome {
    pub import_id: String,
    pub summary: ImportSummary,
    pub environment: Option<ResolvedId>,
    pub build_record: Option<ResolvedId>,
    /// Every test case linked to the plan after the import.
    pub linked: Vec<ResolvedId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TestOutcome {
    Imported,
    Skipped,
}

/// Mutable bookkeeping for one `import` call.
struct RunState {
    testplan: ResourceId,
    environment: Option<ResolvedId>,
    build_record: Option<ResolvedId>,
    linked: Vec<ResolvedId>,
    team_areas: HashMap<String, Option<String>>,
    execution_records: HashMap<ResolvedId, ResolvedId>,
    next_planned: u64,
    summary: ImportSummary,
}

impl RunState {
    fn new(testplan: ResourceId, dry_run: bool) -> Self {
        Self {
            testplan,
            environment: None,
            build_record: None,
            linked: Vec::new(),
            team_areas: HashMap::new(),
            execution_records: HashMap::new(),
            next_planned: 0,
            summary: ImportSummary {
                dry_run,
                ..ImportSummary::default()
            },
        }
    }

    fn plan_id(&mut self) -> ResolvedId {
        self.next_planned += 1;
        ResolvedId::Planned(self.next_planned)
    }
}

/// Drives a `ResourceClient` to mirror one run.
pub struct ReconciliationEngine {
    client: Arc<dyn ResourceClient>,
    policy: Policy,
    sink: Arc<dyn ReportSink>,
    templates: TemplateSet,
    mapping: FieldMapping,
}

impl ReconciliationEngine {
    /// Engine with the built-in templates and the default mapping table.
    pub fn new(
        client: Arc<dyn ResourceClient>,
        policy: Policy,
        sink: Arc<dyn ReportSink>,
    ) -> std::result::Result<Self, TemplateError> {
        Ok(Self {
            client,
            policy,
            sink,
            templates: TemplateSet::builtin()?,
            mapping: FieldMapping::default(),
        })
    }

    pub fn with_templates(mut self, templates: TemplateSet) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_mapping(mut self, mapping: FieldMapping) -> Self {
        self.mapping = mapping;
        self
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    /// Import `run` into the test plan `testplan`.
    pub async fn import(&self, run: &Run, testplan: &ResourceId) -> Result<ImportOutcome> {
        let import_id = uuid::Uuid::new_v4().to_string();
        let span = obs::import_span(&import_id);
        let result = self
            .import_inner(&import_id, run, testplan)
            .instrument(span)
            .await;
        if let Err(err) = &result {
            obs::emit_import_aborted(&import_id, err);
        }
        result
    }

    async fn import_inner(
        &self,
        import_id: &str,
        run: &Run,
        testplan: &ResourceId,
    ) -> Result<ImportOutcome> {
        let started = Instant::now();
        let mut st = RunState::new(testplan.clone(), self.policy.dry_run);
        st.summary.tests_total = run.tests.len();

        obs::emit_import_started(import_id, testplan.as_str(), run.tests.len(), self.policy.dry_run);
        self.sink.emit(&ImportEvent::RunStarted {
            import_id: import_id.to_string(),
            testplan: testplan.clone(),
            policy: self.policy,
            tests: run.tests.len(),
            sources: run.sources.clone(),
        });
        self.warn_about_metadata(run);

        st.environment = match run.project() {
            Some(project) => Some(
                self.find_or_create_by_title(
                    &mut st,
                    ResourceType::TestEnvironment,
                    ResolutionStep::TestEnvironment,
                    project,
                )
                .await?,
            ),
            None => {
                self.record(&mut st, ResourceType::TestEnvironment, Action::Skipped, "", None, None);
                None
            }
        };

        st.build_record = match run.version_sw() {
            Some(version) => Some(
                self.find_or_create_by_title(
                    &mut st,
                    ResourceType::BuildRecord,
                    ResolutionStep::BuildRecord,
                    version,
                )
                .await?,
            ),
            None => {
                self.record(&mut st, ResourceType::BuildRecord, Action::Skipped, "", None, None);
                None
            }
        };

        let plan = self
            .client
            .get(ResourceType::TestPlan, testplan)
            .await
            .map_err(|e| ImportError::from_client(ResolutionStep::TestPlan, e))?;
        st.linked = plan
            .field_ids(fields::TESTCASE)
            .into_iter()
            .map(ResolvedId::Remote)
            .collect();
        let plan_key = plan.title().unwrap_or(testplan.as_str()).to_string();
        self.record(
            &mut st,
            ResourceType::TestPlan,
            Action::Reused,
            &plan_key,
            Some(ResolvedId::Remote(plan.id.clone())),
            None,
        );

        for test in &run.tests {
            match self.import_test(&mut st, run, test).await {
                Ok(TestOutcome::Imported) => {
                    st.summary.tests_imported += 1;
                    obs::emit_test_processed(&test.name, "imported");
                }
                Ok(TestOutcome::Skipped) => {
                    st.summary.tests_skipped += 1;
                    obs::emit_test_processed(&test.name, "skipped");
                }
                Err(err) if err.is_authentication() => {
                    return Err(ImportError::Authentication {
                        step: ResolutionStep::TestCase,
                        message: err.to_string(),
                    });
                }
                Err(err) => {
                    st.summary.tests_failed += 1;
                    st.summary.record_failure(err.resource_type());
                    obs::emit_test_processed(&test.name, "failed");
                    self.sink.emit(&ImportEvent::TestCaseFailed {
                        test: test.name.clone(),
                        resource_type: err.resource_type(),
                        error: err.to_string(),
                    });
                }
            }
        }

        self.sink.emit(&ImportEvent::Summary(st.summary.clone()));
        obs::emit_import_finished(
            import_id,
            started.elapsed().as_millis() as u64,
            st.summary.tests_imported,
            st.summary.tests_skipped,
            st.summary.tests_failed,
        );

        Ok(ImportOutcome {
            import_id: import_id.to_string(),
            summary: st.summary,
            environment: st.environment,
            build_record: st.build_record,
            linked: st.linked,
        })
    }

    // -----------------------------------------------------------------------
    // Run level
    // -----------------------------------------------------------------------

    fn warn_about_metadata(&self, run: &Run) {
        let mut unknown: BTreeSet<&str> = run.metadata.unrecognized_keys().into_iter().collect();
        let mut testers: BTreeSet<&str> = run.metadata.non_empty(keys::TESTER).into_iter().collect();
        for test in &run.tests {
            unknown.extend(test.metadata.unrecognized_keys());
            testers.extend(test.metadata.non_empty(keys::TESTER));
        }

        if !unknown.is_empty() {
            let names: Vec<&str> = unknown.into_iter().collect();
            self.sink.emit(&ImportEvent::warning(
                None,
                format!("metadata keys not used by the importer: {}", names.join(", ")),
            ));
        }

        let user = self.client.authenticated_user();
        if let Some(tester) = testers.into_iter().find(|t| *t != user) {
            self.sink.emit(&ImportEvent::warning(
                None,
                format!(
                    "tester '{tester}' from metadata is not supported; results are recorded as tested by '{user}'"
                ),
            ));
        }
    }

    async fn find_or_create_by_title(
        &self,
        st: &mut RunState,
        resource_type: ResourceType,
        step: ResolutionStep,
        title: &str,
    ) -> Result<ResolvedId> {
        let found = self
            .client
            .query(resource_type, &ResourceFilter::Title(title.to_string()))
            .await
            .map_err(|e| ImportError::from_client(step, e))?;

        if let Some(existing) = found.into_iter().next() {
            let id = ResolvedId::Remote(existing.id);
            self.record(st, resource_type, Action::Reused, title, Some(id.clone()), None);
            return Ok(id);
        }

        let document = self
            .templates
            .render(resource_type, &TemplateValues::new().text(vars::TITLE, title))
            .map_err(|source| ImportError::Template { step, source })?;
        let payload = Payload::new()
            .with_field(fields::TITLE, title)
            .with_document(document);
        let id = self
            .create_or_plan(st, resource_type, payload)
            .await
            .map_err(|e| ImportError::from_client(step, e))?;
        self.record(st, resource_type, Action::Created, title, Some(id.clone()), None);
        Ok(id)
    }

    // -----------------------------------------------------------------------
    // Test level
    // -----------------------------------------------------------------------

    async fn import_test(
        &self,
        st: &mut RunState,
        run: &Run,
        test: &TestCase,
    ) -> std::result::Result<TestOutcome, TestCaseError> {
        debug!(test = %test.name, "processing test");
        let name = test.name.as_str();
        let tags = tags::extract(&test.tags);
        for bad in &tags.malformed {
            self.sink.emit(&ImportEvent::warning(Some(name), bad.to_string()));
        }
        if let (Some(tcid), false) = (&tags.tcid, tags.ignored_tcids.is_empty()) {
            self.sink.emit(&ImportEvent::warning(
                Some(name),
                format!("more than one 'tcid-' tag in test '{name}', '{tcid}' is used"),
            ));
        }

        if tags.tcid.is_none() && !self.policy.create_missing {
            self.sink.emit(&ImportEvent::warning(
                Some(name),
                format!("no 'tcid' tag for test '{name}'; not imported"),
            ));
            self.record(st, ResourceType::TestCase, Action::Skipped, name, None, Some(name));
            return Ok(TestOutcome::Skipped);
        }

        let mapped = self.mapping.apply(run, test, &tags);
        if !mapped.missing_required.is_empty() {
            return Err(TestCaseError::MissingRequired(mapped.missing_required));
        }
        let team_area = match mapped.get(fields::TEAM_AREA) {
            Some(team) => Some(self.resolve_team_area(st, team).await?),
            None => None,
        };

        let testcase = self
            .resolve_test_case(st, test, &tags, &mapped, team_area.as_deref())
            .await?;
        let record = self
            .resolve_execution_record(st, test, &testcase, team_area.as_deref())
            .await?;
        self.create_result(st, run, test, &testcase, &record, team_area.as_deref())
            .await?;
        self.link_to_plan(st, name, &testcase).await?;

        Ok(TestOutcome::Imported)
    }

    async fn resolve_team_area(
        &self,
        st: &mut RunState,
        team: &str,
    ) -> std::result::Result<String, TestCaseError> {
        if !st.team_areas.contains_key(team) {
            let found = self
                .client
                .query(ResourceType::TeamArea, &ResourceFilter::Title(team.to_string()))
                .await
                .map_err(|e| TestCaseError::client(ResourceType::TeamArea, "query", e))?;
            let uri = found.first().map(|area| self.team_area_uri(area));
            st.team_areas.insert(team.to_string(), uri);
        }
        st.team_areas
            .get(team)
            .cloned()
            .flatten()
            .ok_or_else(|| TestCaseError::UnknownTeamArea(team.to_string()))
    }

    fn team_area_uri(&self, area: &RemoteResource) -> String {
        area.field_str(fields::URL)
            .map(str::to_string)
            .unwrap_or_else(|| self.client.resource_uri(ResourceType::TeamArea, &area.id))
    }

    async fn resolve_test_case(
        &self,
        st: &mut RunState,
        test: &TestCase,
        tags: &ExtractedTags,
        mapped: &MappedFields,
        team_area: Option<&str>,
    ) -> std::result::Result<ResolvedId, TestCaseError> {
        let name = test.name.as_str();
        let Some(tcid) = tags.tcid.as_deref() else {
            let payload = self.test_case_payload(mapped, team_area)?;
            let id = self
                .create_or_plan(st, ResourceType::TestCase, payload)
                .await
                .map_err(|e| TestCaseError::client(ResourceType::TestCase, "create", e))?;
            self.record(st, ResourceType::TestCase, Action::Created, name, Some(id.clone()), Some(name));
            return Ok(id);
        };

        let id = ResourceId::from(tcid);
        match self.client.get(ResourceType::TestCase, &id).await {
            Ok(_) => {}
            Err(ClientError::NotFound { .. }) => return Err(TestCaseError::TestCaseNotFound(id)),
            Err(e) => return Err(TestCaseError::client(ResourceType::TestCase, "get", e)),
        }

        let resolved = ResolvedId::Remote(id.clone());
        if self.policy.update_existing {
            let payload = test_case_patch(mapped, team_area);
            if !self.policy.dry_run {
                self.client
                    .update(ResourceType::TestCase, &id, payload)
                    .await
                    .map_err(|e| TestCaseError::client(ResourceType::TestCase, "update", e))?;
            }
            self.record(st, ResourceType::TestCase, Action::Updated, tcid, Some(resolved.clone()), Some(name));
        } else {
            self.record(st, ResourceType::TestCase, Action::Reused, tcid, Some(resolved.clone()), Some(name));
        }
        Ok(resolved)
    }

    fn test_case_payload(
        &self,
        mapped: &MappedFields,
        team_area: Option<&str>,
    ) -> std::result::Result<Payload, TestCaseError> {
        let owner = self.client.authenticated_user();
        let values = TemplateValues::new()
            .text_or_empty(vars::TITLE, mapped.get(fields::TITLE))
            .text_or_empty(vars::DESCRIPTION, mapped.get(fields::DESCRIPTION))
            .text(vars::OWNER, owner)
            .text(vars::OWNER_URI, self.client.user_uri(owner))
            .text_or_empty(vars::COMPONENT, mapped.get(fields::COMPONENT))
            .text_or_empty(vars::REQUIREMENT_IDS, mapped.get(fields::REQUIREMENT_IDS))
            .text_or_empty(vars::SOURCE_REF, mapped.get(fields::SOURCE_REF))
            .text_or_empty(vars::TEAM_AREA_URI, team_area);
        let document = self.render(ResourceType::TestCase, &values)?;

        let mut payload = Payload::new().with_document(document);
        for (field, value) in &mapped.values {
            if field != fields::MACHINE && field != fields::DETAILS {
                payload = payload.with_field(field, value.as_str());
            }
        }
        Ok(payload.with_field(fields::OWNER, owner))
    }

    async fn resolve_execution_record(
        &self,
        st: &mut RunState,
        test: &TestCase,
        testcase: &ResolvedId,
        team_area: Option<&str>,
    ) -> std::result::Result<ResolvedId, TestCaseError> {
        let name = test.name.as_str();
        let title = execution_record_title(name);

        if let Some(known) = st.execution_records.get(testcase).cloned() {
            self.record(st, ResourceType::ExecutionRecord, Action::Reused, &title, Some(known.clone()), Some(name));
            return Ok(known);
        }

        if let ResolvedId::Remote(tc) = testcase {
            let filter = ResourceFilter::ExecutionRecordFor {
                testcase: tc.clone(),
                testplan: st.testplan.clone(),
            };
            let found = self
                .client
                .query(ResourceType::ExecutionRecord, &filter)
                .await
                .map_err(|e| TestCaseError::client(ResourceType::ExecutionRecord, "query", e))?;
            if let Some(existing) = found.into_iter().next() {
                let id = ResolvedId::Remote(existing.id);
                st.execution_records.insert(testcase.clone(), id.clone());
                self.record(st, ResourceType::ExecutionRecord, Action::Reused, &title, Some(id.clone()), Some(name));
                return Ok(id);
            }
        }

        let owner = self.client.authenticated_user();
        let configuration = st.environment.as_ref().map(|id| self.uri(ResourceType::TestEnvironment, id));
        let values = TemplateValues::new()
            .text(vars::TITLE, title.as_str())
            .text(vars::OWNER, owner)
            .text(vars::OWNER_URI, self.client.user_uri(owner))
            .text(vars::TESTCASE_URI, self.uri(ResourceType::TestCase, testcase))
            .text(vars::TESTPLAN_URI, self.remote_uri(ResourceType::TestPlan, &st.testplan))
            .text_or_empty(vars::CONFIGURATION_URI, configuration.as_deref())
            .text_or_empty(vars::TEAM_AREA_URI, team_area);
        let document = self.render(ResourceType::ExecutionRecord, &values)?;

        let mut payload = Payload::new()
            .with_field(fields::TITLE, title.as_str())
            .with_field(fields::OWNER, owner)
            .with_field(fields::TESTCASE, testcase.to_string())
            .with_field(fields::TESTPLAN, st.testplan.as_str())
            .with_document(document);
        if let Some(env) = &st.environment {
            payload = payload.with_field(fields::CONFIGURATION, env.to_string());
        }
        if let Some(team) = team_area {
            payload = payload.with_field(fields::TEAM_AREA, team);
        }

        let id = self
            .create_or_plan(st, ResourceType::ExecutionRecord, payload)
            .await
            .map_err(|e| TestCaseError::client(ResourceType::ExecutionRecord, "create", e))?;
        st.execution_records.insert(testcase.clone(), id.clone());
        self.record(st, ResourceType::ExecutionRecord, Action::Created, &title, Some(id.clone()), Some(name));
        Ok(id)
    }

    async fn create_result(
        &self,
        st: &mut RunState,
        run: &Run,
        test: &TestCase,
        testcase: &ResolvedId,
        record: &ResolvedId,
        team_area: Option<&str>,
    ) -> std::result::Result<ResolvedId, TestCaseError> {
        let name = test.name.as_str();
        let title = execution_result_title(name);
        let user = self.client.authenticated_user();
        let user_uri = self.client.user_uri(user);
        let state = format!("{STATE_PREFIX}{}", test.status.remote_state());
        let machine = run.metadata_for(test).non_empty(keys::MACHINE).map(str::to_string);
        let start = test.start_time.map(format_time);
        let end = test.end_time.map(format_time);
        let run_time = test.duration_ms().map(|ms| ms.to_string());
        let details: Vec<&str> = test
            .message
            .lines()
            .map(str::trim_end)
            .filter(|l| !l.trim().is_empty())
            .collect();
        let build_uri = st.build_record.as_ref().map(|id| self.uri(ResourceType::BuildRecord, id));

        let values = TemplateValues::new()
            .text(vars::TITLE, title.as_str())
            .text(vars::OWNER, user)
            .text(vars::OWNER_URI, user_uri.as_str())
            .text(vars::TESTER, user)
            .text(vars::TESTER_URI, user_uri.as_str())
            .text(vars::STATE, state.as_str())
            .text_or_empty(vars::MACHINE, machine.as_deref())
            .text_or_empty(vars::START_TIME, start.as_deref())
            .text_or_empty(vars::END_TIME, end.as_deref())
            .text_or_empty(vars::TOTAL_RUN_TIME, run_time.as_deref())
            .list(vars::DETAILS, details.iter().copied())
            .text(vars::TESTCASE_URI, self.uri(ResourceType::TestCase, testcase))
            .text(vars::TESTPLAN_URI, self.remote_uri(ResourceType::TestPlan, &st.testplan))
            .text(vars::EXECUTION_RECORD_URI, self.uri(ResourceType::ExecutionRecord, record))
            .text_or_empty(vars::BUILD_RECORD_URI, build_uri.as_deref())
            .text_or_empty(vars::TEAM_AREA_URI, team_area);
        let document = self.render(ResourceType::ExecutionResult, &values)?;

        let mut payload = Payload::new()
            .with_field(fields::TITLE, title.as_str())
            .with_field(fields::STATE, state)
            .with_field(fields::OWNER, user)
            .with_field(fields::TESTED_BY, user)
            .with_field(fields::TESTCASE, testcase.to_string())
            .with_field(fields::TESTPLAN, st.testplan.as_str())
            .with_field(fields::EXECUTION_RECORD, record.to_string())
            .with_document(document);
        if let Some(build) = &st.build_record {
            payload = payload.with_field(fields::BUILD_RECORD, build.to_string());
        }
        if let Some(machine) = machine {
            payload = payload.with_field(fields::MACHINE, machine);
        }
        if let Some(start) = start {
            payload = payload.with_field(fields::START_TIME, start);
        }
        if let Some(end) = end {
            payload = payload.with_field(fields::END_TIME, end);
        }
        if let Some(ms) = test.duration_ms() {
            payload = payload.with_field(fields::TOTAL_RUN_TIME, ms);
        }
        if !details.is_empty() {
            payload = payload.with_field(fields::DETAILS, details.join("\n"));
        }

        let id = self
            .create_or_plan(st, ResourceType::ExecutionResult, payload)
            .await
            .map_err(|e| TestCaseError::client(ResourceType::ExecutionResult, "create", e))?;
        self.record(st, ResourceType::ExecutionResult, Action::Created, &title, Some(id.clone()), Some(name));
        Ok(id)
    }

    async fn link_to_plan(
        &self,
        st: &mut RunState,
        test_name: &str,
        testcase: &ResolvedId,
    ) -> std::result::Result<(), TestCaseError> {
        if st.linked.contains(testcase) {
            return Ok(());
        }
        st.linked.push(testcase.clone());

        if !self.policy.dry_run {
            let ids: Vec<Value> = st
                .linked
                .iter()
                .filter_map(ResolvedId::remote)
                .map(|id| Value::String(id.to_string()))
                .collect();
            let payload = Payload::new().with_field(fields::TESTCASE, Value::Array(ids));
            if let Err(e) = self
                .client
                .update(ResourceType::TestPlan, &st.testplan, payload)
                .await
            {
                st.linked.pop();
                return Err(TestCaseError::client(ResourceType::TestPlan, "update", e));
            }
        }

        let plan = st.testplan.to_string();
        self.record(st, ResourceType::TestCase, Action::Linked, &plan, Some(testcase.clone()), Some(test_name));
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn create_or_plan(
        &self,
        st: &mut RunState,
        resource_type: ResourceType,
        payload: Payload,
    ) -> ClientResult<ResolvedId> {
        if self.policy.dry_run {
            return Ok(st.plan_id());
        }
        self.client
            .create(resource_type, payload)
            .await
            .map(ResolvedId::Remote)
    }

    fn render(
        &self,
        resource_type: ResourceType,
        values: &TemplateValues,
    ) -> std::result::Result<String, TestCaseError> {
        self.templates
            .render(resource_type, values)
            .map_err(|source| TestCaseError::Template {
                resource_type,
                source,
            })
    }

    fn uri(&self, resource_type: ResourceType, id: &ResolvedId) -> String {
        self.client
            .resource_uri(resource_type, &ResourceId::new(id.to_string()))
    }

    fn remote_uri(&self, resource_type: ResourceType, id: &ResourceId) -> String {
        self.client.resource_uri(resource_type, id)
    }

    fn record(
        &self,
        st: &mut RunState,
        resource_type: ResourceType,
        action: Action,
        key: &str,
        id: Option<ResolvedId>,
        test: Option<&str>,
    ) {
        st.summary.record_action(resource_type, action);
        self.sink.emit(&ImportEvent::Action(ResourceAction {
            resource_type,
            action,
            key: key.to_string(),
            id,
            test: test.map(str::to_string),
        }));
    }
}

/// Fields an update may rewrite on an existing test case.
///
/// Carries no document and no owner: the client merges these into the
/// current remote document, so everything else on it is left alone.
fn test_case_patch(mapped: &MappedFields, team_area: Option<&str>) -> Payload {
    let mut payload = Payload::new();
    for field in [
        fields::TITLE,
        fields::DESCRIPTION,
        fields::COMPONENT,
        fields::REQUIREMENT_IDS,
        fields::SOURCE_REF,
    ] {
        if let Some(value) = mapped.get(field) {
            payload = payload.with_field(field, value);
        }
    }
    if let Some(uri) = team_area {
        payload = payload.with_field(fields::TEAM_AREA, uri);
    }
    payload
}

fn format_time(t: chrono::NaiveDateTime) -> String {
    t.format("%Y-%m-%dT%H:%M:%S%.3f").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_titles() {
        assert_eq!(execution_record_title("Login"), "TCER: Login");
        assert_eq!(execution_result_title("Login"), "Execution result: Login");
    }

    #[test]
    fn test_time_format_is_iso() {
        let t = NaiveDate::from_ymd_opt(2023, 1, 8)
            .unwrap()
            .and_hms_milli_opt(9, 5, 3, 42)
            .unwrap();
        assert_eq!(format_time(t), "2023-01-08T09:05:03.042");
    }
}
