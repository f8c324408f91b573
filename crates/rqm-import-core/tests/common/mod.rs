//! Shared fixtures for engine tests.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use rqm_import_core::{
    keys, ImportEvent, MemorySink, Metadata, Policy, ReconciliationEngine, Run, TestCase,
    TestStatus,
};
use rqm_state::fakes::MemoryResourceClient;
use rqm_state::{fields, RemoteResource, ResourceType};

pub const PLAN: &str = "42";

pub fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 1)
        .unwrap()
        .and_hms_opt(h, m, s)
        .unwrap()
}

/// Remote side with only the test plan and two known test cases.
pub fn seeded_client() -> Arc<MemoryResourceClient> {
    Arc::new(
        MemoryResourceClient::new("jdoe")
            .with(RemoteResource::new(ResourceType::TestPlan, PLAN).with_field(fields::TITLE, "Release plan"))
            .with(RemoteResource::new(ResourceType::TestCase, "1001").with_field(fields::TITLE, "Login"))
            .with(RemoteResource::new(ResourceType::TestCase, "1002").with_field(fields::TITLE, "Logout")),
    )
}

pub fn test_case(name: &str, status: TestStatus, tags: &[&str]) -> TestCase {
    TestCase::new(name, status)
        .with_tags(tags.iter().copied())
        .with_times(at(10, 0, 0), at(10, 0, 2))
}

/// The reference run: project ROBFW, SW version 1.0, two tagged tests.
pub fn robfw_run() -> Run {
    let meta = Metadata::defaults().with(keys::VERSION_SW, "SW_1.0");
    Run::new(
        meta,
        vec![
            test_case("Login", TestStatus::Passed, &["tcid-1001"]),
            test_case("Logout", TestStatus::Failed, &["tcid-1002"]),
        ],
    )
}

pub fn engine(
    client: Arc<MemoryResourceClient>,
    policy: Policy,
) -> (ReconciliationEngine, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let engine = ReconciliationEngine::new(client, policy, sink.clone()).unwrap();
    (engine, sink)
}

/// Events with every id blanked, for comparing runs with different ids.
pub fn shape(events: &[ImportEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            ImportEvent::RunStarted { .. } => None,
            ImportEvent::Action(a) => Some(format!(
                "{:?} {:?} {} {:?}",
                a.resource_type, a.action, a.key, a.test
            )),
            ImportEvent::Summary(s) => Some(format!(
                "summary {} {} {}",
                s.tests_imported, s.tests_skipped, s.tests_failed
            )),
            other => Some(format!("{other:?}")),
        })
        .collect()
}
