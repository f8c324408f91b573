//! A failing test case is counted and the import moves on.

mod common;

use common::*;
use rqm_import_core::{ImportEvent, Metadata, Policy, ResolvedId, Run, TestStatus};
use rqm_state::{fields, ResourceId, ResourceType};

#[tokio::test]
async fn rejected_result_does_not_stop_the_run() {
    let client = seeded_client();
    client.fail_create_when(
        ResourceType::ExecutionResult,
        fields::TITLE,
        "Execution result: Login",
    );
    let (engine, sink) = engine(client.clone(), Policy::default());

    let outcome = engine
        .import(&robfw_run(), &ResourceId::from(PLAN))
        .await
        .unwrap();

    assert_eq!(outcome.summary.tests_failed, 1);
    assert_eq!(outcome.summary.tests_imported, 1);
    assert_eq!(
        outcome.summary.counts(ResourceType::ExecutionResult).failed,
        1
    );
    // The failed test is not linked to the plan.
    assert_eq!(outcome.linked, vec![ResolvedId::Remote("1002".into())]);

    let failures: Vec<_> = sink
        .events()
        .into_iter()
        .filter_map(|e| match e {
            ImportEvent::TestCaseFailed { test, error, .. } => Some((test, error)),
            _ => None,
        })
        .collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "Login");
    assert!(failures[0].1.contains("HTTP 400"));
}

#[tokio::test]
async fn rejected_execution_record_fails_only_that_test() {
    let client = seeded_client();
    client.fail_create_when(ResourceType::ExecutionRecord, fields::TITLE, "TCER: Logout");
    let (engine, sink) = engine(client.clone(), Policy::default());
    let mut run = robfw_run();
    run.tests
        .push(test_case("Login again", TestStatus::Passed, &["tcid-1001"]));

    let outcome = engine
        .import(&run, &ResourceId::from(PLAN))
        .await
        .unwrap();

    assert_eq!(outcome.summary.tests_imported, 2);
    assert_eq!(outcome.summary.tests_failed, 1);
    let tcers = outcome.summary.counts(ResourceType::ExecutionRecord);
    assert_eq!((tcers.created, tcers.reused, tcers.failed), (1, 1, 1));
    assert_eq!(
        outcome.summary.counts(ResourceType::ExecutionResult).created,
        2
    );

    let titles: Vec<_> = client
        .resources(ResourceType::ExecutionResult)
        .iter()
        .filter_map(|r| r.title().map(str::to_string))
        .collect();
    assert_eq!(
        titles,
        vec!["Execution result: Login", "Execution result: Login again"]
    );
    assert_eq!(outcome.linked, vec![ResolvedId::Remote("1001".into())]);

    let failed: Vec<_> = sink
        .events()
        .into_iter()
        .filter_map(|e| match e {
            ImportEvent::TestCaseFailed {
                test, resource_type, ..
            } => Some((test, resource_type)),
            _ => None,
        })
        .collect();
    assert_eq!(
        failed,
        vec![("Logout".to_string(), ResourceType::ExecutionRecord)]
    );
    assert!(matches!(sink.events().last(), Some(ImportEvent::Summary(_))));
}

#[tokio::test]
async fn unknown_tcid_fails_only_that_test() {
    let client = seeded_client();
    let (engine, _sink) = engine(client.clone(), Policy::default());
    let run = Run::new(
        Metadata::defaults(),
        vec![
            test_case("Ghost", TestStatus::Passed, &["tcid-404"]),
            test_case("Login", TestStatus::Passed, &["tcid-1001"]),
        ],
    );

    let outcome = engine.import(&run, &ResourceId::from(PLAN)).await.unwrap();

    assert_eq!(outcome.summary.tests_failed, 1);
    assert_eq!(outcome.summary.tests_imported, 1);
    assert_eq!(outcome.summary.counts(ResourceType::TestCase).failed, 1);
    assert_eq!(client.resources(ResourceType::ExecutionRecord).len(), 1);
}

#[tokio::test]
async fn missing_required_field_is_reported() {
    let client = seeded_client();
    let (engine, sink) = engine(client.clone(), Policy::default());
    let run = Run::new(
        Metadata::defaults(),
        vec![test_case("   ", TestStatus::Passed, &["tcid-1001"])],
    );

    let outcome = engine.import(&run, &ResourceId::from(PLAN)).await.unwrap();

    assert_eq!(outcome.summary.tests_failed, 1);
    assert!(sink.events().iter().any(|e| matches!(
        e,
        ImportEvent::TestCaseFailed { error, .. } if error.contains("title")
    )));
    assert_eq!(client.mutation_count(), 1);
}
