//! RqmClient against a mocked RQM server.

use rqm_http::{RqmClient, RqmConfig, RqmError};
use rqm_state::{fields, ClientError, Payload, ResourceClient, ResourceFilter, ResourceId, ResourceType};
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PROJECT_ID: &str = "_pid123";
const SERVICE: &str = "/qm/service/com.ibm.rqm.integration.service.IIntegrationService/resources/_pid123";

fn project_areas(server: &MockServer) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<jp06:project-areas xmlns:jp06="http://jazz.net/xmlns/prod/jazz/process/0.6/">
  <jp06:project-area jp06:name="Other"><jp06:url>{uri}/qm/process/project-areas/_other</jp06:url></jp06:project-area>
  <jp06:project-area jp06:name="Demo"><jp06:url>{uri}/qm/process/project-areas/{PROJECT_ID}</jp06:url></jp06:project-area>
</jp06:project-areas>"#,
        uri = server.uri()
    )
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/qm/j_security_check"))
        .and(body_string_contains("j_username=jdoe"))
        .respond_with(
            ResponseTemplate::new(200).insert_header("Set-Cookie", "JSESSIONID=abc123; Path=/"),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/qm/process/project-areas"))
        .respond_with(ResponseTemplate::new(200).set_body_string(project_areas(server)))
        .mount(server)
        .await;
}

fn config(server: &MockServer, project: &str) -> RqmConfig {
    RqmConfig::new(server.uri(), project, "jdoe", "secret").with_timeout_secs(5)
}

async fn connected(server: &MockServer) -> RqmClient {
    mount_login(server).await;
    RqmClient::connect(config(server, "Demo")).await.unwrap()
}

#[tokio::test]
async fn connect_resolves_project_id() {
    let server = MockServer::start().await;
    let client = connected(&server).await;

    assert_eq!(client.project_id(), PROJECT_ID);
    assert_eq!(client.authenticated_user(), "jdoe");
    assert_eq!(
        client.resource_uri(ResourceType::TestCase, &"1001".into()),
        format!("{}{SERVICE}/testcase/urn:com.ibm.rqm:testcase:1001", server.uri())
    );
    assert_eq!(
        client.resource_uri(ResourceType::TestCase, &"slug-1".into()),
        format!("{}{SERVICE}/testcase/slug-1", server.uri())
    );
    assert_eq!(
        client.user_uri("jdoe"),
        format!(
            "{}/jts/resource/itemName/com.ibm.team.repository.Contributor/jdoe",
            server.uri()
        )
    );
}

#[tokio::test]
async fn rejected_login_is_authentication_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/qm/j_security_check"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-com-ibm-team-repository-web-auth-msg", "authfailed"),
        )
        .mount(&server)
        .await;

    let err = RqmClient::connect(config(&server, "Demo")).await.err().unwrap();
    assert!(err.is_authentication(), "unexpected error: {err}");
}

#[tokio::test]
async fn unknown_project_is_reported() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    let err = RqmClient::connect(config(&server, "Missing")).await.err().unwrap();
    assert!(matches!(err, RqmError::ProjectNotFound(ref p) if p == "Missing"));
}

#[tokio::test]
async fn get_reads_title_and_linked_testcases() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    let plan = format!(
        r#"<ns2:testplan xmlns:ns2="http://jazz.net/xmlns/alm/qm/v0.1/" xmlns:ns3="http://purl.org/dc/elements/1.1/">
<ns3:title>Release 1</ns3:title>
<ns2:webId>42</ns2:webId>
<ns2:testcase href="{uri}{SERVICE}/testcase/urn:com.ibm.rqm:testcase:1001"/>
<ns2:testcase href="{uri}{SERVICE}/testcase/urn:com.ibm.rqm:testcase:1002"/>
</ns2:testplan>"#,
        uri = server.uri()
    );
    Mock::given(method("GET"))
        .and(path(format!("{SERVICE}/testplan/urn:com.ibm.rqm:testplan:42")))
        .and(header("X-Jazz-CSRF-Prevent", "abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_string(plan))
        .mount(&server)
        .await;

    let plan = client.get(ResourceType::TestPlan, &"42".into()).await.unwrap();
    assert_eq!(plan.title(), Some("Release 1"));
    assert_eq!(
        plan.field_ids(fields::TESTCASE),
        vec![ResourceId::from("1001"), ResourceId::from("1002")]
    );
}

#[tokio::test]
async fn get_missing_is_not_found() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    Mock::given(method("GET"))
        .and(path(format!("{SERVICE}/testcase/urn:com.ibm.rqm:testcase:9")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = client.get(ResourceType::TestCase, &"9".into()).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn expired_session_is_authentication_error() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    Mock::given(method("GET"))
        .and(path(format!("{SERVICE}/testplan/urn:com.ibm.rqm:testplan:42")))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-com-ibm-team-repository-web-auth-msg", "authrequired"),
        )
        .mount(&server)
        .await;

    let err = client.get(ResourceType::TestPlan, &"42".into()).await.unwrap_err();
    assert!(err.is_authentication());
}

#[tokio::test]
async fn title_query_follows_feed_pages() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    let feed_url = format!("{}{SERVICE}/buildrecord", server.uri());
    Mock::given(method("GET"))
        .and(path(format!("{SERVICE}/buildrecord")))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            r#"<feed xmlns="http://www.w3.org/2005/Atom">
<entry><id>{feed_url}/urn:com.ibm.rqm:buildrecord:12</id><title>SW_1.0</title></entry>
</feed>"#
        )))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{SERVICE}/buildrecord")))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            r#"<feed xmlns="http://www.w3.org/2005/Atom">
<link rel="next" href="{feed_url}?page=1"/>
<entry><id>{feed_url}/urn:com.ibm.rqm:buildrecord:11</id><title>SW_0.9</title></entry>
</feed>"#
        )))
        .mount(&server)
        .await;

    let found = client
        .query(ResourceType::BuildRecord, &ResourceFilter::Title("SW_1.0".into()))
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id.as_str(), "12");
}

#[tokio::test]
async fn team_areas_come_from_process_api() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    Mock::given(method("GET"))
        .and(path(format!("/qm/process/project-areas/{PROJECT_ID}/team-areas")))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            r#"<jp06:team-areas xmlns:jp06="http://jazz.net/xmlns/prod/jazz/process/0.6/">
<jp06:team-area jp06:name="Team A"><jp06:url>{uri}/qm/process/project-areas/{PROJECT_ID}/team-areas/_ta</jp06:url></jp06:team-area>
</jp06:team-areas>"#,
            uri = server.uri()
        )))
        .mount(&server)
        .await;

    let found = client
        .query(ResourceType::TeamArea, &ResourceFilter::Title("Team A".into()))
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert!(found[0].field_str(fields::URL).unwrap().ends_with("/team-areas/_ta"));
}

#[tokio::test]
async fn create_reads_result_id_from_body() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("{SERVICE}/executionresult")))
        .and(header("X-Jazz-CSRF-Prevent", "abc123"))
        .and(header("Content-Type", "application/rdf+xml"))
        .respond_with(ResponseTemplate::new(201).set_body_string(
            r#"<rqm:results xmlns:rqm="http://schema.ibm.com/rqm/2007#results"><rqm:resultId>301</rqm:resultId></rqm:results>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let id = client
        .create(
            ResourceType::ExecutionResult,
            Payload::new().with_document("<executionresult/>"),
        )
        .await
        .unwrap();
    assert_eq!(id.as_str(), "301");
}

#[tokio::test]
async fn create_existing_record_returns_its_id() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("{SERVICE}/executionworkitem")))
        .respond_with(ResponseTemplate::new(303).insert_header(
            "Content-Location",
            format!("{SERVICE}/executionworkitem/urn:com.ibm.rqm:executionworkitem:77").as_str(),
        ))
        .mount(&server)
        .await;

    let id = client
        .create(
            ResourceType::ExecutionRecord,
            Payload::new().with_document("<executionworkitem/>"),
        )
        .await
        .unwrap();
    assert_eq!(id.as_str(), "77");
}

#[tokio::test]
async fn create_with_generated_slug_reads_back_web_id() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("{SERVICE}/testcase")))
        .respond_with(ResponseTemplate::new(201).insert_header("Content-Location", "slug-abc"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{SERVICE}/testcase/slug-abc")))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<ns2:testcase xmlns:ns2="http://jazz.net/xmlns/alm/qm/v0.1/"><ns2:webId>555</ns2:webId></ns2:testcase>"#,
        ))
        .mount(&server)
        .await;

    let id = client
        .create(ResourceType::TestCase, Payload::new().with_document("<testcase/>"))
        .await
        .unwrap();
    assert_eq!(id.as_str(), "555");
}

#[tokio::test]
async fn create_rejection_keeps_status() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("{SERVICE}/buildrecord")))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad title"))
        .mount(&server)
        .await;

    let err = client
        .create(ResourceType::BuildRecord, Payload::new().with_document("<x/>"))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Remote { status: Some(400), .. }));
}

#[tokio::test]
async fn create_without_document_is_rejected_locally() {
    let server = MockServer::start().await;
    let client = connected(&server).await;

    let err = client
        .create(ResourceType::TestCase, Payload::new())
        .await
        .unwrap_err();
    assert_eq!(err, ClientError::MissingDocument(ResourceType::TestCase));
}

#[tokio::test]
async fn link_update_appends_only_missing_testcases() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    let plan_path = format!("{SERVICE}/testplan/urn:com.ibm.rqm:testplan:42");
    Mock::given(method("GET"))
        .and(path(plan_path.clone()))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            r#"<ns2:testplan xmlns:ns2="http://jazz.net/xmlns/alm/qm/v0.1/"><ns2:webId>42</ns2:webId><ns2:testcase href="{uri}{SERVICE}/testcase/urn:com.ibm.rqm:testcase:1001"/></ns2:testplan>"#,
            uri = server.uri()
        )))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(plan_path))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let payload = Payload::new().with_field(
        fields::TESTCASE,
        serde_json::json!(["1001", "1002"]),
    );
    client
        .update(ResourceType::TestPlan, &"42".into(), payload)
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let put = requests
        .iter()
        .find(|r| r.method.as_str() == "PUT")
        .unwrap();
    let body = String::from_utf8(put.body.clone()).unwrap();
    assert_eq!(body.matches("testcase:1001").count(), 1);
    assert!(body.contains(r#"<ns2:testcase href=""#));
    assert!(body.contains("urn:com.ibm.rqm:testcase:1002"));
}

#[tokio::test]
async fn link_update_skips_put_when_already_linked() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    let plan_path = format!("{SERVICE}/testplan/urn:com.ibm.rqm:testplan:42");
    Mock::given(method("GET"))
        .and(path(plan_path.clone()))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            r#"<ns2:testplan xmlns:ns2="http://jazz.net/xmlns/alm/qm/v0.1/"><ns2:testcase href="{uri}{SERVICE}/testcase/urn:com.ibm.rqm:testcase:1001"/></ns2:testplan>"#,
            uri = server.uri()
        )))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(plan_path))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let payload = Payload::new().with_field(fields::TESTCASE, serde_json::json!(["1001"]));
    client
        .update(ResourceType::TestPlan, &"42".into(), payload)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_case_update_patches_current_document() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    let case_path = format!("{SERVICE}/testcase/urn:com.ibm.rqm:testcase:1003");
    Mock::given(method("GET"))
        .and(path(case_path.clone()))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<ns2:testcase xmlns:ns2="http://jazz.net/xmlns/alm/qm/v0.1/" xmlns:ns3="http://purl.org/dc/elements/1.1/" xmlns:ns5="http://jazz.net/xmlns/alm/v0.1/"><ns3:title>Checkout</ns3:title><ns5:owner>alice</ns5:owner><ns2:category term="Priority" value="high"/></ns2:testcase>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(case_path))
        .and(body_string_contains("<ns5:owner>alice</ns5:owner>"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let payload = Payload::new()
        .with_field(fields::TITLE, "Checkout v2")
        .with_field(fields::COMPONENT, "shop");
    client
        .update(ResourceType::TestCase, &"1003".into(), payload)
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let put = requests
        .iter()
        .find(|r| r.method.as_str() == "PUT")
        .unwrap();
    let body = String::from_utf8(put.body.clone()).unwrap();
    assert!(body.contains("<ns3:title>Checkout v2</ns3:title>"));
    assert!(body.contains(r#"<ns2:category term="Priority" value="high"/>"#));
    assert!(body.contains(r#"<ns2:category term="Component" value="shop"/>"#));
    assert!(!body.contains("<ns3:title>Checkout</ns3:title>"));
}

#[tokio::test]
async fn test_case_update_of_missing_case_is_not_found() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    Mock::given(method("GET"))
        .and(path(format!("{SERVICE}/testcase/urn:com.ibm.rqm:testcase:9")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = client
        .update(
            ResourceType::TestCase,
            &"9".into(),
            Payload::new().with_field(fields::TITLE, "x"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::NotFound { .. }));
}
