use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use snapshot_client::{OaiSession, OaiSessionFactory};
use snapshot_core::{AppError, Endpoint, HarvestMode, HarvestSession, HttpConfig, SessionFactory};
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

const IDENTIFY: &str =
    "<OAI-PMH><Identify><repositoryName>Test archive</repositoryName></Identify></OAI-PMH>";

fn http() -> HttpConfig {
    HttpConfig {
        timeout: Duration::from_millis(300),
        max_retries: 3,
        retry_base_delay: Duration::from_millis(5),
    }
}

fn endpoint(server: &MockServer) -> Endpoint {
    Endpoint::new(format!("{}/oai", server.uri()))
}

fn page(records: &[&str], token: Option<&str>) -> String {
    let records: String = records
        .iter()
        .map(|id| format!("<record><header><identifier>{id}</identifier></header></record>"))
        .collect();
    let token = match token {
        Some(t) => format!("<resumptionToken cursor=\"0\">{t}</resumptionToken>"),
        None => "<resumptionToken cursor=\"0\"/>".to_string(),
    };
    format!("<OAI-PMH><ListRecords>{records}{token}</ListRecords></OAI-PMH>")
}

fn oai_error(code: &str) -> String {
    format!("<OAI-PMH><request verb=\"ListRecords\">x</request><error code=\"{code}\">nope</error></OAI-PMH>")
}

fn list_records() -> wiremock::MockBuilder {
    Mock::given(method("GET"))
        .and(path("/oai"))
        .and(query_param("verb", "ListRecords"))
}

/// A provider that answers `Identify`.
async fn provider() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/oai"))
        .and(query_param("verb", "Identify"))
        .respond_with(ResponseTemplate::new(200).set_body_string(IDENTIFY))
        .mount(&server)
        .await;
    server
}

async fn open_session(server: &MockServer, base: &Path) -> OaiSession {
    let factory = OaiSessionFactory::new(base, &http()).unwrap();
    factory.create(&endpoint(server)).await.unwrap()
}

fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

// =========================================================================
// Session construction
// =========================================================================

#[tokio::test]
async fn create_sends_identify() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/oai"))
        .and(query_param("verb", "Identify"))
        .respond_with(ResponseTemplate::new(200).set_body_string(IDENTIFY))
        .expect(1)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();

    let factory = OaiSessionFactory::new(dir.path(), &http()).unwrap();
    let result = factory.create(&endpoint(&server)).await;

    assert!(result.is_ok());
}

#[tokio::test]
async fn create_fails_on_identify_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("verb", "Identify"))
        .respond_with(ResponseTemplate::new(200).set_body_string(oai_error("badVerb")))
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();

    let factory = OaiSessionFactory::new(dir.path(), &http()).unwrap();
    let result = factory.create(&endpoint(&server)).await;

    assert!(matches!(result, Err(AppError::Protocol { code, .. }) if code == "badVerb"));
}

#[tokio::test]
async fn create_fails_when_identify_keeps_failing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("verb", "Identify"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();

    let factory = OaiSessionFactory::new(dir.path(), &http()).unwrap();
    let result = factory.create(&endpoint(&server)).await;

    assert!(matches!(result, Err(AppError::ServerError(500))));
}

// =========================================================================
// ListRecords paging
// =========================================================================

#[tokio::test]
async fn run_follows_resumption_tokens_until_empty() {
    let server = provider().await;
    list_records()
        .and(query_param_is_missing("resumptionToken"))
        .and(query_param("metadataPrefix", "oai_dc"))
        .and(query_param_is_missing("from"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page(&["a", "b"], Some("t1"))))
        .expect(1)
        .mount(&server)
        .await;
    list_records()
        .and(query_param("resumptionToken", "t1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page(&["c"], Some("t2"))))
        .expect(1)
        .mount(&server)
        .await;
    list_records()
        .and(query_param("resumptionToken", "t2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page(&["d"], None)))
        .expect(1)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let mut session = open_session(&server, dir.path()).await;

    session.run().await.unwrap();

    let today = Utc::now().date_naive();
    let harvest_dir = session.harvest_dir();
    assert_eq!(
        files_in(&harvest_dir),
        vec![
            format!("{today}-00000001.xml"),
            format!("{today}-00000002.xml"),
            format!("{today}-00000003.xml"),
            "state.json".to_string(),
        ]
    );
    let first = std::fs::read_to_string(harvest_dir.join(format!("{today}-00000001.xml"))).unwrap();
    assert_eq!(first, page(&["a", "b"], Some("t1")));
    let state = std::fs::read_to_string(harvest_dir.join("state.json")).unwrap();
    assert!(state.contains(&today.to_string()));
}

#[tokio::test]
async fn run_stops_at_request_limit() {
    let server = provider().await;
    list_records()
        .respond_with(ResponseTemplate::new(200).set_body_string(page(&["a"], Some("again"))))
        .expect(2)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let mut session = open_session(&server, dir.path()).await;
    session.options_mut().max_requests = 2;

    session.run().await.unwrap();

    assert_eq!(files_in(&session.harvest_dir()).len(), 3);
}

#[tokio::test]
async fn run_no_records_match_is_success() {
    let server = provider().await;
    list_records()
        .respond_with(ResponseTemplate::new(200).set_body_string(oai_error("noRecordsMatch")))
        .expect(1)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let mut session = open_session(&server, dir.path()).await;

    session.run().await.unwrap();

    assert_eq!(files_in(&session.harvest_dir()), vec!["state.json"]);
}

#[tokio::test]
async fn run_protocol_error_fails_without_state() {
    let server = provider().await;
    list_records()
        .and(query_param_is_missing("resumptionToken"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page(&["a"], Some("t1"))))
        .mount(&server)
        .await;
    list_records()
        .and(query_param("resumptionToken", "t1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(oai_error("badResumptionToken")))
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let mut session = open_session(&server, dir.path()).await;

    let result = session.run().await;

    assert!(
        matches!(result, Err(AppError::Protocol { ref code, .. }) if code == "badResumptionToken")
    );
    let today = Utc::now().date_naive();
    assert_eq!(
        files_in(&session.harvest_dir()),
        vec![format!("{today}-00000001.xml")]
    );
}

#[tokio::test]
async fn run_ignores_error_elements_inside_records() {
    let server = provider().await;
    let body = "<OAI-PMH><ListRecords><record><metadata><error code=\"x\">bias</error></metadata></record><resumptionToken/></ListRecords></OAI-PMH>";
    list_records()
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(1)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let mut session = open_session(&server, dir.path()).await;

    session.run().await.unwrap();

    assert_eq!(files_in(&session.harvest_dir()).len(), 2);
}

#[tokio::test]
async fn selective_run_resumes_from_last_harvest() {
    let server = provider().await;
    list_records()
        .and(query_param("from", "2024-01-15"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page(&["a"], None)))
        .expect(1)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let mut session = open_session(&server, dir.path()).await;
    let harvest_dir = session.harvest_dir();
    std::fs::create_dir_all(&harvest_dir).unwrap();
    std::fs::write(
        harvest_dir.join("state.json"),
        r#"{"last_harvest":"2024-01-15"}"#,
    )
    .unwrap();

    session.run().await.unwrap();
}

#[tokio::test]
async fn full_run_ignores_last_harvest() {
    let server = provider().await;
    list_records()
        .and(query_param_is_missing("from"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page(&["a"], None)))
        .expect(1)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let mut session = open_session(&server, dir.path()).await;
    session.options_mut().mode = HarvestMode::Full;
    let harvest_dir = session.harvest_dir();
    std::fs::create_dir_all(&harvest_dir).unwrap();
    std::fs::write(
        harvest_dir.join("state.json"),
        r#"{"last_harvest":"2024-01-15"}"#,
    )
    .unwrap();

    session.run().await.unwrap();
}

// =========================================================================
// Transport retries
// =========================================================================

#[tokio::test]
async fn server_errors_are_retried() {
    let server = provider().await;
    list_records()
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    list_records()
        .respond_with(ResponseTemplate::new(200).set_body_string(page(&["a"], None)))
        .expect(1)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let mut session = open_session(&server, dir.path()).await;

    session.run().await.unwrap();
}

#[tokio::test]
async fn rate_limit_is_retried() {
    let server = provider().await;
    list_records()
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    list_records()
        .respond_with(ResponseTemplate::new(200).set_body_string(page(&["a"], None)))
        .expect(1)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let mut session = open_session(&server, dir.path()).await;

    session.run().await.unwrap();
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = provider().await;
    list_records()
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let mut session = open_session(&server, dir.path()).await;

    let result = session.run().await;

    assert!(matches!(result, Err(AppError::ClientError(_))));
    assert!(!session.harvest_dir().join("state.json").exists());
}

#[tokio::test]
async fn timeouts_are_retried_then_reported() {
    let server = provider().await;
    list_records()
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(2))
                .set_body_string(page(&["a"], None)),
        )
        .expect(3)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let mut session = open_session(&server, dir.path()).await;

    let result = session.run().await;

    assert!(matches!(result, Err(AppError::Timeout(_))));
}
