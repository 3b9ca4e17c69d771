//! Integration tests for HttpBackend against a mock simulation API

use std::sync::Arc;
use std::time::Duration;

use sim_client::{BackendError, HttpBackend, SimulationBackend, StaticCredentials};
use sim_core::{classify, ErrorKind};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn backend(server: &MockServer, token: Option<&str>) -> HttpBackend {
    HttpBackend::new(
        server.uri(),
        Arc::new(StaticCredentials::new(token.map(str::to_string))),
    )
}

#[tokio::test]
async fn start_session_posts_case_with_bearer_token() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/simulation/start"))
        .and(header("authorization", "Bearer secret"))
        .and(body_json(serde_json::json!({ "caseId": "VP-001" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "sessionId": "s1",
            "patientLabel": "Mr. Jones",
            "initialPrompt": "Hello, I have chest pain."
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let response = backend(&mock_server, Some("secret"))
        .start_session("VP-001")
        .await
        .expect("start should succeed");

    assert_eq!(response.session_id.as_deref(), Some("s1"));
    assert_eq!(response.patient_label.as_deref(), Some("Mr. Jones"));
    assert_eq!(
        response.initial_prompt.as_deref(),
        Some("Hello, I have chest pain.")
    );
}

#[tokio::test]
async fn not_found_case_classifies_as_invalid_case() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/simulation/start"))
        .respond_with(ResponseTemplate::new(404).set_body_string(r#"{"detail":"Case not found"}"#))
        .mount(&mock_server)
        .await;

    let err = backend(&mock_server, Some("secret"))
        .start_session("VP-999")
        .await
        .expect_err("404 should fail");

    assert!(matches!(err, BackendError::Status { status: 404, .. }));
    assert_eq!(classify(&err.raw_failure()).kind, ErrorKind::InvalidCase);
}

#[tokio::test]
async fn missing_token_fails_before_sending() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let err = backend(&mock_server, None)
        .start_session("VP-001")
        .await
        .expect_err("no token");

    assert!(matches!(err, BackendError::MissingCredential));
    assert_eq!(classify(&err.raw_failure()).kind, ErrorKind::Auth);
}

#[tokio::test]
async fn non_json_body_is_malformed() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/simulation/end"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&mock_server)
        .await;

    let err = backend(&mock_server, Some("secret"))
        .end_session("s1")
        .await
        .expect_err("html is not an evaluation");

    assert!(err.is_malformed());
}

#[tokio::test]
async fn end_session_returns_evaluation() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/simulation/end"))
        .and(body_json(serde_json::json!({ "sessionId": "s1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "evaluationText": "Clear and empathetic.",
            "structuredMetrics": [{"name": "Communication", "score": 4}],
            "history": []
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let response = backend(&mock_server, Some("secret"))
        .end_session("s1")
        .await
        .expect("end should succeed");

    assert_eq!(response.evaluation_text.as_deref(), Some("Clear and empathetic."));
    assert_eq!(response.structured_metrics.map(|m| m.len()), Some(1));
}

#[tokio::test]
async fn server_error_classifies_as_server() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/simulation/start"))
        .respond_with(ResponseTemplate::new(503).set_body_string("try later"))
        .mount(&mock_server)
        .await;

    let err = backend(&mock_server, Some("secret"))
        .start_session("VP-001")
        .await
        .expect_err("503 should fail");

    let classified = classify(&err.raw_failure());
    assert_eq!(classified.kind, ErrorKind::Server);
    assert!(classified.retryable);
}

#[tokio::test]
async fn unresponsive_backend_times_out() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/simulation/start"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "sessionId": "s1" }))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&mock_server)
        .await;

    let backend = backend(&mock_server, Some("secret"))
        .with_request_timeout(Duration::from_millis(100));
    let err = tokio::time::timeout(Duration::from_secs(1), backend.start_session("VP-001"))
        .await
        .expect("request must give up on its own")
        .expect_err("delayed response should time out");

    assert_eq!(classify(&err.raw_failure()).kind, ErrorKind::Timeout);
}
