//! Integration tests for SseTransport against a mock SSE endpoint

use std::time::Duration;

use sim_stream::{SseTransport, StreamEvent, StreamRequest, StreamTransport, TransportError};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn network_tests_disabled() -> bool {
    std::env::var_os("CODEX_SANDBOX_NETWORK_DISABLED").is_some()
}

fn sse(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(body.to_string())
}

async fn collect(transport: &SseTransport, request: StreamRequest) -> Vec<Result<StreamEvent, String>> {
    let mut handle = transport.open(request).await.expect("stream should open");
    let mut out = Vec::new();
    while let Some(item) = handle.recv().await {
        out.push(item.map_err(|e| e.to_string()));
    }
    out
}

#[tokio::test]
async fn streams_chunks_in_order_until_done() {
    if network_tests_disabled() {
        return;
    }

    let mock_server = MockServer::start().await;
    let body = concat!(
        "data: {\"type\":\"chunk\",\"content\":\"I've\",\"speaker\":\"John Smith\"}\n\n",
        "data: {\"type\":\"chunk\",\"content\":\" had\"}\n\n",
        "data: {\"type\":\"typing\"}\n\n",
        "data: {\"type\":\"chunk\",\"content\":\" pain\"}\n\n",
        "data: {\"type\":\"done\"}\n\n",
        "data: {\"type\":\"chunk\",\"content\":\" ignored\"}\n\n",
    );

    Mock::given(method("GET"))
        .and(path("/simulation/stream"))
        .and(query_param("session_id", "s1"))
        .and(query_param("question", "What brings you in today?"))
        .and(query_param("token", "secret"))
        .respond_with(sse(body))
        .expect(1)
        .mount(&mock_server)
        .await;

    let transport = SseTransport::new(mock_server.uri());
    let request = StreamRequest::new("s1", "What brings you in today?")
        .with_token(Some("secret".to_string()));

    let events = collect(&transport, request).await;
    assert_eq!(
        events,
        vec![
            Ok(StreamEvent::Chunk {
                content: "I've".to_string(),
                speaker: Some("John Smith".to_string()),
            }),
            Ok(StreamEvent::chunk(" had")),
            Ok(StreamEvent::chunk(" pain")),
            Ok(StreamEvent::Done),
        ]
    );
}

#[tokio::test]
async fn session_end_carries_summary() {
    if network_tests_disabled() {
        return;
    }

    let mock_server = MockServer::start().await;
    let body = concat!(
        "data: {\"type\":\"chunk\",\"content\":\"Goodbye.\"}\n\n",
        "data: {\"type\":\"session_end\",\"summary\":\"Thorough history.\"}\n\n",
    );
    Mock::given(method("GET"))
        .and(path("/simulation/stream"))
        .respond_with(sse(body))
        .mount(&mock_server)
        .await;

    let transport = SseTransport::new(mock_server.uri());
    let events = collect(&transport, StreamRequest::new("s1", "Thanks")).await;

    assert_eq!(events.len(), 2);
    assert_eq!(
        events[1],
        Ok(StreamEvent::SessionEnd {
            summary: Some("Thorough history.".to_string())
        })
    );
}

#[tokio::test]
async fn body_ending_without_terminal_frame_is_an_error() {
    if network_tests_disabled() {
        return;
    }

    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/simulation/stream"))
        .respond_with(sse("data: {\"type\":\"chunk\",\"content\":\"I\"}\n\n"))
        .mount(&mock_server)
        .await;

    let transport = SseTransport::new(mock_server.uri());
    let events = collect(&transport, StreamRequest::new("s1", "Hello")).await;

    assert_eq!(events.len(), 2);
    assert!(events[0].is_ok());
    assert!(events[1].is_err());
}

#[tokio::test]
async fn unauthorized_open_reports_status() {
    if network_tests_disabled() {
        return;
    }

    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/simulation/stream"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
        .mount(&mock_server)
        .await;

    let transport = SseTransport::new(mock_server.uri());
    let err = transport
        .open(StreamRequest::new("s1", "Hello"))
        .await
        .expect_err("401 must fail to open");

    match err {
        TransportError::Status { status, body } => {
            assert_eq!(status, 401);
            assert_eq!(body, "token expired");
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn request_timeout_is_reported_as_timeout() {
    if network_tests_disabled() {
        return;
    }

    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/simulation/stream"))
        .respond_with(sse("data: {\"type\":\"done\"}\n\n").set_delay(Duration::from_millis(500)))
        .mount(&mock_server)
        .await;

    // The delay holds back the response headers, so this exercises the client
    // timeout rather than the silence watchdog.
    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(50))
        .build()
        .unwrap();
    let transport = SseTransport::new(mock_server.uri()).with_client(client);

    let err = transport
        .open(StreamRequest::new("s1", "Hello"))
        .await
        .expect_err("request should time out");
    assert!(err.raw_failure().message.contains("timed out"));
}

#[tokio::test]
async fn server_withholding_headers_times_out_on_open() {
    if network_tests_disabled() {
        return;
    }

    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/simulation/stream"))
        .respond_with(sse("data: {\"type\":\"done\"}\n\n").set_delay(Duration::from_secs(3)))
        .mount(&mock_server)
        .await;

    let transport =
        SseTransport::new(mock_server.uri()).with_silence_timeout(Duration::from_millis(100));

    let result = tokio::time::timeout(
        Duration::from_secs(1),
        transport.open(StreamRequest::new("s1", "Hello")),
    )
    .await
    .expect("open must give up on its own");

    match result {
        Err(TransportError::Timeout(d)) => assert_eq!(d, Duration::from_millis(100)),
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_session_is_rejected_without_request() {
    let transport = SseTransport::new("http://127.0.0.1:9");
    let request = StreamRequest {
        session_id: None,
        question: "Hello".to_string(),
        token: None,
    };

    assert!(matches!(
        transport.open(request).await,
        Err(TransportError::NoActiveSession)
    ));
}
