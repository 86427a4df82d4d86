//! End-to-end tests of `DifyClient` over the real reqwest transport, with
//! wiremock standing in for the Dify service.

use dify_client::prelude::*;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const API_KEY: &str = "app-test-key";

fn client_for(server: &MockServer) -> DifyClient {
    DifyClient::new(DifyClientConfig::new(API_KEY).base_url(server.uri())).expect("client")
}

fn sse_body(lines: &[&str]) -> String {
    lines.iter().map(|line| format!("{line}\n")).collect()
}

async fn drain(mut stream: ChatStream) -> Vec<StreamMessage> {
    let mut out = Vec::new();
    while let Some(message) = stream.next_message().await {
        out.push(message);
    }
    out
}

#[tokio::test]
async fn blocking_call_sends_auth_and_decodes_answer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat-messages"))
        .and(header("authorization", format!("Bearer {API_KEY}").as_str()))
        .and(body_partial_json(serde_json::json!({
            "query": "hello",
            "user": "u-1",
            "response_mode": "blocking",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "event": "message",
            "id": "m-1",
            "message_id": "m-1",
            "task_id": "t-1",
            "mode": "chat",
            "answer": "Hi there",
            "conversation_id": "c-1",
            "metadata": {"usage": {"total_tokens": 12}},
            "created_at": 1705395332
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = client_for(&server)
        .chat_messages(ChatMessageRequest::new("hello", "u-1"))
        .await
        .expect("blocking call");
    assert_eq!(response.answer, "Hi there");
    assert_eq!(response.task_id, "t-1");
    assert_eq!(response.created_at, 1705395332);
}

#[tokio::test]
async fn blocking_call_surfaces_http_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat-messages"))
        .respond_with(ResponseTemplate::new(400).set_body_string(r#"{"code":"invalid_param"}"#))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .chat_messages(ChatMessageRequest::new("hello", "u-1"))
        .await
        .expect_err("should fail");
    assert_eq!(err.status_code(), Some(400));
    assert!(err.to_string().contains("invalid_param"));
}

#[tokio::test]
async fn streaming_call_decodes_every_frame_in_order() {
    let server = MockServer::start().await;
    let body = sse_body(&[
        r#"data: {"event":"workflow_started","task_id":"t1","workflow_run_id":"r1","data":{"id":"r1","workflow_id":"w1","sequence_number":1,"created_at":1705407629}}"#,
        "",
        r#"data: {"event":"node_started","task_id":"t1","workflow_run_id":"r1","data":{"id":"n1","node_id":"start","node_type":"start","title":"Start","index":1,"predecessor_node_id":null,"inputs":{},"created_at":1705407629}}"#,
        "",
        r#"data: {"event":"message","task_id":"t1","message_id":"m1","conversation_id":"c1","answer":"Hel","created_at":1705407629}"#,
        "",
        ": ping",
        r#"data: {"event":"message","task_id":"t1","message_id":"m1","conversation_id":"c1","answer":"lo","created_at":1705407629}"#,
        "",
        r#"data: {"event":"message_end","task_id":"t1","message_id":"m1","conversation_id":"c1","metadata":{"usage":{"total_tokens":5}}}"#,
        "",
        r#"data: {"event":"workflow_finished","task_id":"t1","workflow_run_id":"r1","data":{"id":"r1","workflow_id":"w1","status":"succeeded","outputs":{"answer":"Hello"},"error":null,"elapsed_time":0.5,"total_tokens":5,"total_steps":3,"created_at":1705407629,"finished_at":1727807631}}"#,
    ]);
    Mock::given(method("POST"))
        .and(path("/v1/chat-messages"))
        .and(header("accept", "text/event-stream"))
        .and(body_partial_json(serde_json::json!({"response_mode": "streaming"})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let stream = client_for(&server)
        .chat_messages_stream(ChatMessageRequest::new("hello", "u-1"), CancellationToken::new())
        .await
        .expect("stream");
    let messages = drain(stream).await;

    let events: Vec<&str> = messages.iter().map(|m| m.event.as_str()).collect();
    assert_eq!(
        events,
        vec![
            "workflow_started",
            "node_started",
            "message",
            "message",
            "message_end",
            "workflow_finished",
        ]
    );
    assert!(messages.iter().all(|m| m.error.is_none() && m.data.is_some()));
    let Some(StreamEvent::WorkflowFinished(finished)) = &messages[5].data else {
        panic!("expected workflow_finished payload");
    };
    assert_eq!(finished.data.status, "succeeded");
    assert_eq!(finished.data.total_steps, 3);
}

#[tokio::test]
async fn streaming_call_collects_answer() {
    let server = MockServer::start().await;
    let body = sse_body(&[
        r#"data: {"event":"message","task_id":"t1","answer":"Hello, "}"#,
        r#"data: {"event":"tts_message","task_id":"t1","audio":"AAAA"}"#,
        r#"data: {"event":"message","task_id":"t1","answer":"world"}"#,
        r#"data: {"event":"message_end","task_id":"t1"}"#,
    ]);
    Mock::given(method("POST"))
        .and(path("/v1/chat-messages"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let answer = client_for(&server)
        .chat_messages_stream(ChatMessageRequest::new("hello", "u-1"), CancellationToken::new())
        .await
        .expect("stream")
        .collect_answer()
        .await
        .expect("answer");
    assert_eq!(answer, "Hello, world");
}

#[tokio::test]
async fn streaming_decode_error_is_last_message() {
    let server = MockServer::start().await;
    let body = sse_body(&[
        r#"data: {"event":"message","task_id":"t1","answer":"ok"}"#,
        r#"data: {"event":"message","task_id":"#,
        r#"data: {"event":"message","task_id":"t1","answer":"never seen"}"#,
    ]);
    Mock::given(method("POST"))
        .and(path("/v1/chat-messages"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let stream = client_for(&server)
        .chat_messages_stream(ChatMessageRequest::new("hello", "u-1"), CancellationToken::new())
        .await
        .expect("stream");
    let messages = drain(stream).await;

    assert_eq!(messages.len(), 2);
    assert!(messages[0].error.is_none());
    assert_eq!(messages[1].event, "error");
    assert!(matches!(messages[1].error, Some(StreamError::Decode(_))));
}

#[tokio::test]
async fn streaming_setup_failure_returns_error_immediately() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat-messages"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;

    let result = client_for(&server)
        .chat_messages_stream(ChatMessageRequest::new("hello", "u-1"), CancellationToken::new())
        .await;
    match result {
        Ok(_) => panic!("401 should fail before a stream exists"),
        Err(err) => {
            assert_eq!(err.status_code(), Some(401));
            assert!(matches!(err, DifyError::Connection { .. }));
        }
    }
}

#[tokio::test]
async fn raw_stream_returns_undecoded_body() {
    use futures::TryStreamExt as _;

    let server = MockServer::start().await;
    let body = sse_body(&[r#"data: {"event":"message","answer":"raw"}"#]);
    Mock::given(method("POST"))
        .and(path("/v1/chat-messages"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body.clone(), "text/event-stream"))
        .mount(&server)
        .await;

    let chunks: Vec<bytes::Bytes> = client_for(&server)
        .chat_messages_stream_raw(ChatMessageRequest::new("hello", "u-1"))
        .await
        .expect("raw stream")
        .try_collect()
        .await
        .expect("read body");
    let joined: Vec<u8> = chunks.concat();
    assert_eq!(joined, body.as_bytes());
}
