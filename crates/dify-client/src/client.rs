use std::sync::Arc;

use bytes::Bytes;
use reqwest::Method;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::DifyClientConfig;
use crate::errors::DifyError;
use crate::request::{CHAT_MESSAGES_PATH, ChatMessageRequest, ChatMessageResponse, ResponseMode};
use crate::stream::ChatStream;
use crate::transport::{ApiRequest, ByteStream, HttpTransport, ReqwestTransport};

/// Client for a Dify app's chat-messages API.
#[derive(Clone)]
pub struct DifyClient {
    transport: Arc<dyn HttpTransport>,
    stream_buffer_capacity: usize,
}

impl DifyClient {
    /// Creates a client backed by the default `reqwest` transport.
    pub fn new(config: DifyClientConfig) -> Result<Self, DifyError> {
        let stream_buffer_capacity = config.stream_buffer_capacity;
        let transport = ReqwestTransport::new(config)?;
        Ok(Self {
            transport: Arc::new(transport),
            stream_buffer_capacity,
        })
    }

    /// Creates a client from `DIFY_*` environment variables.
    pub fn from_env() -> Result<Self, DifyError> {
        Self::new(DifyClientConfig::from_env()?)
    }

    /// Creates a client over a custom transport, e.g. a proxy-aware one or a
    /// test double.
    pub fn with_transport(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            stream_buffer_capacity: 1,
        }
    }

    /// Overrides the stream channel capacity. Values below 1 are raised to 1.
    pub fn stream_buffer_capacity(mut self, capacity: usize) -> Self {
        self.stream_buffer_capacity = capacity.max(1);
        self
    }

    /// Builds an outbound request with a JSON body. Authentication and the
    /// base URL are applied by the transport.
    pub fn build_request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<ApiRequest, DifyError> {
        let body = serde_json::to_vec(body)
            .map_err(|e| DifyError::Encode(format!("failed to encode {path} body: {e}")))?;
        Ok(ApiRequest {
            method,
            path: path.to_string(),
            body: Some(Bytes::from(body)),
        })
    }

    /// Sends a chat message and waits for the complete answer.
    pub async fn chat_messages(
        &self,
        mut req: ChatMessageRequest,
    ) -> Result<ChatMessageResponse, DifyError> {
        req.response_mode = ResponseMode::Blocking;
        let http_req = self.build_request(Method::POST, CHAT_MESSAGES_PATH, &req)?;
        let body = self.transport.send(http_req).await?;
        serde_json::from_slice(&body)
            .map_err(|e| DifyError::Decode(format!("invalid chat-messages response: {e}")))
    }

    /// Sends a chat message in streaming mode and returns the undecoded body.
    pub async fn chat_messages_stream_raw(
        &self,
        mut req: ChatMessageRequest,
    ) -> Result<ByteStream, DifyError> {
        req.response_mode = ResponseMode::Streaming;
        let http_req = self.build_request(Method::POST, CHAT_MESSAGES_PATH, &req)?;
        self.transport.stream(http_req).await
    }

    /// Sends a chat message in streaming mode and decodes the events.
    ///
    /// Fails immediately if the call cannot be set up. Afterwards every
    /// outcome, including errors, arrives through the returned [`ChatStream`].
    /// Cancelling `cancel` (or dropping the stream) stops the decoder.
    pub async fn chat_messages_stream(
        &self,
        req: ChatMessageRequest,
        cancel: CancellationToken,
    ) -> Result<ChatStream, DifyError> {
        let conversation_id = req.conversation_id.clone().unwrap_or_default();
        let bytes = self.chat_messages_stream_raw(req).await?;
        let stream = ChatStream::spawn(bytes, self.stream_buffer_capacity, &cancel);
        debug!(stream_id = %stream.stream_id(), %conversation_id, "chat stream started");
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StreamEvent;
    use futures::stream;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeTransport {
        last_request: Mutex<Option<ApiRequest>>,
        body: &'static str,
        fail_with: Option<DifyError>,
    }

    impl FakeTransport {
        fn record(&self, req: ApiRequest) -> Result<(), DifyError> {
            *self.last_request.lock().expect("lock poisoned") = Some(req);
            match &self.fail_with {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            }
        }

        fn last_body(&self) -> serde_json::Value {
            let guard = self.last_request.lock().expect("lock poisoned");
            let req = guard.as_ref().expect("request recorded");
            serde_json::from_slice(req.body.as_ref().expect("body")).expect("json body")
        }
    }

    #[async_trait::async_trait]
    impl HttpTransport for FakeTransport {
        async fn send(&self, req: ApiRequest) -> Result<Bytes, DifyError> {
            self.record(req)?;
            Ok(Bytes::from_static(self.body.as_bytes()))
        }

        async fn stream(&self, req: ApiRequest) -> Result<ByteStream, DifyError> {
            self.record(req)?;
            let chunk: Result<Bytes, std::io::Error> = Ok(Bytes::from_static(self.body.as_bytes()));
            Ok(Box::pin(stream::iter(vec![chunk])))
        }
    }

    #[tokio::test]
    async fn blocking_call_forces_blocking_mode_and_decodes_response() {
        let transport = Arc::new(FakeTransport {
            body: r#"{"event":"message","id":"m1","message_id":"m1","task_id":"t1","mode":"chat","answer":"hello","conversation_id":"c1","metadata":{"usage":{"total_tokens":3}},"created_at":1705395332}"#,
            ..FakeTransport::default()
        });
        let client = DifyClient::with_transport(transport.clone());
        let mut req = ChatMessageRequest::new("hi", "u1");
        req.response_mode = ResponseMode::Streaming;

        let resp = client.chat_messages(req).await.expect("response");
        assert_eq!(resp.answer, "hello");
        assert_eq!(resp.conversation_id, "c1");
        assert!(resp.metadata.contains_key("usage"));

        let body = transport.last_body();
        assert_eq!(body["response_mode"], "blocking");
        let guard = transport.last_request.lock().expect("lock poisoned");
        let recorded = guard.as_ref().expect("request");
        assert_eq!(recorded.method, Method::POST);
        assert_eq!(recorded.path, CHAT_MESSAGES_PATH);
    }

    #[tokio::test]
    async fn blocking_call_rejects_non_json_body() {
        let client = DifyClient::with_transport(Arc::new(FakeTransport {
            body: "<html>gateway</html>",
            ..FakeTransport::default()
        }));
        let err = client
            .chat_messages(ChatMessageRequest::new("hi", "u1"))
            .await
            .expect_err("should fail");
        assert!(matches!(err, DifyError::Decode(_)));
    }

    #[tokio::test]
    async fn stream_call_forces_streaming_mode_and_decodes_events() {
        let transport = Arc::new(FakeTransport {
            body: "data: {\"event\":\"message\",\"task_id\":\"t1\",\"answer\":\"hi\"}\n",
            ..FakeTransport::default()
        });
        let client = DifyClient::with_transport(transport.clone());
        let mut stream = client
            .chat_messages_stream(
                ChatMessageRequest::new("hi", "u1").conversation_id("c1"),
                CancellationToken::new(),
            )
            .await
            .expect("stream");

        let first = stream.next_message().await.expect("message");
        assert!(matches!(first.data, Some(StreamEvent::Message(_))));
        assert!(stream.next_message().await.is_none());

        let body = transport.last_body();
        assert_eq!(body["response_mode"], "streaming");
        assert_eq!(body["conversation_id"], "c1");
    }

    #[tokio::test]
    async fn stream_setup_failure_is_returned_without_a_channel() {
        let client = DifyClient::with_transport(Arc::new(FakeTransport {
            fail_with: Some(DifyError::status(401, "unauthorized")),
            ..FakeTransport::default()
        }));
        let result = client
            .chat_messages_stream(ChatMessageRequest::new("hi", "u1"), CancellationToken::new())
            .await;
        match result {
            Ok(_) => panic!("setup failure should not produce a stream"),
            Err(err) => assert_eq!(err.status_code(), Some(401)),
        }
    }

    #[test]
    fn build_request_encodes_json_body() {
        let client = DifyClient::with_transport(Arc::new(FakeTransport::default()));
        let req = client
            .build_request(Method::POST, "/v1/chat-messages", &serde_json::json!({"query": "q"}))
            .expect("request");
        assert_eq!(req.body.as_deref(), Some(&br#"{"query":"q"}"#[..]));
    }

    #[test]
    fn stream_buffer_capacity_is_at_least_one() {
        let client = DifyClient::with_transport(Arc::new(FakeTransport::default()))
            .stream_buffer_capacity(0);
        assert_eq!(client.stream_buffer_capacity, 1);
    }
}
