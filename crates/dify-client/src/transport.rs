use std::pin::Pin;

use bytes::Bytes;
use futures::{Stream, TryStreamExt as _};
use reqwest::Method;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderValue};
use tracing::debug;

use crate::config::DifyClientConfig;
use crate::errors::DifyError;

/// Live response body of a streaming call.
///
/// Dropping it releases the underlying connection.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static>>;

/// Transport-agnostic outbound request produced by
/// [`DifyClient::build_request`](crate::DifyClient::build_request).
#[derive(Clone, Debug, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the configured base URL, e.g. `/v1/chat-messages`.
    pub path: String,
    /// JSON-encoded body.
    pub body: Option<Bytes>,
}

/// Executes requests against the service.
///
/// Implementations own authentication and base URL resolution. A non-2xx
/// status must be reported as [`DifyError::Connection`] with the status code.
#[async_trait::async_trait]
pub trait HttpTransport: Send + Sync {
    /// Executes a request and returns the fully buffered body.
    async fn send(&self, req: ApiRequest) -> Result<Bytes, DifyError>;

    /// Executes a request and returns the body as a live byte stream.
    async fn stream(&self, req: ApiRequest) -> Result<ByteStream, DifyError>;
}

/// Default [`HttpTransport`] over `reqwest` with bearer auth.
pub struct ReqwestTransport {
    client: reqwest::Client,
    config: DifyClientConfig,
}

impl ReqwestTransport {
    /// Creates a transport from explicit client configuration.
    pub fn new(config: DifyClientConfig) -> Result<Self, DifyError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DifyError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    async fn execute(
        &self,
        req: ApiRequest,
        accept: &'static str,
    ) -> Result<reqwest::Response, DifyError> {
        let url = self.config.url(&req.path);
        debug!(method = %req.method, %url, "sending Dify request");

        let mut http_req = self
            .client
            .request(req.method, &url)
            .bearer_auth(&self.config.api_key)
            .header(ACCEPT, HeaderValue::from_static(accept));
        if let Some(body) = req.body {
            http_req = http_req
                .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                .body(body);
        }

        let response = http_req
            .send()
            .await
            .map_err(|e| DifyError::connection(format!("request to {url} failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(DifyError::status(
                status.as_u16(),
                format!("request to {url} failed with status {status}: {body}"),
            ));
        }
        Ok(response)
    }
}

#[async_trait::async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, req: ApiRequest) -> Result<Bytes, DifyError> {
        let response = self.execute(req, "application/json").await?;
        response
            .bytes()
            .await
            .map_err(|e| DifyError::Transport(format!("failed to read response body: {e}")))
    }

    async fn stream(&self, req: ApiRequest) -> Result<ByteStream, DifyError> {
        let response = self.execute(req, "text/event-stream").await?;
        Ok(Box::pin(
            response.bytes_stream().map_err(std::io::Error::other),
        ))
    }
}
