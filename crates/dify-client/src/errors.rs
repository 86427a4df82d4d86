/// Errors returned directly from client calls, before any stream channel
/// exists.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DifyError {
    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Request body could not be serialized.
    #[error("encode error: {0}")]
    Encode(String),
    /// The call could not be set up: connection refused, timeout, or a
    /// non-2xx status from the service.
    #[error("connection error: {message}")]
    Connection {
        message: String,
        status_code: Option<u16>,
    },
    /// Reading a buffered response body failed.
    #[error("transport error: {0}")]
    Transport(String),
    /// Response body did not match the expected JSON shape.
    #[error("decode error: {0}")]
    Decode(String),
}

impl DifyError {
    /// Creates a connection error without a status code.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            status_code: None,
        }
    }

    /// Creates a connection error for a non-success HTTP status.
    pub fn status(status_code: u16, message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    /// Returns the HTTP status attached to a connection error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Connection { status_code, .. } => *status_code,
            _ => None,
        }
    }
}

/// Terminal failure delivered in-band on a `StreamMessage`.
///
/// Either variant is always the last message before the channel closes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// The byte stream failed mid-session.
    #[error("error reading line: {0}")]
    Read(String),
    /// A frame with a recognised event could not be decoded.
    #[error("error decoding frame: {0}")]
    Decode(String),
    /// The service reported an `error` event. Only produced by
    /// `ChatStream::collect_answer`; the raw stream relays such events as
    /// typed payloads.
    #[error("service error ({code}): {message}")]
    Service { code: String, message: String },
}
