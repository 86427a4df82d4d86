//! Async client for the Dify chat-messages API.
//!
//! Two call modes are supported: [`DifyClient::chat_messages`] waits for one
//! complete JSON answer, [`DifyClient::chat_messages_stream`] decodes the
//! streamed `data:` frames into typed [`StreamEvent`]s delivered through a
//! [`ChatStream`].
//!
//! # Streaming
//!
//! ```no_run
//! use dify_client::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), DifyError> {
//! let client = DifyClient::from_env()?;
//! let mut stream = client
//!     .chat_messages_stream(
//!         ChatMessageRequest::new("What is Rust?", "user-1"),
//!         CancellationToken::new(),
//!     )
//!     .await?;
//!
//! while let Some(message) = stream.next_message().await {
//!     match (message.data, message.error) {
//!         (_, Some(error)) => eprintln!("stream failed: {error}"),
//!         (Some(StreamEvent::Message(chunk)), None) => print!("{}", chunk.answer),
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

/// Client entry point.
pub mod client;
/// Client configuration.
pub mod config;
/// Public error types.
pub mod errors;
/// Typed stream event records.
pub mod events;
/// Process-wide tracing setup.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
/// Request and blocking response bodies.
pub mod request;
/// Streaming decoder and consumer handle.
pub mod stream;
/// HTTP transport seam.
pub mod transport;

pub use client::DifyClient;
pub use config::DifyClientConfig;
pub use errors::{DifyError, StreamError};
pub use events::{EventKind, StreamEvent};
pub use request::{ChatMessageRequest, ChatMessageResponse, ResponseMode};
pub use stream::{ChatStream, StreamMessage};
pub use transport::{ApiRequest, ByteStream, HttpTransport, ReqwestTransport};
