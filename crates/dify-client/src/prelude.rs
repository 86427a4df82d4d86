//! Common imports for typical client usage.
pub use crate::{
    ChatMessageRequest, ChatMessageResponse, ChatStream, DifyClient, DifyClientConfig, DifyError,
    StreamError, StreamEvent, StreamMessage,
};
pub use tokio_util::sync::CancellationToken;
