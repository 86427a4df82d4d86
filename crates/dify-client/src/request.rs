use serde::{Deserialize, Serialize};

/// Path of the chat endpoint, relative to the base URL.
pub const CHAT_MESSAGES_PATH: &str = "/v1/chat-messages";

/// How the service should deliver the answer.
///
/// Set by the call path (`chat_messages` or `chat_messages_stream`), never
/// by the caller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    /// One complete JSON object.
    #[default]
    Blocking,
    /// A held-open sequence of `data:` frames.
    Streaming,
}

/// Body of a chat-messages call.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatMessageRequest {
    /// App variables, passed through as-is.
    pub inputs: serde_json::Map<String, serde_json::Value>,
    /// User query text.
    pub query: String,
    pub response_mode: ResponseMode,
    /// Continue an existing conversation; omitted to start a new one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// End-user identifier, unique within the app.
    pub user: String,
}

impl ChatMessageRequest {
    /// Creates a request for a query on behalf of a user.
    pub fn new(query: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            user: user.into(),
            ..Self::default()
        }
    }

    /// Continues the given conversation.
    pub fn conversation_id(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    /// Sets one app input variable.
    pub fn input(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.inputs.insert(key.into(), value);
        self
    }
}

/// Response of a blocking chat-messages call.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatMessageResponse {
    pub event: String,
    pub id: String,
    pub message_id: String,
    pub task_id: String,
    pub mode: String,
    pub answer: String,
    pub conversation_id: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub created_at: i64,
}
