//! Typed records for the events carried by a chat-messages stream.
//!
//! Every frame payload is a JSON object with an `event` discriminator. The
//! decoder first probes only that field, then decodes the whole payload into
//! the record selected by [`EventKind`]. Missing fields fall back to their
//! defaults; fields the service sends as `null` are `Option`s.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::{DeserializeOwned, IgnoredAny, MapAccess, Visitor};
use serde::{Deserialize, Deserializer as _, Serialize};

type JsonMap = serde_json::Map<String, serde_json::Value>;

/// Event discriminators understood by the decoder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Message,
    MessageFile,
    MessageEnd,
    MessageReplace,
    TtsMessage,
    TtsMessageEnd,
    WorkflowStarted,
    WorkflowFinished,
    NodeStarted,
    NodeFinished,
    Error,
    /// Any discriminator added upstream after this client was written.
    Unrecognized,
}

impl EventKind {
    /// Classifies a raw `event` value.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "message" => Self::Message,
            "message_file" => Self::MessageFile,
            "message_end" => Self::MessageEnd,
            "message_replace" => Self::MessageReplace,
            "tts_message" => Self::TtsMessage,
            "tts_message_end" => Self::TtsMessageEnd,
            "workflow_started" => Self::WorkflowStarted,
            "workflow_finished" => Self::WorkflowFinished,
            "node_started" => Self::NodeStarted,
            "node_finished" => Self::NodeFinished,
            "error" => Self::Error,
            _ => Self::Unrecognized,
        }
    }
}

/// Decoded payload of a recognised stream event.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Incremental answer text.
    Message(MessageEvent),
    /// A file produced by a tool or the model.
    MessageFile(MessageFileEvent),
    /// End of the answer, with usage and retriever metadata.
    MessageEnd(MessageEndEvent),
    /// Moderation replaced the whole answer so far.
    MessageReplace(MessageEvent),
    /// A chunk of base64 audio for text-to-speech.
    TtsMessage(TtsMessageEvent),
    /// Last (usually empty) audio chunk.
    TtsMessageEnd(TtsMessageEvent),
    WorkflowStarted(WorkflowStartedEvent),
    WorkflowFinished(WorkflowFinishedEvent),
    NodeStarted(NodeStartedEvent),
    NodeFinished(NodeFinishedEvent),
    /// Error reported by the service in-band.
    Error(ErrorEvent),
}

impl StreamEvent {
    /// Returns the task id shared by every event of one answer.
    ///
    /// `message_file` events carry no task id.
    pub fn task_id(&self) -> Option<&str> {
        match self {
            Self::Message(e) | Self::MessageReplace(e) => Some(&e.task_id),
            Self::MessageFile(_) => None,
            Self::MessageEnd(e) => Some(&e.task_id),
            Self::TtsMessage(e) | Self::TtsMessageEnd(e) => Some(&e.task_id),
            Self::WorkflowStarted(e) => Some(&e.task_id),
            Self::WorkflowFinished(e) => Some(&e.task_id),
            Self::NodeStarted(e) => Some(&e.task_id),
            Self::NodeFinished(e) => Some(&e.task_id),
            Self::Error(e) => Some(&e.task_id),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageEvent {
    pub task_id: String,
    pub message_id: String,
    pub conversation_id: String,
    pub answer: String,
    pub created_at: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageFileEvent {
    pub id: String,
    /// File kind, currently only `image`.
    #[serde(rename = "type")]
    pub file_type: String,
    /// Either `user` or `assistant`.
    pub belongs_to: String,
    pub url: String,
    pub conversation_id: String,
    pub created_at: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageEndEvent {
    pub task_id: String,
    pub message_id: String,
    pub conversation_id: String,
    pub metadata: JsonMap,
    pub created_at: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsMessageEvent {
    pub task_id: String,
    pub message_id: String,
    /// Base64-encoded audio block.
    pub audio: String,
    pub created_at: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowStartedEvent {
    pub task_id: String,
    pub workflow_run_id: String,
    pub data: WorkflowStartedData,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowStartedData {
    pub id: String,
    pub workflow_id: String,
    pub sequence_number: i64,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowFinishedEvent {
    pub task_id: String,
    pub workflow_run_id: String,
    pub data: WorkflowFinishedData,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowFinishedData {
    pub id: String,
    pub workflow_id: String,
    /// `running`, `succeeded`, `failed` or `stopped`.
    pub status: String,
    pub outputs: Option<JsonMap>,
    pub error: Option<String>,
    /// Seconds.
    pub elapsed_time: f64,
    pub total_tokens: i64,
    pub total_steps: i64,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeStartedEvent {
    pub task_id: String,
    pub workflow_run_id: String,
    pub data: NodeStartedData,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeStartedData {
    pub id: String,
    pub node_id: String,
    pub node_type: String,
    pub title: String,
    /// Execution order of the node within the run.
    pub index: i64,
    pub predecessor_node_id: Option<String>,
    pub inputs: Option<JsonMap>,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeFinishedEvent {
    pub task_id: String,
    pub workflow_run_id: String,
    pub data: NodeFinishedData,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeFinishedData {
    pub id: String,
    pub node_id: String,
    pub title: String,
    pub index: i64,
    pub predecessor_node_id: Option<String>,
    pub inputs: Option<JsonMap>,
    pub process_data: Option<JsonMap>,
    pub status: String,
    pub error: Option<String>,
    pub elapsed_time: f64,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub created_at: Option<DateTime<Utc>>,
    pub execution_metadata: Option<ExecutionMetadata>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionMetadata {
    pub total_tokens: i64,
    pub total_price: f64,
    pub currency: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorEvent {
    pub task_id: String,
    pub message_id: String,
    /// HTTP-like status code as reported by the service.
    pub status: serde_json::Value,
    pub code: String,
    pub message: String,
}

#[derive(Deserialize)]
#[serde(field_identifier, rename_all = "snake_case")]
enum ProbeField {
    Event,
    #[serde(other)]
    Other,
}

struct ProbeVisitor<'t> {
    tag: &'t mut Option<String>,
}

impl<'de> Visitor<'de> for ProbeVisitor<'_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an event object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<(), A::Error> {
        while let Some(field) = map.next_key::<ProbeField>()? {
            match field {
                ProbeField::Event => {
                    let value: serde_json::Value = map.next_value()?;
                    *self.tag = value.as_str().map(str::to_owned);
                    return Ok(());
                }
                ProbeField::Other => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }
        Ok(())
    }
}

/// Reads only the `event` field of a frame payload, walking the top-level
/// object until the key is found.
///
/// Never fails: a payload that is not an object, an `event` that is missing
/// or not a string, or malformed JSON before the key all yield `""`. Whatever
/// follows the key is not inspected.
pub(crate) fn probe_event(payload: &[u8]) -> String {
    let mut tag = None;
    let mut de = serde_json::Deserializer::from_slice(payload);
    // Stopping at the key leaves the object unterminated, so the result
    // carries no information beyond `tag`.
    let _ = de.deserialize_map(ProbeVisitor { tag: &mut tag });
    tag.unwrap_or_default()
}

/// Decodes a payload into the record for `kind`.
///
/// Returns `Ok(None)` for unrecognised events.
pub(crate) fn decode_event(
    kind: EventKind,
    payload: &[u8],
) -> Result<Option<StreamEvent>, serde_json::Error> {
    let event = match kind {
        EventKind::Message => StreamEvent::Message(typed(payload)?),
        EventKind::MessageFile => StreamEvent::MessageFile(typed(payload)?),
        EventKind::MessageEnd => StreamEvent::MessageEnd(typed(payload)?),
        EventKind::MessageReplace => StreamEvent::MessageReplace(typed(payload)?),
        EventKind::TtsMessage => StreamEvent::TtsMessage(typed(payload)?),
        EventKind::TtsMessageEnd => StreamEvent::TtsMessageEnd(typed(payload)?),
        EventKind::WorkflowStarted => StreamEvent::WorkflowStarted(typed(payload)?),
        EventKind::WorkflowFinished => StreamEvent::WorkflowFinished(typed(payload)?),
        EventKind::NodeStarted => StreamEvent::NodeStarted(typed(payload)?),
        EventKind::NodeFinished => StreamEvent::NodeFinished(typed(payload)?),
        EventKind::Error => StreamEvent::Error(typed(payload)?),
        EventKind::Unrecognized => return Ok(None),
    };
    Ok(Some(event))
}

fn typed<T: DeserializeOwned>(payload: &[u8]) -> Result<T, serde_json::Error> {
    serde_json::from_slice(payload)
}

/// Workflow and node timestamps arrive either as Unix seconds or as RFC 3339
/// strings depending on the service version.
mod timestamp {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, de::Error as _};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(i64),
        Fractional(f64),
        Text(String),
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Some(raw) = Option::<Raw>::deserialize(deserializer)? else {
            return Ok(None);
        };
        match raw {
            Raw::Seconds(secs) => DateTime::from_timestamp(secs, 0)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("timestamp out of range: {secs}"))),
            Raw::Fractional(secs) => {
                let whole = secs.floor();
                let nanos = ((secs - whole) * 1e9) as u32;
                let whole = whole as i64;
                DateTime::from_timestamp(whole, nanos)
                    .map(Some)
                    .ok_or_else(|| D::Error::custom(format!("timestamp out of range: {secs}")))
            }
            Raw::Text(text) => DateTime::parse_from_rfc3339(&text)
                .map(|dt| Some(dt.with_timezone(&Utc)))
                .map_err(|e| D::Error::custom(format!("invalid timestamp {text:?}: {e}"))),
        }
    }
}
