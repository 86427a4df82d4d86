//! Decoder for the `data:` line protocol of streaming chat responses.
//!
//! One spawned task per stream reads the byte stream line by line, decodes
//! each frame into a [`StreamEvent`] and hands it to the consumer over a
//! bounded channel. Errors travel on the same channel as events; an error
//! message is always the last one before the channel closes.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::StreamExt as _;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::StreamError;
use crate::events::{EventKind, StreamEvent, decode_event, probe_event};
use crate::transport::ByteStream;

const FRAME_PREFIX: &[u8] = b"data:";
const ERROR_EVENT: &str = "error";

/// One unit delivered to the consumer of a [`ChatStream`].
#[derive(Clone, Debug, PartialEq)]
pub struct StreamMessage {
    /// Raw discriminator of the frame, or `error` when `error` is set.
    pub event: String,
    /// Typed payload. `None` for unrecognised events and for failures.
    pub data: Option<StreamEvent>,
    /// Terminal failure of the session.
    pub error: Option<StreamError>,
}

impl StreamMessage {
    fn decoded(event: String, data: Option<StreamEvent>) -> Self {
        Self {
            event,
            data,
            error: None,
        }
    }

    fn failed(error: StreamError) -> Self {
        Self {
            event: ERROR_EVENT.to_string(),
            data: None,
            error: Some(error),
        }
    }

    /// Whether this message ends the session with a failure.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Receiving end of a streaming chat call.
///
/// Dropping the handle cancels the decoder task.
pub struct ChatStream {
    stream_id: uuid::Uuid,
    rx: mpsc::Receiver<StreamMessage>,
    cancel: CancellationToken,
}

impl ChatStream {
    pub(crate) fn spawn(bytes: ByteStream, capacity: usize, parent: &CancellationToken) -> Self {
        let stream_id = uuid::Uuid::new_v4();
        let (tx, rx) = mpsc::channel(capacity);
        let cancel = parent.child_token();
        tokio::spawn(decode_stream(bytes, tx, cancel.clone(), stream_id));
        Self {
            stream_id,
            rx,
            cancel,
        }
    }

    /// Identifier used in log records of this stream.
    pub fn stream_id(&self) -> uuid::Uuid {
        self.stream_id
    }

    /// Stops the decoder. Messages already queued can still be received.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits for the next message. Returns `None` once the channel is closed.
    pub async fn next_message(&mut self) -> Option<StreamMessage> {
        self.rx.recv().await
    }

    /// Drains the stream and returns the full answer text.
    ///
    /// `message` chunks are appended, `message_replace` discards what was
    /// collected so far. An `error` event relayed by the service becomes
    /// [`StreamError::Service`].
    pub async fn collect_answer(mut self) -> Result<String, StreamError> {
        let mut answer = String::new();
        while let Some(message) = self.next_message().await {
            if let Some(error) = message.error {
                return Err(error);
            }
            match message.data {
                Some(StreamEvent::Message(chunk)) => answer.push_str(&chunk.answer),
                Some(StreamEvent::MessageReplace(replacement)) => answer = replacement.answer,
                Some(StreamEvent::Error(event)) => {
                    return Err(StreamError::Service {
                        code: event.code,
                        message: event.message,
                    });
                }
                Some(StreamEvent::MessageEnd(_)) => break,
                _ => {}
            }
        }
        Ok(answer)
    }
}

impl futures::Stream for ChatStream {
    type Item = StreamMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for ChatStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Splits a chunked byte stream into `\n`-terminated lines.
#[derive(Default)]
pub(crate) struct LineDecoder {
    buf: Vec<u8>,
    scanned: usize,
}

impl LineDecoder {
    pub fn push_chunk(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Pops the next complete line, newline excluded.
    pub fn next_line(&mut self) -> Option<Vec<u8>> {
        let offset = self.buf[self.scanned..].iter().position(|b| *b == b'\n');
        match offset {
            Some(offset) => {
                let end = self.scanned + offset;
                let line = self.buf[..end].to_vec();
                self.buf.drain(..=end);
                self.scanned = 0;
                Some(line)
            }
            None => {
                self.scanned = self.buf.len();
                None
            }
        }
    }

    /// Bytes received after the last newline.
    pub fn remainder(&self) -> &[u8] {
        &self.buf
    }
}

struct LineReader {
    bytes: ByteStream,
    decoder: LineDecoder,
}

impl LineReader {
    fn new(bytes: ByteStream) -> Self {
        Self {
            bytes,
            decoder: LineDecoder::default(),
        }
    }

    /// Returns `Ok(None)` on end of stream. A trailing line without a
    /// newline is not returned.
    async fn next_line(&mut self) -> Result<Option<Vec<u8>>, std::io::Error> {
        loop {
            if let Some(line) = self.decoder.next_line() {
                return Ok(Some(line));
            }
            match self.bytes.next().await {
                Some(Ok(chunk)) => self.decoder.push_chunk(&chunk),
                Some(Err(err)) => return Err(err),
                None => return Ok(None),
            }
        }
    }
}

/// Extracts the trimmed payload of a `data:` line.
pub(crate) fn frame_payload(line: &[u8]) -> Option<&[u8]> {
    let payload = line.strip_prefix(FRAME_PREFIX)?.trim_ascii();
    (!payload.is_empty()).then_some(payload)
}

/// Classifies and decodes one frame payload.
pub(crate) fn decode_frame(payload: &[u8]) -> StreamMessage {
    let tag = probe_event(payload);
    let kind = EventKind::from_tag(&tag);
    if kind == EventKind::Unrecognized {
        debug!(event = %tag, "passing through unrecognized event");
    }
    match decode_event(kind, payload) {
        Ok(data) => StreamMessage::decoded(tag, data),
        Err(err) => StreamMessage::failed(StreamError::Decode(format!("{tag}: {err}"))),
    }
}

/// Drives one decode session until end of stream, a fatal error,
/// cancellation, or the consumer going away. The byte stream and the sender
/// are dropped together on return.
pub(crate) async fn decode_stream(
    bytes: ByteStream,
    tx: mpsc::Sender<StreamMessage>,
    cancel: CancellationToken,
    stream_id: uuid::Uuid,
) {
    let mut reader = LineReader::new(bytes);
    let mut delivered = 0_u64;
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(%stream_id, delivered, "stream cancelled");
                return;
            }
            next = reader.next_line() => next,
        };

        let line = match next {
            Ok(Some(line)) => line,
            Ok(None) => {
                let trailing = reader.decoder.remainder().len();
                if trailing > 0 {
                    debug!(%stream_id, trailing, "discarding unterminated final line");
                }
                debug!(%stream_id, delivered, "stream ended");
                return;
            }
            Err(err) => {
                warn!(%stream_id, error = %err, "stream read failed");
                deliver(&tx, &cancel, StreamMessage::failed(StreamError::Read(err.to_string())))
                    .await;
                return;
            }
        };

        let Some(payload) = frame_payload(&line) else {
            continue;
        };
        let message = decode_frame(payload);
        let fatal = message.is_error();
        if let Some(error) = &message.error {
            warn!(%stream_id, %error, "stream frame could not be decoded");
        }
        if !deliver(&tx, &cancel, message).await {
            debug!(%stream_id, delivered, "stream consumer gone or cancelled");
            return;
        }
        delivered = delivered.saturating_add(1);
        if fatal {
            return;
        }
    }
}

/// Sends one message, giving up if the session is cancelled first or the
/// receiver was dropped.
async fn deliver(
    tx: &mpsc::Sender<StreamMessage>,
    cancel: &CancellationToken,
    message: StreamMessage,
) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        sent = tx.send(message) => sent.is_ok(),
    }
}
