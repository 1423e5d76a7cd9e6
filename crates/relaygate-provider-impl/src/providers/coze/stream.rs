use bytes::Bytes;
use tokio::sync::mpsc;

use relaygate_protocol::coze::chat::{
    ChatData, ChatMessage, EVENT_CHAT_COMPLETED, EVENT_ERROR, EVENT_MESSAGE_DELTA,
};
use relaygate_protocol::coze::types::{CozeError, payload_text};
use relaygate_protocol::openai::create_chat_completions::stream::CreateChatCompletionStreamResponse;
use relaygate_protocol::sse::{SseEvent, SseParser, done_frame, json_frame};
use relaygate_provider_core::{ByteStream, RelayInvocation, UpstreamByteStream, UsageCounters};

use super::response::{backfill_usage, record_usage};
use super::usage_from_coze;

/// Turns upstream `event:`/`data:` blocks into canonical stream chunks.
///
/// Output depends only on the concatenated input bytes, never on how they
/// were split across reads.
pub struct StreamReframer {
    parser: SseParser,
    id: String,
    model: String,
    created: i64,
    text: String,
    usage: Option<UsageCounters>,
}

impl StreamReframer {
    pub fn new(id: impl Into<String>, model: impl Into<String>, created: i64) -> Self {
        Self {
            parser: SseParser::new(),
            id: id.into(),
            model: model.into(),
            created,
            text: String::new(),
            usage: None,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<CreateChatCompletionStreamResponse> {
        let events = self.parser.push_bytes(chunk);
        events
            .into_iter()
            .filter_map(|event| self.dispatch(event))
            .collect()
    }

    pub fn finish(&mut self) -> Vec<CreateChatCompletionStreamResponse> {
        let events = self.parser.finish();
        events
            .into_iter()
            .filter_map(|event| self.dispatch(event))
            .collect()
    }

    /// Every delta emitted so far, concatenated.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Usage from the terminal completion event, if one arrived.
    pub fn usage(&self) -> Option<UsageCounters> {
        self.usage
    }

    fn dispatch(&mut self, event: SseEvent) -> Option<CreateChatCompletionStreamResponse> {
        if !event.is_complete() {
            return None;
        }
        let name = event.event.as_deref().unwrap_or_default();
        match name {
            EVENT_CHAT_COMPLETED => match serde_json::from_str::<ChatData>(&event.data) {
                Ok(data) => {
                    self.usage = data.usage.map(usage_from_coze);
                    Some(CreateChatCompletionStreamResponse::stop(
                        &self.id,
                        &self.model,
                        self.created,
                    ))
                }
                Err(err) => {
                    tracing::warn!(trace_id = %self.id, event = name, error = %err, "skipping undecodable block");
                    None
                }
            },
            EVENT_MESSAGE_DELTA => match serde_json::from_str::<ChatMessage>(&event.data) {
                Ok(message) => {
                    let content = payload_text(&message.content);
                    self.text.push_str(&content);
                    Some(CreateChatCompletionStreamResponse::delta(
                        &self.id,
                        &self.model,
                        self.created,
                        content,
                    ))
                }
                Err(err) => {
                    tracing::warn!(trace_id = %self.id, event = name, error = %err, "skipping undecodable block");
                    None
                }
            },
            EVENT_ERROR => {
                match serde_json::from_str::<CozeError>(&event.data) {
                    Ok(err) => tracing::error!(
                        trace_id = %self.id,
                        code = err.code,
                        message = %err.message,
                        "upstream stream error event"
                    ),
                    Err(err) => {
                        tracing::warn!(trace_id = %self.id, event = name, error = %err, "skipping undecodable block")
                    }
                }
                None
            }
            _ => None,
        }
    }
}

async fn forward(
    tx: &mpsc::Sender<Bytes>,
    chunks: Vec<CreateChatCompletionStreamResponse>,
) -> bool {
    for chunk in chunks {
        let frame = match json_frame(&chunk) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(error = %err, "chunk encode failed");
                continue;
            }
        };
        if tx.send(frame).await.is_err() {
            return false;
        }
    }
    true
}

/// Reframe `upstream` on a background task and return the canonical frames.
///
/// The upstream receiver is dropped on every exit path, which closes the
/// upstream body. `[DONE]` and the usage record only follow an upstream body
/// that ended cleanly with the caller still attached; a truncated upstream
/// body closes the canonical stream without a terminator.
pub(crate) fn spawn_reframe(
    mut upstream: UpstreamByteStream,
    invocation: RelayInvocation,
    provider: &'static str,
) -> ByteStream {
    let (tx, rx) = mpsc::channel::<Bytes>(16);
    tokio::spawn(async move {
        let mut reframer =
            StreamReframer::new(&invocation.trace_id, &invocation.model, invocation.created());
        let ended_cleanly = loop {
            let next = tokio::select! {
                _ = invocation.cancel.cancelled() => {
                    tracing::info!(trace_id = %invocation.trace_id, "stream canceled");
                    break false;
                }
                _ = tx.closed() => {
                    tracing::info!(trace_id = %invocation.trace_id, "client left mid-stream");
                    break false;
                }
                next = upstream.recv() => next,
            };
            match next {
                None => break true,
                Some(Err(err)) => {
                    tracing::error!(
                        trace_id = %invocation.trace_id,
                        error = %err,
                        "upstream stream broke off"
                    );
                    break false;
                }
                Some(Ok(chunk)) => {
                    if !forward(&tx, reframer.push(&chunk)).await {
                        tracing::info!(trace_id = %invocation.trace_id, "client left mid-stream");
                        break false;
                    }
                }
            }
        };
        drop(upstream);

        if !ended_cleanly {
            return;
        }
        if !forward(&tx, reframer.finish()).await || tx.send(done_frame()).await.is_err() {
            return;
        }
        let usage = backfill_usage(&invocation, reframer.usage(), reframer.text());
        record_usage(&invocation, provider, usage).await;
    });
    rx
}
