use bytes::Bytes;
use tokio::sync::mpsc;

use relaygate_protocol::coze::chat::{MESSAGE_TYPE_ANSWER, MessageListResponse};
use relaygate_protocol::coze::types::payload_text;
use relaygate_protocol::coze::workflow::{WorkflowData, WorkflowResponse};
use relaygate_protocol::openai::create_chat_completions::response::CreateChatCompletionResponse;
use relaygate_protocol::openai::create_chat_completions::stream::CreateChatCompletionStreamResponse;
use relaygate_protocol::sse::{EVENT_STREAM_CONTENT_TYPE, done_frame, json_frame};
use relaygate_provider_core::{
    Headers, ProviderError, ProviderResult, RawResult, RelayInvocation, RelayResponse,
    UsageCounters, UsageRecord,
};

use super::request::{CozeRoute, route};
use super::stream::spawn_reframe;
use super::{CozeProvider, PROVIDER_NAME, decode_envelope, usage_from_coze};
use crate::tokens::estimate_tokens;

pub const WORKFLOW_PLACEHOLDER: &str = "workflow execution completed";

/// `result` when present, else every named output joined by newlines.
pub fn workflow_output_text(data: &WorkflowData) -> String {
    if let Some(result) = &data.result {
        let text = payload_text(result);
        if !text.is_empty() {
            return text;
        }
    }
    let outputs: Vec<String> = data
        .outputs
        .iter()
        .map(|output| payload_text(&output.output))
        .filter(|text| !text.is_empty())
        .collect();
    if outputs.is_empty() {
        WORKFLOW_PLACEHOLDER.to_string()
    } else {
        outputs.join("\n")
    }
}

/// Content of the first `answer` message.
pub fn answer_text(list: &MessageListResponse) -> Option<String> {
    list.data
        .iter()
        .find(|message| message.kind == MESSAGE_TYPE_ANSWER)
        .map(|message| payload_text(&message.content))
}

/// Reported usage, or a local estimate when the upstream reported none.
pub(crate) fn backfill_usage(
    invocation: &RelayInvocation,
    reported: Option<UsageCounters>,
    completion_text: &str,
) -> UsageCounters {
    if let Some(usage) = reported.filter(|usage| !usage.is_empty()) {
        return usage;
    }
    let prompt_tokens = invocation
        .prompt_tokens
        .unwrap_or_else(|| estimate_tokens(&invocation.request.prompt_text()));
    UsageCounters::new(prompt_tokens, estimate_tokens(completion_text))
}

pub(crate) async fn record_usage(
    invocation: &RelayInvocation,
    provider: &'static str,
    usage: UsageCounters,
) {
    let record = UsageRecord {
        trace_id: invocation.trace_id.clone(),
        provider: provider.to_string(),
        model: invocation.model.clone(),
        usage,
    };
    if let Err(err) = invocation.usage_sink.record(&record).await {
        tracing::warn!(trace_id = %invocation.trace_id, error = %err, "usage record failed");
    }
}

fn json_headers() -> Headers {
    vec![("content-type".to_string(), "application/json".to_string())]
}

pub(crate) fn event_stream_headers() -> Headers {
    vec![
        (
            "content-type".to_string(),
            EVENT_STREAM_CONTENT_TYPE.to_string(),
        ),
        ("cache-control".to_string(), "no-cache".to_string()),
    ]
}

impl CozeProvider {
    pub(crate) async fn normalize(
        &self,
        invocation: &RelayInvocation,
        raw: RawResult,
    ) -> ProviderResult<RelayResponse> {
        let (status, body, reported) = match raw {
            RawResult::Stream { status, body } => {
                return Ok(RelayResponse::Stream {
                    status,
                    headers: event_stream_headers(),
                    body: spawn_reframe(body, invocation.clone(), PROVIDER_NAME),
                });
            }
            RawResult::Json {
                status,
                body,
                usage,
            } => (status, body, usage),
        };

        let (text, reported) = match route(&invocation.model) {
            CozeRoute::Chat => {
                let list: MessageListResponse = decode_envelope(status, &body)?;
                let text = answer_text(&list).unwrap_or_else(|| {
                    tracing::warn!(trace_id = %invocation.trace_id, "no answer message in result");
                    String::new()
                });
                (text, reported)
            }
            CozeRoute::Workflow { .. } => {
                let resp: WorkflowResponse = decode_envelope(status, &body)?;
                let reported = reported.or_else(|| resp.usage().map(usage_from_coze));
                (workflow_output_text(&resp.data), reported)
            }
        };

        let usage = backfill_usage(invocation, reported, &text);
        let created = invocation.created();

        let response = if invocation.is_stream {
            RelayResponse::Stream {
                status,
                headers: event_stream_headers(),
                body: synthesized_stream(invocation, created, &text)?,
            }
        } else {
            let body = CreateChatCompletionResponse::assistant(
                &invocation.trace_id,
                &invocation.model,
                created,
                text,
                usage.into(),
            );
            let body = serde_json::to_vec(&body).map_err(ProviderError::decode)?;
            RelayResponse::Json {
                status,
                headers: json_headers(),
                body: Bytes::from(body),
            }
        };
        record_usage(invocation, PROVIDER_NAME, usage).await;
        Ok(response)
    }
}

/// One delta, one stop, then the terminator, for results that only exist
/// as a completed JSON body.
fn synthesized_stream(
    invocation: &RelayInvocation,
    created: i64,
    text: &str,
) -> ProviderResult<relaygate_provider_core::ByteStream> {
    let frames = [
        json_frame(&CreateChatCompletionStreamResponse::delta(
            &invocation.trace_id,
            &invocation.model,
            created,
            text,
        ))
        .map_err(ProviderError::decode)?,
        json_frame(&CreateChatCompletionStreamResponse::stop(
            &invocation.trace_id,
            &invocation.model,
            created,
        ))
        .map_err(ProviderError::decode)?,
        done_frame(),
    ];
    let (tx, rx) = mpsc::channel::<Bytes>(frames.len());
    for frame in frames {
        if tx.try_send(frame).is_err() {
            break;
        }
    }
    Ok(rx)
}
