//! JWT-authenticated bot/workflow upstream (`coze_jwt`).
//!
//! Models prefixed `workflow:` / `workflow-async:` run a workflow; any other
//! model talks to a bot through the conversational API.

mod config;
mod oauth;
mod poll;
mod request;
mod response;
mod stream;

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;

use relaygate_protocol::coze::chat::{ChatResponse, ChatStatus, MessageListResponse};
use relaygate_protocol::coze::types::CozeUsage;
use relaygate_protocol::coze::workflow::{WorkflowResponse, WorkflowStatus};
use relaygate_protocol::sse::EVENT_STREAM_CONTENT_TYPE;
use relaygate_provider_core::headers::content_type;
use relaygate_provider_core::{
    Completion, Headers, ProviderError, ProviderResult, RawResult, RelayInvocation,
    RelayResponse, SharedUpstreamClient, UpstreamBody, UpstreamHttpRequest, UpstreamPayload,
    UpstreamProvider, UsageCounters,
};

use crate::auth_extractor::{set_accept_event_stream, set_accept_json, set_bearer};

pub use config::{ClientFingerprint, CozeJwtConfig};
pub use oauth::{Clock, CredentialCache, JwtOAuthClient, TOKEN_EXPIRY_MARGIN_SECS, cache_expiry};
pub use poll::PollingPolicy;
pub use request::{
    CHAT_MESSAGE_LIST_PATH, CHAT_PATH, CHAT_RETRIEVE_PATH, CozeRequest, CozeRoute,
    WORKFLOW_ASYNC_PREFIX, WORKFLOW_PREFIX, WORKFLOW_RUN_PATH, WORKFLOW_STATUS_PATH, route,
    translate,
};
pub use response::{WORKFLOW_PLACEHOLDER, answer_text, workflow_output_text};
pub use stream::StreamReframer;

pub const PROVIDER_NAME: &str = "coze_jwt";

const MODEL_LIST: &[&str] = &[
    "moonshot-v1-8k",
    "moonshot-v1-32k",
    "moonshot-v1-128k",
    "Baichuan4",
    "abab6.5s-chat-pro",
    "glm-4-0520",
    "qwen-max",
    "deepseek-r1",
    "deepseek-v3",
    "deepseek-r1-distill-qwen-32b",
    "deepseek-r1-distill-qwen-7b",
    "step-1v-8k",
    "step-1.5v-mini",
    "Doubao-pro-32k",
    "Doubao-pro-256k",
    "Doubao-lite-128k",
    "Doubao-lite-32k",
    "Doubao-vision-lite-32k",
    "Doubao-vision-pro-32k",
    "Doubao-1.5-pro-vision-32k",
    "Doubao-1.5-lite-32k",
    "Doubao-1.5-pro-32k",
    "Doubao-1.5-thinking-pro",
    "Doubao-1.5-pro-256k",
];

/// Upstream envelopes carry their own business status next to the HTTP one.
trait Envelope {
    fn code(&self) -> i64;
    fn msg(&self) -> &str;
}

macro_rules! impl_envelope {
    ($($ty:ty),+) => {
        $(impl Envelope for $ty {
            fn code(&self) -> i64 {
                self.code
            }

            fn msg(&self) -> &str {
                &self.msg
            }
        })+
    };
}

impl_envelope!(ChatResponse, MessageListResponse, WorkflowResponse);

fn body_preview(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    text.chars().take(512).collect()
}

/// Decode an upstream envelope and reject non-zero business codes.
///
/// The HTTP status is only consulted when the body is not an envelope at
/// all; a decodable envelope with `code == 0` is accepted whatever the status.
fn decode_envelope<T>(status: u16, body: &[u8]) -> ProviderResult<T>
where
    T: DeserializeOwned + Envelope,
{
    let envelope: T = serde_json::from_slice(body).map_err(|err| {
        if (200..300).contains(&status) {
            ProviderError::decode(err)
        } else {
            ProviderError::Upstream {
                code: i64::from(status),
                message: body_preview(body),
            }
        }
    })?;
    if envelope.code() != 0 {
        return Err(ProviderError::Upstream {
            code: envelope.code(),
            message: envelope.msg().to_string(),
        });
    }
    Ok(envelope)
}

fn usage_from_coze(usage: CozeUsage) -> UsageCounters {
    let total = if usage.token_count > 0 {
        usage.token_count
    } else {
        usage.input_count + usage.output_count
    };
    UsageCounters {
        prompt_tokens: usage.input_count,
        completion_tokens: usage.output_count,
        total_tokens: total,
    }
}

pub struct CozeProvider {
    client: SharedUpstreamClient,
    credentials: CredentialCache,
    polling: PollingPolicy,
}

impl CozeProvider {
    pub fn new(client: SharedUpstreamClient) -> Self {
        Self {
            client,
            credentials: CredentialCache::new(),
            polling: PollingPolicy::default(),
        }
    }

    pub fn with_polling(mut self, polling: PollingPolicy) -> Self {
        self.polling = polling;
        self
    }

    pub fn with_credentials(mut self, credentials: CredentialCache) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn credentials(&self) -> &CredentialCache {
        &self.credentials
    }

    async fn authorize(
        &self,
        invocation: &RelayInvocation,
        config: &CozeJwtConfig,
        headers: &mut Headers,
    ) -> ProviderResult<()> {
        let token = self
            .credentials
            .get_token(self.client.as_ref(), config, invocation.base_url())
            .await?;
        set_bearer(headers, &token);
        Ok(())
    }

    /// Authorized GET; the body is always read to the end.
    async fn get(
        &self,
        invocation: &RelayInvocation,
        config: &CozeJwtConfig,
        url: &str,
    ) -> ProviderResult<(u16, Bytes)> {
        let mut req = UpstreamHttpRequest::get(url).with_proxy(config.proxy_url.clone());
        set_accept_json(&mut req.headers);
        self.authorize(invocation, config, &mut req.headers).await?;
        let resp = self.client.send(req).await?;
        let status = resp.status;
        Ok((status, resp.into_bytes().await?))
    }

    async fn fetch_answer(
        &self,
        invocation: &RelayInvocation,
        config: &CozeJwtConfig,
        conversation_id: &str,
        chat_id: &str,
    ) -> ProviderResult<(u16, Bytes)> {
        let url = format!(
            "{}{}?conversation_id={}&chat_id={}",
            invocation.base_url(),
            CHAT_MESSAGE_LIST_PATH,
            urlencoding::encode(conversation_id),
            urlencoding::encode(chat_id)
        );
        self.get(invocation, config, &url).await
    }
}

#[async_trait]
impl UpstreamProvider for CozeProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn supported_models(&self) -> Vec<String> {
        MODEL_LIST.iter().map(|model| model.to_string()).collect()
    }

    fn convert_request(&self, invocation: &RelayInvocation) -> ProviderResult<UpstreamPayload> {
        let config = CozeJwtConfig::from_settings(&invocation.settings)?;
        translate(invocation, &config)?.into_payload()
    }

    async fn set_auth_headers(
        &self,
        invocation: &RelayInvocation,
        headers: &mut Headers,
    ) -> ProviderResult<()> {
        let config = CozeJwtConfig::from_settings(&invocation.settings)?;
        self.authorize(invocation, &config, headers).await
    }

    async fn execute(
        &self,
        invocation: &RelayInvocation,
        payload: UpstreamPayload,
    ) -> ProviderResult<RawResult> {
        let config = CozeJwtConfig::from_settings(&invocation.settings)?;
        let url = self.build_request_url(invocation, &payload)?;
        let completion = payload.completion;
        let mut req = UpstreamHttpRequest::post_json(url, payload.body)
            .with_stream(completion == Completion::Streamed)
            .with_proxy(config.proxy_url.clone());
        if completion == Completion::Streamed {
            set_accept_event_stream(&mut req.headers);
        } else {
            set_accept_json(&mut req.headers);
        }
        self.authorize(invocation, &config, &mut req.headers).await?;

        tracing::info!(
            trace_id = %invocation.trace_id,
            provider = PROVIDER_NAME,
            model = %invocation.model,
            path = payload.path,
            completion = ?completion,
            "relaying"
        );
        let resp = self.client.send(req).await?;
        let status = resp.status;

        match (route(&invocation.model), completion) {
            (_, Completion::Streamed) => {
                let is_event_stream = resp.is_success()
                    && content_type(&resp.headers).as_deref() == Some(EVENT_STREAM_CONTENT_TYPE);
                match resp.body {
                    UpstreamBody::Stream(body) if is_event_stream => {
                        Ok(RawResult::Stream { status, body })
                    }
                    body => {
                        let bytes = body.into_bytes().await?;
                        // A JSON envelope here carries the upstream's reason.
                        let _: ChatResponse = decode_envelope(status, &bytes)?;
                        Err(ProviderError::Decode(format!(
                            "expected an event stream, got status {status}: {}",
                            body_preview(&bytes)
                        )))
                    }
                }
            }
            (CozeRoute::Chat, _) => {
                let bytes = resp.into_bytes().await?;
                let created: ChatResponse = decode_envelope(status, &bytes)?;
                let chat = created.data;
                if chat.id.is_empty() || chat.conversation_id.is_empty() {
                    return Err(ProviderError::Decode(
                        "chat accepted without conversation or chat id".to_string(),
                    ));
                }
                let mut usage = None;
                if chat.status != ChatStatus::Completed {
                    usage = self
                        .wait_for_chat(invocation, &config, &chat.conversation_id, &chat.id)
                        .await?;
                }
                let (status, body) = self
                    .fetch_answer(invocation, &config, &chat.conversation_id, &chat.id)
                    .await?;
                Ok(RawResult::Json {
                    status,
                    body,
                    usage: usage.or_else(|| chat.usage.map(usage_from_coze)),
                })
            }
            (CozeRoute::Workflow { .. }, Completion::Immediate) => {
                let body = resp.into_bytes().await?;
                let run: WorkflowResponse = decode_envelope(status, &body)?;
                Ok(RawResult::Json {
                    status,
                    body,
                    usage: run.usage().map(usage_from_coze),
                })
            }
            (CozeRoute::Workflow { .. }, Completion::Polled) => {
                let bytes = resp.into_bytes().await?;
                let run: WorkflowResponse = decode_envelope(status, &bytes)?;
                let finished = if run.data.status == WorkflowStatus::Completed {
                    run
                } else if run.data.execute_id.is_empty() {
                    return Err(ProviderError::Decode(
                        "workflow accepted without execute_id".to_string(),
                    ));
                } else {
                    tracing::info!(
                        trace_id = %invocation.trace_id,
                        execute_id = %run.data.execute_id,
                        "workflow accepted"
                    );
                    self.wait_for_workflow(invocation, &config, &run.data.execute_id)
                        .await?
                };
                let body = serde_json::to_vec(&finished).map_err(ProviderError::decode)?;
                Ok(RawResult::Json {
                    status,
                    body: Bytes::from(body),
                    usage: finished.usage().map(usage_from_coze),
                })
            }
        }
    }

    async fn normalize_response(
        &self,
        invocation: &RelayInvocation,
        raw: RawResult,
    ) -> ProviderResult<RelayResponse> {
        self.normalize(invocation, raw).await
    }
}
