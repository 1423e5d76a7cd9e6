use std::sync::Arc;

use relaygate_protocol::openai::create_chat_completions::request::CreateChatCompletionRequest;
use serde_json::{Map, Value as JsonValue};
use tokio_util::sync::CancellationToken;

use crate::channel::ChannelDescriptor;
use crate::usage::{NoopUsageSink, SharedUsageSink};

/// Per-call context. Built once per relayed request and never shared.
#[derive(Clone)]
pub struct RelayInvocation {
    pub trace_id: String,
    pub request: CreateChatCompletionRequest,
    pub base_url: String,
    pub model: String,
    pub settings: Map<String, JsonValue>,
    pub is_stream: bool,
    /// Prompt tokens declared by the caller; estimated locally when absent.
    pub prompt_tokens: Option<i64>,
    /// Bot id carried by the calling context, used when settings name none.
    pub bot_id: Option<String>,
    pub usage_sink: SharedUsageSink,
    pub cancel: CancellationToken,
}

impl RelayInvocation {
    pub fn new(request: CreateChatCompletionRequest, base_url: impl Into<String>) -> Self {
        let model = request.model.clone();
        let is_stream = request.is_stream();
        Self {
            trace_id: format!("chatcmpl-{}", uuid::Uuid::new_v4().simple()),
            request,
            base_url: base_url.into(),
            model,
            settings: Map::new(),
            is_stream,
            prompt_tokens: None,
            bot_id: None,
            usage_sink: Arc::new(NoopUsageSink),
            cancel: CancellationToken::new(),
        }
    }

    pub fn for_channel(request: CreateChatCompletionRequest, channel: &ChannelDescriptor) -> Self {
        Self::new(request, channel.base_url.clone()).with_settings(channel.settings.clone())
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = trace_id.into();
        self
    }

    pub fn with_settings(mut self, settings: Map<String, JsonValue>) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_prompt_tokens(mut self, prompt_tokens: i64) -> Self {
        self.prompt_tokens = Some(prompt_tokens);
        self
    }

    pub fn with_bot_id(mut self, bot_id: impl Into<String>) -> Self {
        self.bot_id = Some(bot_id.into());
        self
    }

    pub fn with_usage_sink(mut self, usage_sink: SharedUsageSink) -> Self {
        self.usage_sink = usage_sink;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Seconds since the unix epoch, for canonical `created` fields.
    pub fn created(&self) -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs() as i64)
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for RelayInvocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayInvocation")
            .field("trace_id", &self.trace_id)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("is_stream", &self.is_stream)
            .finish_non_exhaustive()
    }
}
