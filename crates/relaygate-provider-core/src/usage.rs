use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use relaygate_protocol::openai::create_chat_completions::types::CompletionUsage;

use crate::errors::ProviderResult;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageCounters {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
}

impl UsageCounters {
    pub fn new(prompt_tokens: i64, completion_tokens: i64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_tokens == 0
    }
}

impl From<UsageCounters> for CompletionUsage {
    fn from(value: UsageCounters) -> Self {
        CompletionUsage {
            prompt_tokens: value.prompt_tokens,
            completion_tokens: value.completion_tokens,
            total_tokens: value.total_tokens,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageRecord {
    pub trace_id: String,
    pub provider: String,
    pub model: String,
    pub usage: UsageCounters,
}

/// Usage ledger collaborator. Failures are logged by the caller, never
/// surfaced to the relayed request.
pub trait UsageSink: Send + Sync {
    fn record<'a>(
        &'a self,
        record: &'a UsageRecord,
    ) -> Pin<Box<dyn Future<Output = ProviderResult<()>> + Send + 'a>>;
}

pub type SharedUsageSink = Arc<dyn UsageSink>;

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopUsageSink;

impl UsageSink for NoopUsageSink {
    fn record<'a>(
        &'a self,
        _record: &'a UsageRecord,
    ) -> Pin<Box<dyn Future<Output = ProviderResult<()>> + Send + 'a>> {
        Box::pin(async { Ok(()) })
    }
}
