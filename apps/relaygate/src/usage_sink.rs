use std::future::Future;
use std::pin::Pin;

use relaygate_provider_core::{ProviderResult, UsageRecord, UsageSink};

/// Writes each usage record to the log instead of a ledger.
pub struct LogUsageSink;

impl UsageSink for LogUsageSink {
    fn record<'a>(
        &'a self,
        record: &'a UsageRecord,
    ) -> Pin<Box<dyn Future<Output = ProviderResult<()>> + Send + 'a>> {
        Box::pin(async move {
            tracing::info!(
                trace_id = %record.trace_id,
                provider = %record.provider,
                model = %record.model,
                prompt_tokens = record.usage.prompt_tokens,
                completion_tokens = record.usage.completion_tokens,
                total_tokens = record.usage.total_tokens,
                "usage"
            );
            Ok(())
        })
    }
}
