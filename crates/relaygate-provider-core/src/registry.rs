use std::collections::HashMap;
use std::sync::Arc;

use relaygate_protocol::openai::create_chat_completions::request::CreateChatCompletionRequest;
use tokio_util::sync::CancellationToken;

use crate::channel::{ChannelDescriptor, ChannelResolver};
use crate::errors::{ProviderError, ProviderResult};
use crate::invocation::RelayInvocation;
use crate::provider::{RelayResponse, UpstreamProvider};
use crate::usage::SharedUsageSink;

#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn UpstreamProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn UpstreamProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn UpstreamProvider>> {
        self.providers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// First channel, in resolver order, whose provider is registered.
    pub fn select<'a>(
        &self,
        channels: &'a [ChannelDescriptor],
    ) -> Option<(Arc<dyn UpstreamProvider>, &'a ChannelDescriptor)> {
        channels
            .iter()
            .find_map(|channel| self.get(&channel.provider).map(|provider| (provider, channel)))
    }

    pub async fn relay_with_channels(
        &self,
        resolver: &dyn ChannelResolver,
        caller: &str,
        request: CreateChatCompletionRequest,
        usage_sink: SharedUsageSink,
        cancel: CancellationToken,
    ) -> ProviderResult<RelayResponse> {
        let channels = resolver.resolve(caller).await?;
        let (provider, channel) = self.select(&channels).ok_or_else(|| {
            ProviderError::Config(format!(
                "no registered provider among {} channel(s)",
                channels.len()
            ))
        })?;
        let invocation = RelayInvocation::for_channel(request, channel)
            .with_usage_sink(usage_sink)
            .with_cancel(cancel);
        provider.relay(&invocation).await
    }
}
