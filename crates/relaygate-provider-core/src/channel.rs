use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::errors::ProviderResult;

/// One upstream target a caller may reach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    pub provider: String,
    pub base_url: String,
    #[serde(default)]
    pub settings: Map<String, JsonValue>,
}

/// Access-control collaborator: caller credential to ordered channels.
pub trait ChannelResolver: Send + Sync {
    fn resolve<'a>(
        &'a self,
        caller: &'a str,
    ) -> Pin<Box<dyn Future<Output = ProviderResult<Vec<ChannelDescriptor>>> + Send + 'a>>;
}

/// Serves the same channel list to every caller.
#[derive(Debug, Clone, Default)]
pub struct StaticChannelResolver {
    channels: Vec<ChannelDescriptor>,
}

impl StaticChannelResolver {
    pub fn new(channels: Vec<ChannelDescriptor>) -> Self {
        Self { channels }
    }
}

impl ChannelResolver for StaticChannelResolver {
    fn resolve<'a>(
        &'a self,
        _caller: &'a str,
    ) -> Pin<Box<dyn Future<Output = ProviderResult<Vec<ChannelDescriptor>>> + Send + 'a>> {
        Box::pin(async move { Ok(self.channels.clone()) })
    }
}
