use std::sync::Arc;

use relaygate_provider_core::{ProviderRegistry, SharedUpstreamClient};

use crate::providers::coze::CozeProvider;

pub fn register_builtin_providers(registry: &mut ProviderRegistry, client: SharedUpstreamClient) {
    registry.register(Arc::new(CozeProvider::new(client)));
}
