use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde_json::{Map, Value as JsonValue};
use tracing::{error, info};

use relaygate_protocol::openai::create_chat_completions::request::CreateChatCompletionRequest;
use relaygate_provider_core::{
    CancellationToken, ChannelDescriptor, ProviderRegistry, RelayResponse, StaticChannelResolver,
};
use relaygate_provider_impl::{UpstreamClientConfig, WreqUpstreamClient, register_builtin_providers};

mod cli;
mod usage_sink;

use crate::cli::Cli;
use crate::usage_sink::LogUsageSink;

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("relaygate failed: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = read_settings(&cli.settings)?;
    if let Some(proxy) = cli.proxy.as_deref().filter(|proxy| !proxy.trim().is_empty()) {
        settings.insert("proxy_url".to_string(), JsonValue::String(proxy.to_string()));
    }
    let request: CreateChatCompletionRequest = serde_json::from_str(&read_input(&cli.request)?)
        .context("request is not a chat completion")?;

    let client = Arc::new(WreqUpstreamClient::new(UpstreamClientConfig::default())?);
    let mut registry = ProviderRegistry::new();
    register_builtin_providers(&mut registry, client);
    info!(providers = ?registry.names(), "providers registered");

    let resolver = StaticChannelResolver::new(vec![ChannelDescriptor {
        provider: cli.provider.clone(),
        base_url: cli.base_url.clone(),
        settings,
    }]);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupted");
                cancel.cancel();
            }
        });
    }

    info!(model = %request.model, stream = request.is_stream(), "relaying");
    let result = registry
        .relay_with_channels(
            &resolver,
            &cli.caller,
            request,
            Arc::new(LogUsageSink),
            cancel,
        )
        .await;

    let mut stdout = std::io::stdout().lock();
    match result {
        Ok(RelayResponse::Json { status, body, .. }) => {
            info!(status, "relay complete");
            stdout.write_all(&body)?;
            stdout.write_all(b"\n")?;
        }
        Ok(RelayResponse::Stream {
            status, mut body, ..
        }) => {
            info!(status, "streaming");
            while let Some(frame) = body.recv().await {
                stdout.write_all(&frame)?;
                stdout.flush()?;
            }
        }
        Err(err) => {
            error!(status = err.status_code(), error = %err, "relay failed");
            serde_json::to_writer(&mut stdout, &err.error_body())?;
            stdout.write_all(b"\n")?;
            stdout.flush()?;
            return Err(err.into());
        }
    }
    stdout.flush()?;
    Ok(())
}

fn read_input(path: &Path) -> anyhow::Result<String> {
    if path.as_os_str() == "-" {
        let mut raw = String::new();
        std::io::stdin().read_to_string(&mut raw)?;
        return Ok(raw);
    }
    std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}

fn read_settings(path: &Path) -> anyhow::Result<Map<String, JsonValue>> {
    let raw = read_input(path)?;
    match serde_json::from_str(&raw).context("settings are not json")? {
        JsonValue::Object(map) => Ok(map),
        _ => anyhow::bail!("settings must be a json object"),
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("relaygate=info,relaygate_provider_impl=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
