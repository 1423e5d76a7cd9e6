use std::path::PathBuf;

use clap::Parser;

/// Relay one canonical chat completion through a configured upstream channel.
#[derive(Parser)]
#[command(name = "relaygate")]
pub(crate) struct Cli {
    /// JSON object with the channel settings (`client_id`, `private_key`, ...).
    #[arg(long, env = "RELAYGATE_SETTINGS")]
    pub(crate) settings: PathBuf,
    /// Canonical request JSON; `-` reads stdin.
    #[arg(long, env = "RELAYGATE_REQUEST", default_value = "-")]
    pub(crate) request: PathBuf,
    #[arg(long, default_value = "https://api.coze.cn")]
    pub(crate) base_url: String,
    #[arg(long, default_value = "coze_jwt")]
    pub(crate) provider: String,
    /// Forward proxy; overrides `proxy_url` from the settings file.
    #[arg(long)]
    pub(crate) proxy: Option<String>,
    #[arg(long, default_value = "local")]
    pub(crate) caller: String,
}
