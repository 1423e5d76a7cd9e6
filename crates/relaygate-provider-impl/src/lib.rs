//! Built-in upstream provider implementations and the wreq transport.
//!
//! Providers here translate canonical requests into upstream calls, drive any
//! polling the upstream needs, and normalize results back into canonical
//! responses. All network IO goes through an `UpstreamClient`.

mod auth_extractor;
pub mod http_client;
pub mod providers;
mod registry;
pub mod tokens;

pub use http_client::{UpstreamClientConfig, WreqUpstreamClient};
pub use providers::coze::{
    CozeJwtConfig, CozeProvider, CredentialCache, JwtOAuthClient, PollingPolicy,
};
pub use registry::register_builtin_providers;
