//! Core adapter abstractions for relaygate.
//!
//! This crate does **not** depend on any concrete HTTP client. Providers build
//! `UpstreamHttpRequest` values and hand them to an `UpstreamClient`; the
//! implementation crate supplies the real transport.

pub mod channel;
pub mod errors;
pub mod headers;
pub mod http;
pub mod invocation;
pub mod provider;
pub mod registry;
pub mod usage;

pub use channel::{ChannelDescriptor, ChannelResolver, StaticChannelResolver};
pub use errors::{ProviderError, ProviderResult};
pub use headers::{Headers, header_get, header_remove, header_set};
pub use http::{
    ByteStream, HttpMethod, SharedUpstreamClient, UpstreamBody, UpstreamClient,
    UpstreamByteStream, UpstreamHttpRequest, UpstreamHttpResponse, UpstreamTransportErrorKind,
};
pub use invocation::RelayInvocation;
pub use provider::{Completion, RawResult, RelayResponse, UpstreamPayload, UpstreamProvider};
pub use registry::ProviderRegistry;
pub use usage::{NoopUsageSink, SharedUsageSink, UsageCounters, UsageRecord, UsageSink};

pub use tokio_util::sync::CancellationToken;
