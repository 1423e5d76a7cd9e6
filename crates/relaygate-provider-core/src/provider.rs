use async_trait::async_trait;
use bytes::Bytes;

use crate::errors::{ProviderError, ProviderResult};
use crate::headers::Headers;
use crate::http::{ByteStream, UpstreamByteStream};
use crate::invocation::RelayInvocation;
use crate::usage::UsageCounters;

/// How the upstream signals that the work is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The first response already carries the result.
    Immediate,
    /// The first response only accepts the job; status must be polled.
    Polled,
    /// The first response is an event stream.
    Streamed,
}

/// Upstream request produced by `convert_request`.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamPayload {
    /// Endpoint path appended to the channel base URL.
    pub path: &'static str,
    pub body: Bytes,
    pub completion: Completion,
}

impl UpstreamPayload {
    pub fn is_stream(&self) -> bool {
        self.completion == Completion::Streamed
    }
}

/// What `execute` hands to `normalize_response`.
#[derive(Debug)]
pub enum RawResult {
    /// Final upstream JSON, after any polling. `usage` holds counters the
    /// completion detector captured along the way.
    Json {
        status: u16,
        body: Bytes,
        usage: Option<UsageCounters>,
    },
    Stream {
        status: u16,
        body: UpstreamByteStream,
    },
}

/// Canonical result written back to the caller.
#[derive(Debug)]
pub enum RelayResponse {
    Json {
        status: u16,
        headers: Headers,
        body: Bytes,
    },
    Stream {
        status: u16,
        headers: Headers,
        body: ByteStream,
    },
}

impl RelayResponse {
    pub fn status(&self) -> u16 {
        match self {
            RelayResponse::Json { status, .. } | RelayResponse::Stream { status, .. } => *status,
        }
    }

    pub fn headers(&self) -> &Headers {
        match self {
            RelayResponse::Json { headers, .. } | RelayResponse::Stream { headers, .. } => headers,
        }
    }
}

#[async_trait]
pub trait UpstreamProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn supported_models(&self) -> Vec<String>;

    fn convert_request(&self, invocation: &RelayInvocation) -> ProviderResult<UpstreamPayload>;

    fn build_request_url(
        &self,
        invocation: &RelayInvocation,
        payload: &UpstreamPayload,
    ) -> ProviderResult<String> {
        Ok(format!("{}{}", invocation.base_url(), payload.path))
    }

    async fn set_auth_headers(
        &self,
        invocation: &RelayInvocation,
        headers: &mut Headers,
    ) -> ProviderResult<()>;

    async fn execute(
        &self,
        invocation: &RelayInvocation,
        payload: UpstreamPayload,
    ) -> ProviderResult<RawResult>;

    async fn normalize_response(
        &self,
        invocation: &RelayInvocation,
        raw: RawResult,
    ) -> ProviderResult<RelayResponse>;

    /// Translate, execute and normalize one invocation.
    async fn relay(&self, invocation: &RelayInvocation) -> ProviderResult<RelayResponse> {
        if invocation.cancel.is_cancelled() {
            return Err(ProviderError::Canceled);
        }
        let payload = self.convert_request(invocation)?;
        let raw = self.execute(invocation, payload).await?;
        self.normalize_response(invocation, raw).await
    }
}
