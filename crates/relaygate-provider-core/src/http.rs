use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use crate::errors::ProviderResult;
use crate::headers::Headers;

/// Canonical frames handed to the caller.
pub type ByteStream = tokio::sync::mpsc::Receiver<Bytes>;

/// Upstream body chunks. An `Err` item ends the body early (read failure or
/// idle timeout) and is always the last item.
pub type UpstreamByteStream = tokio::sync::mpsc::Receiver<ProviderResult<Bytes>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

#[derive(Debug)]
pub enum UpstreamBody {
    Bytes(Bytes),
    Stream(UpstreamByteStream),
}

impl UpstreamBody {
    /// Collect the whole body; a stream is drained until the sender closes.
    /// A truncated stream is an error, never a shorter body.
    pub async fn into_bytes(self) -> ProviderResult<Bytes> {
        match self {
            UpstreamBody::Bytes(bytes) => Ok(bytes),
            UpstreamBody::Stream(mut rx) => {
                let mut buf = BytesMut::new();
                while let Some(chunk) = rx.recv().await {
                    buf.extend_from_slice(&chunk?);
                }
                Ok(buf.freeze())
            }
        }
    }
}

#[derive(Debug)]
pub struct UpstreamHttpResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: UpstreamBody,
}

impl UpstreamHttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub async fn into_bytes(self) -> ProviderResult<Bytes> {
        self.body.into_bytes().await
    }
}

#[derive(Debug, Clone)]
pub struct UpstreamHttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Headers,
    pub body: Option<Bytes>,
    pub is_stream: bool,
    /// Forward proxy for this call; `None` uses the default outbound client.
    pub proxy: Option<String>,
}

impl UpstreamHttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: Headers::new(),
            body: None,
            is_stream: false,
            proxy: None,
        }
    }

    pub fn post_json(url: impl Into<String>, body: Bytes) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: Some(body),
            is_stream: false,
            proxy: None,
        }
    }

    pub fn with_stream(mut self, is_stream: bool) -> Self {
        self.is_stream = is_stream;
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    /// Path plus query of `url`, for logging and test routing.
    pub fn path(&self) -> &str {
        let rest = self
            .url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.url);
        rest.find('/').map(|idx| &rest[idx..]).unwrap_or("/")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum UpstreamTransportErrorKind {
    Timeout,
    ReadTimeout,
    Connect,
    Dns,
    Tls,
    Other,
}

/// Outbound transport. Non-2xx responses are returned as values; only
/// failures with no HTTP response at all become `ProviderError::Transport`.
pub trait UpstreamClient: Send + Sync {
    fn send<'a>(
        &'a self,
        req: UpstreamHttpRequest,
    ) -> Pin<Box<dyn Future<Output = ProviderResult<UpstreamHttpResponse>> + Send + 'a>>;
}

pub type SharedUpstreamClient = Arc<dyn UpstreamClient>;
