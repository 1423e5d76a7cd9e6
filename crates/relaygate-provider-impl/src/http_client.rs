use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use wreq::{Client, Method, Proxy};

use relaygate_provider_core::{
    Headers, HttpMethod, ProviderError, ProviderResult, UpstreamBody, UpstreamClient,
    UpstreamByteStream, UpstreamHttpRequest, UpstreamHttpResponse, UpstreamTransportErrorKind,
};

const STREAM_BUFFER: usize = 16;

#[derive(Debug, Clone)]
pub struct UpstreamClientConfig {
    pub connect_timeout: Duration,
    /// Whole-call deadline. Long on purpose: event streams stay open for minutes.
    pub request_timeout: Duration,
    /// Longest gap between two body chunks before a stream is abandoned.
    /// Only streamed bodies are guarded; buffered calls wait up to
    /// `request_timeout`.
    pub stream_idle_timeout: Duration,
}

impl Default for UpstreamClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(86400),
            stream_idle_timeout: Duration::from_secs(30),
        }
    }
}

/// wreq-backed transport. Clients are keyed by forward proxy (`None` is the
/// direct client) and built at most once per key.
#[derive(Clone)]
pub struct WreqUpstreamClient {
    config: UpstreamClientConfig,
    clients: Arc<Mutex<HashMap<Option<String>, Client>>>,
}

impl WreqUpstreamClient {
    pub fn new(config: UpstreamClientConfig) -> Result<Self, wreq::Error> {
        let direct = build_client(&config, None)?;
        Ok(Self {
            config,
            clients: Arc::new(Mutex::new(HashMap::from([(None, direct)]))),
        })
    }

    fn client_for_proxy(&self, proxy: Option<&str>) -> ProviderResult<Client> {
        let key = proxy_key(proxy);
        let mut clients = self.clients.lock().map_err(|_| {
            ProviderError::transport(UpstreamTransportErrorKind::Other, "client cache poisoned")
        })?;
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        tracing::debug!(proxied = key.is_some(), "building upstream client");
        let client = build_client(&self.config, key.as_deref()).map_err(transport_error)?;
        clients.insert(key, client.clone());
        Ok(client)
    }
}

/// Trimmed proxy URL; blank means "no proxy".
fn proxy_key(proxy: Option<&str>) -> Option<String> {
    proxy
        .map(str::trim)
        .filter(|proxy| !proxy.is_empty())
        .map(str::to_string)
}

fn build_client(config: &UpstreamClientConfig, proxy: Option<&str>) -> Result<Client, wreq::Error> {
    let builder = Client::builder()
        .connect_timeout(config.connect_timeout)
        .timeout(config.request_timeout);
    match proxy {
        Some(proxy) => builder.proxy(Proxy::all(proxy)?).build(),
        None => builder.build(),
    }
}

impl UpstreamClient for WreqUpstreamClient {
    fn send<'a>(
        &'a self,
        req: UpstreamHttpRequest,
    ) -> Pin<Box<dyn Future<Output = ProviderResult<UpstreamHttpResponse>> + Send + 'a>> {
        Box::pin(async move {
            let client = self.client_for_proxy(req.proxy.as_deref())?;
            let method = match req.method {
                HttpMethod::Get => Method::GET,
                HttpMethod::Post => Method::POST,
            };
            tracing::debug!(method = req.method.as_str(), path = req.path(), "upstream request");

            let builder = req
                .headers
                .iter()
                .fold(client.request(method, &req.url), |builder, (name, value)| {
                    builder.header(name, value)
                });
            let builder = match req.body {
                Some(body) => builder.body(body),
                None => builder,
            };
            let resp = builder.send().await.map_err(transport_error)?;

            let status = resp.status().as_u16();
            let headers = collect_headers(resp.headers());
            // Error bodies are always buffered so callers can read the envelope.
            let body = if req.is_stream && (200..300).contains(&status) {
                UpstreamBody::Stream(spawn_body_pump(
                    resp.bytes_stream(),
                    self.config.stream_idle_timeout,
                ))
            } else {
                UpstreamBody::Bytes(resp.bytes().await.map_err(transport_error)?)
            };
            Ok(UpstreamHttpResponse {
                status,
                headers,
                body,
            })
        })
    }
}

/// Moves body chunks into a channel. The task owns the upstream body, so the
/// connection closes when the stream ends, stalls, or the receiver is dropped.
/// A stall or read failure is sent as a final `Err` so the reader can tell a
/// truncated body from a finished one.
fn spawn_body_pump<S>(body: S, idle: Duration) -> UpstreamByteStream
where
    S: Stream<Item = Result<Bytes, wreq::Error>> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    tokio::spawn(async move {
        let mut body = Box::pin(body);
        loop {
            let failure = match tokio::time::timeout(idle, body.next()).await {
                Err(_) => {
                    tracing::warn!(idle_secs = idle.as_secs(), "upstream stream went idle");
                    ProviderError::transport(
                        UpstreamTransportErrorKind::ReadTimeout,
                        format!("no upstream data for {}s", idle.as_secs()),
                    )
                }
                Ok(None) => break,
                Ok(Some(Err(err))) => {
                    tracing::warn!(error = %err, "upstream stream read failed");
                    transport_error(err)
                }
                Ok(Some(Ok(chunk))) => {
                    if tx.send(Ok(chunk)).await.is_err() {
                        break;
                    }
                    continue;
                }
            };
            let _ = tx.send(Err(failure)).await;
            break;
        }
    });
    rx
}

fn collect_headers(map: &wreq::header::HeaderMap) -> Headers {
    map.iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect()
}

fn transport_error(err: wreq::Error) -> ProviderError {
    ProviderError::transport(classify(&err), err.to_string())
}

fn classify(err: &wreq::Error) -> UpstreamTransportErrorKind {
    let message = err.to_string().to_ascii_lowercase();
    let mentions = |needles: &[&str]| needles.iter().any(|needle| message.contains(needle));

    if err.is_timeout() {
        return if mentions(&["read", "idle"]) {
            UpstreamTransportErrorKind::ReadTimeout
        } else {
            UpstreamTransportErrorKind::Timeout
        };
    }
    if mentions(&["tls", "ssl", "certificate"]) {
        return UpstreamTransportErrorKind::Tls;
    }
    if err.is_connect() && mentions(&["dns", "resolve"]) {
        return UpstreamTransportErrorKind::Dns;
    }
    if err.is_connect() || err.is_connection_reset() {
        return UpstreamTransportErrorKind::Connect;
    }
    UpstreamTransportErrorKind::Other
}
