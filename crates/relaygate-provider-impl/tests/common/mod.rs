#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use serde_json::{Map, Value as JsonValue, json};
use tokio::sync::mpsc;

use relaygate_protocol::openai::create_chat_completions::request::CreateChatCompletionRequest;
use relaygate_protocol::openai::create_chat_completions::types::ChatCompletionRequestMessage;
use relaygate_provider_core::{
    Headers, ProviderResult, RelayInvocation, UpstreamBody, UpstreamClient, UpstreamHttpRequest,
    UpstreamHttpResponse, UpstreamTransportErrorKind, UsageRecord, UsageSink,
};

pub const BASE_URL: &str = "https://api.coze.test";
pub const TEST_RSA_PEM: &str = include_str!("../fixtures/test_rsa.pem");

#[derive(Debug, Clone)]
pub enum Scripted {
    Json { status: u16, body: JsonValue },
    /// Event stream that ends cleanly after the chunks.
    Events(Vec<&'static str>),
    /// Event stream that stays open after the chunks; see `held_streams`.
    HeldEvents(Vec<&'static str>),
    /// Event stream whose read fails after the chunks.
    BrokenEvents(Vec<&'static str>),
}

impl Scripted {
    pub fn ok(body: JsonValue) -> Self {
        Scripted::Json { status: 200, body }
    }
}

/// In-process upstream: canned responses per path, plus a request log.
///
/// Each path serves its queue in order; the last entry repeats forever.
#[derive(Default)]
pub struct ScriptedClient {
    routes: Mutex<HashMap<String, VecDeque<Scripted>>>,
    log: Mutex<Vec<UpstreamHttpRequest>>,
    held: Mutex<Vec<mpsc::Sender<ProviderResult<Bytes>>>>,
}

impl ScriptedClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, path: &str, response: Scripted) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(response);
        self
    }

    pub fn requests(&self, path: &str) -> Vec<UpstreamHttpRequest> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|req| route_of(req) == path)
            .cloned()
            .collect()
    }

    pub fn count(&self, path: &str) -> usize {
        self.requests(path).len()
    }

    pub fn all_requests(&self) -> Vec<UpstreamHttpRequest> {
        self.log.lock().unwrap().clone()
    }

    /// Senders of `HeldEvents` bodies, in the order they were served.
    pub fn held_streams(&self) -> Vec<mpsc::Sender<ProviderResult<Bytes>>> {
        self.held.lock().unwrap().clone()
    }
}

fn event_body(chunks: &[&'static str], tail: usize) -> (mpsc::Sender<ProviderResult<Bytes>>, UpstreamHttpResponse) {
    let (tx, rx) = mpsc::channel(chunks.len() + tail);
    for chunk in chunks {
        let _ = tx.try_send(Ok(Bytes::from_static(chunk.as_bytes())));
    }
    let resp = UpstreamHttpResponse {
        status: 200,
        headers: vec![(
            "content-type".to_string(),
            "text/event-stream; charset=utf-8".to_string(),
        )],
        body: UpstreamBody::Stream(rx),
    };
    (tx, resp)
}

fn route_of(req: &UpstreamHttpRequest) -> &str {
    req.path().split('?').next().unwrap_or_default()
}

impl UpstreamClient for ScriptedClient {
    fn send<'a>(
        &'a self,
        req: UpstreamHttpRequest,
    ) -> Pin<Box<dyn Future<Output = ProviderResult<UpstreamHttpResponse>> + Send + 'a>> {
        Box::pin(async move {
            let path = route_of(&req).to_string();
            self.log.lock().unwrap().push(req);
            let next = {
                let mut routes = self.routes.lock().unwrap();
                routes.get_mut(&path).and_then(|queue| {
                    if queue.len() > 1 {
                        queue.pop_front()
                    } else {
                        queue.front().cloned()
                    }
                })
            };
            let Some(next) = next else {
                return Err(relaygate_provider_core::ProviderError::transport(
                    UpstreamTransportErrorKind::Connect,
                    format!("no script for {path}"),
                ));
            };
            Ok(match next {
                Scripted::Json { status, body } => UpstreamHttpResponse {
                    status,
                    headers: vec![("content-type".to_string(), "application/json".to_string())],
                    body: UpstreamBody::Bytes(Bytes::from(body.to_string())),
                },
                Scripted::Events(chunks) => event_body(&chunks, 1).1,
                Scripted::HeldEvents(chunks) => {
                    let (tx, resp) = event_body(&chunks, 1);
                    self.held.lock().unwrap().push(tx);
                    resp
                }
                Scripted::BrokenEvents(chunks) => {
                    let (tx, resp) = event_body(&chunks, 1);
                    let _ = tx.try_send(Err(relaygate_provider_core::ProviderError::transport(
                        UpstreamTransportErrorKind::ReadTimeout,
                        "no upstream data for 30s",
                    )));
                    resp
                }
            })
        })
    }
}

#[derive(Default)]
pub struct CollectingSink {
    pub records: Mutex<Vec<UsageRecord>>,
}

impl UsageSink for CollectingSink {
    fn record<'a>(
        &'a self,
        record: &'a UsageRecord,
    ) -> Pin<Box<dyn Future<Output = ProviderResult<()>> + Send + 'a>> {
        Box::pin(async move {
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        })
    }
}

pub fn settings() -> Map<String, JsonValue> {
    let JsonValue::Object(map) = json!({
        "client_id": "client-1",
        "public_key_id": "key-1",
        "private_key": TEST_RSA_PEM,
        "default_bot_id": "bot-1"
    }) else {
        unreachable!()
    };
    map
}

pub fn token_ok(token: &str, expires_in: i64) -> Scripted {
    Scripted::ok(json!({
        "access_token": token,
        "token_type": "Bearer",
        "expires_in": expires_in
    }))
}

pub fn invocation(model: &str, stream: bool, prompt: &str) -> RelayInvocation {
    RelayInvocation::new(
        CreateChatCompletionRequest {
            model: model.to_string(),
            messages: vec![ChatCompletionRequestMessage::user(prompt)],
            stream: Some(stream),
            user: None,
        },
        BASE_URL,
    )
    .with_settings(settings())
}

pub fn bearer(headers: &Headers) -> Option<&str> {
    relaygate_provider_core::header_get(headers, "authorization")
}

pub async fn collect(mut rx: relaygate_provider_core::ByteStream) -> String {
    let mut out = String::new();
    while let Some(chunk) = rx.recv().await {
        out.push_str(&String::from_utf8_lossy(&chunk));
    }
    out
}
