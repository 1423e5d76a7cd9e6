mod common;

use std::sync::Arc;
use std::time::Duration;

use relaygate_protocol::coze::oauth::TOKEN_ENDPOINT;
use relaygate_protocol::openai::create_chat_completions::response::CreateChatCompletionResponse;
use relaygate_protocol::openai::create_chat_completions::stream::CreateChatCompletionStreamResponse;
use relaygate_provider_core::{CancellationToken, ProviderError, RelayResponse, UpstreamProvider};
use relaygate_provider_impl::CozeProvider;
use relaygate_provider_impl::providers::coze::{
    CHAT_MESSAGE_LIST_PATH, CHAT_PATH, CHAT_RETRIEVE_PATH,
};
use serde_json::json;

use common::{CollectingSink, Scripted, ScriptedClient, bearer, collect, invocation, token_ok};

fn chat(status: &str) -> Scripted {
    Scripted::ok(json!({
        "code": 0,
        "msg": "",
        "data": {"id": "chat-1", "conversation_id": "conv-1", "bot_id": "bot-1", "status": status}
    }))
}

fn upstream() -> Arc<ScriptedClient> {
    let upstream = ScriptedClient::new();
    upstream.script(TOKEN_ENDPOINT, token_ok("tok-1", 900));
    upstream
}

fn chunks(text: &str) -> Vec<CreateChatCompletionStreamResponse> {
    text.split("\n\n")
        .filter_map(|frame| frame.strip_prefix("data: "))
        .filter(|data| *data != "[DONE]")
        .map(|data| serde_json::from_str(data).unwrap())
        .collect()
}

#[tokio::test(start_paused = true)]
async fn polls_then_fetches_the_answer() {
    let upstream = upstream();
    upstream
        .script(CHAT_PATH, chat("in_progress"))
        .script(CHAT_RETRIEVE_PATH, chat("in_progress"))
        .script(
            CHAT_RETRIEVE_PATH,
            Scripted::ok(json!({
                "code": 0,
                "data": {
                    "id": "chat-1",
                    "conversation_id": "conv-1",
                    "status": "completed",
                    "usage": {"token_count": 30, "output_count": 10, "input_count": 20}
                }
            })),
        )
        .script(
            CHAT_MESSAGE_LIST_PATH,
            Scripted::ok(json!({
                "code": 0,
                "data": [
                    {"type": "function_call", "content": "{}"},
                    {"type": "answer", "content": "Hi there"},
                    {"type": "follow_up", "content": "Anything else?"}
                ]
            })),
        );
    let provider = CozeProvider::new(upstream.clone());
    let sink = Arc::new(CollectingSink::default());
    let inv = invocation("bot-model", false, "hello").with_usage_sink(sink.clone());

    let RelayResponse::Json { status, body, .. } = provider.relay(&inv).await.unwrap() else {
        panic!("expected json");
    };
    assert_eq!(status, 200);
    let body: CreateChatCompletionResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(body.choices[0].message.content.as_deref(), Some("Hi there"));
    let usage = body.usage.unwrap();
    assert_eq!((usage.prompt_tokens, usage.completion_tokens, usage.total_tokens), (20, 10, 30));

    assert_eq!(upstream.count(CHAT_RETRIEVE_PATH), 2);
    let list = &upstream.requests(CHAT_MESSAGE_LIST_PATH)[0];
    assert!(list.url.ends_with("?conversation_id=conv-1&chat_id=chat-1"));
    for path in [CHAT_PATH, CHAT_RETRIEVE_PATH, CHAT_MESSAGE_LIST_PATH] {
        for req in upstream.requests(path) {
            assert_eq!(bearer(&req.headers), Some("Bearer tok-1"));
        }
    }
    assert_eq!(upstream.count(TOKEN_ENDPOINT), 1);

    let create: serde_json::Value =
        serde_json::from_slice(upstream.requests(CHAT_PATH)[0].body.as_deref().unwrap()).unwrap();
    assert_eq!(create["bot_id"], "bot-1");
    assert_eq!(create["user_id"], inv.trace_id.as_str());
    assert_eq!(create["stream"], false);
    assert_eq!(create["additional_messages"][0]["content"], "hello");

    assert_eq!(sink.records.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn requires_action_is_an_execution_error() {
    let upstream = upstream();
    upstream
        .script(CHAT_PATH, chat("created"))
        .script(CHAT_RETRIEVE_PATH, chat("requires_action"));
    let provider = CozeProvider::new(upstream.clone());

    let err = provider
        .relay(&invocation("bot-model", false, "hello"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ProviderError::UpstreamExecution { ref status, .. } if status == "requires_action"
    ));
    assert_eq!(upstream.count(CHAT_MESSAGE_LIST_PATH), 0);
}

#[tokio::test(start_paused = true)]
async fn poll_transport_error_aborts_immediately() {
    let upstream = upstream();
    upstream.script(CHAT_PATH, chat("in_progress"));
    let provider = CozeProvider::new(upstream.clone());

    let err = provider
        .relay(&invocation("bot-model", false, "hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Transport { .. }));
    assert_eq!(upstream.count(CHAT_RETRIEVE_PATH), 1);
}

#[tokio::test(start_paused = true)]
async fn missing_settings_fail_before_any_network_call() {
    let upstream = upstream();
    let provider = CozeProvider::new(upstream.clone());
    let mut inv = invocation("bot-model", false, "hello");
    inv.settings.remove("private_key");

    let err = provider.relay(&inv).await.unwrap_err();
    assert_eq!(err, ProviderError::Config("missing private_key".to_string()));
    assert_eq!(err.status_code(), 400);
    assert_eq!(upstream.count(TOKEN_ENDPOINT), 0);
}

#[tokio::test]
async fn stream_is_reframed_and_usage_recorded() {
    let upstream = upstream();
    upstream.script(
        CHAT_PATH,
        Scripted::Events(vec![
            "event: conversation.chat.created\ndata: {\"id\":\"chat-1\",\"status\":\"created\"}\n\n",
            "event: conversation.message.delta\nda",
            "ta: {\"type\":\"answer\",\"content\":\"Hel\"}\n",
            "\nevent: conversation.message.delta\ndata: {broken\n\n",
            "event: conversation.message.delta\ndata: {\"type\":\"answer\",\"content\":\"lo\"}\n\n",
            "event: conversation.chat.completed\ndata: {\"id\":\"chat-1\",\"status\":\"completed\",",
            "\"usage\":{\"token_count\":8,\"output_count\":3,\"input_count\":5}}\n\n",
            "event: done\ndata: \"[DONE]\"\n\n",
        ]),
    );
    let provider = CozeProvider::new(upstream.clone());
    let sink = Arc::new(CollectingSink::default());
    let inv = invocation("bot-model", true, "hello").with_usage_sink(sink.clone());

    let RelayResponse::Stream { body, .. } = provider.relay(&inv).await.unwrap() else {
        panic!("expected stream");
    };
    let text = collect(body).await;
    assert!(text.ends_with("data: [DONE]\n\n"));

    let chunks = chunks(&text);
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[0].content(), Some("Hel"));
    assert_eq!(chunks[1].content(), Some("lo"));
    assert!(chunks[2].is_stop());
    assert!(chunks.iter().all(|chunk| chunk.id == inv.trace_id && chunk.model == "bot-model"));

    let records = sink.records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].usage.total_tokens, 8);
    assert!(upstream.requests(CHAT_PATH)[0].is_stream);
}

#[tokio::test]
async fn stream_without_completion_event_backfills_usage() {
    let upstream = upstream();
    upstream.script(
        CHAT_PATH,
        Scripted::Events(vec![
            "event: conversation.message.delta\ndata: {\"content\":\"partial answer\"}\n\n",
        ]),
    );
    let provider = CozeProvider::new(upstream.clone());
    let sink = Arc::new(CollectingSink::default());
    let inv = invocation("bot-model", true, "hello")
        .with_prompt_tokens(7)
        .with_usage_sink(sink.clone());

    let RelayResponse::Stream { body, .. } = provider.relay(&inv).await.unwrap() else {
        panic!("expected stream");
    };
    let text = collect(body).await;
    assert_eq!(chunks(&text).len(), 1);

    let records = sink.records.lock().unwrap();
    let usage = records[0].usage;
    assert_eq!(usage.prompt_tokens, 7);
    assert!(usage.completion_tokens > 0);
    assert_eq!(usage.total_tokens, usage.prompt_tokens + usage.completion_tokens);
}

#[tokio::test]
async fn json_envelope_on_stream_request_is_an_upstream_error() {
    let upstream = upstream();
    upstream.script(
        CHAT_PATH,
        Scripted::ok(json!({"code": 4015, "msg": "bot not published"})),
    );
    let provider = CozeProvider::new(upstream.clone());

    let err = provider
        .relay(&invocation("bot-model", true, "hello"))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ProviderError::Upstream {
            code: 4015,
            message: "bot not published".to_string()
        }
    );
}

#[tokio::test]
async fn dropped_client_closes_the_upstream_body() {
    let upstream = upstream();
    upstream.script(
        CHAT_PATH,
        Scripted::HeldEvents(vec![
            "event: conversation.message.delta\ndata: {\"content\":\"a\"}\n\n",
            "event: conversation.message.delta\ndata: {\"content\":\"b\"}\n\n",
        ]),
    );
    let provider = CozeProvider::new(upstream.clone());
    let sink = Arc::new(CollectingSink::default());
    let inv = invocation("bot-model", true, "hello").with_usage_sink(sink.clone());

    let RelayResponse::Stream { body, .. } = provider.relay(&inv).await.unwrap() else {
        panic!("expected stream");
    };
    let held = upstream.held_streams();
    assert_eq!(held.len(), 1);
    assert!(!held[0].is_closed());

    drop(body);
    tokio::time::timeout(Duration::from_secs(1), held[0].closed())
        .await
        .expect("upstream body left open");
    assert!(held[0].is_closed());
    assert!(sink.records.lock().unwrap().is_empty());
}

#[tokio::test]
async fn broken_upstream_stream_ends_without_terminator() {
    let upstream = upstream();
    upstream.script(
        CHAT_PATH,
        Scripted::BrokenEvents(vec![
            "event: conversation.message.delta\ndata: {\"content\":\"par\"}\n\n",
            "event: conversation.message.delta\ndata: {\"con",
        ]),
    );
    let provider = CozeProvider::new(upstream.clone());
    let sink = Arc::new(CollectingSink::default());
    let inv = invocation("bot-model", true, "hello").with_usage_sink(sink.clone());

    let RelayResponse::Stream { body, .. } = provider.relay(&inv).await.unwrap() else {
        panic!("expected stream");
    };
    let text = collect(body).await;
    assert!(!text.contains("[DONE]"));
    let chunks = chunks(&text);
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].content(), Some("par"));
    assert!(chunks.iter().all(|chunk| !chunk.is_stop()));
    assert!(sink.records.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn zero_code_envelope_on_error_status_is_still_a_result() {
    let upstream = upstream();
    upstream.script(CHAT_PATH, chat("completed")).script(
        CHAT_MESSAGE_LIST_PATH,
        Scripted::Json {
            status: 500,
            body: json!({"code": 0, "data": [{"type": "answer", "content": "hi"}]}),
        },
    );
    let provider = CozeProvider::new(upstream.clone());

    let RelayResponse::Json { status, body, .. } = provider
        .relay(&invocation("bot-model", false, "hello"))
        .await
        .unwrap()
    else {
        panic!("expected json");
    };
    assert_eq!(status, 500);
    let body: CreateChatCompletionResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(body.choices[0].message.content.as_deref(), Some("hi"));
}

#[tokio::test(start_paused = true)]
async fn undecodable_error_status_reports_the_http_status() {
    let upstream = upstream();
    upstream.script(
        CHAT_PATH,
        Scripted::Json {
            status: 502,
            body: json!("bad gateway"),
        },
    );
    let provider = CozeProvider::new(upstream.clone());

    let err = provider
        .relay(&invocation("bot-model", false, "hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Upstream { code: 502, .. }));
}

#[tokio::test(start_paused = true)]
async fn channel_proxy_reaches_every_call() {
    const PROXY: &str = "http://proxy.internal:3128";
    let upstream = upstream();
    upstream
        .script(CHAT_PATH, chat("in_progress"))
        .script(CHAT_RETRIEVE_PATH, chat("in_progress"))
        .script(CHAT_RETRIEVE_PATH, chat("completed"))
        .script(
            CHAT_MESSAGE_LIST_PATH,
            Scripted::ok(json!({"code": 0, "data": [{"type": "answer", "content": "ok"}]})),
        );
    let provider = CozeProvider::new(upstream.clone());
    let mut inv = invocation("bot-model", false, "hello");
    inv.settings.insert("proxy_url".to_string(), json!(PROXY));

    provider.relay(&inv).await.unwrap();

    for path in [TOKEN_ENDPOINT, CHAT_PATH, CHAT_RETRIEVE_PATH, CHAT_MESSAGE_LIST_PATH] {
        assert!(upstream.count(path) > 0, "{path} never called");
    }
    let requests = upstream.all_requests();
    assert_eq!(requests.len(), 5);
    for req in requests {
        assert_eq!(req.proxy.as_deref(), Some(PROXY), "{}", req.path());
    }
}

#[tokio::test(start_paused = true)]
async fn cancel_stops_chat_polling() {
    let upstream = upstream();
    upstream
        .script(CHAT_PATH, chat("in_progress"))
        .script(CHAT_RETRIEVE_PATH, chat("in_progress"));
    let provider = CozeProvider::new(upstream.clone());
    let cancel = CancellationToken::new();
    let inv = invocation("bot-model", false, "hello").with_cancel(cancel.clone());

    let canceller = async {
        tokio::time::sleep(Duration::from_millis(3500)).await;
        cancel.cancel();
    };
    let (result, ()) = tokio::join!(provider.relay(&inv), canceller);

    assert_eq!(result.unwrap_err(), ProviderError::Canceled);
    assert_eq!(upstream.count(CHAT_RETRIEVE_PATH), 3);
    assert_eq!(upstream.count(CHAT_MESSAGE_LIST_PATH), 0);
}
