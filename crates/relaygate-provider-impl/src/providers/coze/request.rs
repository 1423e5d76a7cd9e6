use bytes::Bytes;
use serde_json::{Map, Value as JsonValue};

use relaygate_protocol::coze::chat::{ChatRequest, EnterMessage};
use relaygate_protocol::coze::workflow::WorkflowRunRequest;
use relaygate_provider_core::{
    Completion, ProviderError, ProviderResult, RelayInvocation, UpstreamPayload,
};

use super::config::CozeJwtConfig;

pub const WORKFLOW_PREFIX: &str = "workflow:";
pub const WORKFLOW_ASYNC_PREFIX: &str = "workflow-async:";

pub const CHAT_PATH: &str = "/v3/chat";
pub const CHAT_RETRIEVE_PATH: &str = "/v3/chat/retrieve";
pub const CHAT_MESSAGE_LIST_PATH: &str = "/v3/chat/message/list";
pub const WORKFLOW_RUN_PATH: &str = "/v1/workflow/run";
pub const WORKFLOW_STATUS_PATH: &str = "/v1/workflow/run/status";

/// Which upstream flow a model identifier selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CozeRoute<'a> {
    Chat,
    Workflow {
        workflow_id: &'a str,
        force_async: bool,
    },
}

pub fn route(model: &str) -> CozeRoute<'_> {
    if let Some(workflow_id) = model.strip_prefix(WORKFLOW_ASYNC_PREFIX) {
        return CozeRoute::Workflow {
            workflow_id,
            force_async: true,
        };
    }
    if let Some(workflow_id) = model.strip_prefix(WORKFLOW_PREFIX) {
        return CozeRoute::Workflow {
            workflow_id,
            force_async: false,
        };
    }
    CozeRoute::Chat
}

#[derive(Debug, Clone, PartialEq)]
pub enum CozeRequest {
    Chat(ChatRequest),
    Workflow(WorkflowRunRequest),
}

impl CozeRequest {
    pub fn into_payload(self) -> ProviderResult<UpstreamPayload> {
        let (path, completion, body) = match &self {
            CozeRequest::Chat(chat) => {
                let completion = if chat.stream {
                    Completion::Streamed
                } else {
                    Completion::Polled
                };
                (CHAT_PATH, completion, serde_json::to_vec(chat))
            }
            CozeRequest::Workflow(run) => {
                let completion = if run.is_async {
                    Completion::Polled
                } else {
                    Completion::Immediate
                };
                (WORKFLOW_RUN_PATH, completion, serde_json::to_vec(run))
            }
        };
        let body = body.map_err(|err| ProviderError::InvalidRequest(err.to_string()))?;
        Ok(UpstreamPayload {
            path,
            body: Bytes::from(body),
            completion,
        })
    }
}

pub fn translate(
    invocation: &RelayInvocation,
    config: &CozeJwtConfig,
) -> ProviderResult<CozeRequest> {
    let request = &invocation.request;
    if request.messages.is_empty() {
        return Err(ProviderError::InvalidRequest(
            "messages must not be empty".to_string(),
        ));
    }

    match route(&invocation.model) {
        CozeRoute::Workflow {
            workflow_id,
            force_async,
        } => {
            if workflow_id.trim().is_empty() {
                return Err(ProviderError::InvalidRequest(
                    "workflow id missing after model prefix".to_string(),
                ));
            }
            let mut parameters = Map::new();
            if let Some(message) = request.user_messages().next_back() {
                parameters.insert("input".to_string(), JsonValue::String(message.text()));
            }
            Ok(CozeRequest::Workflow(WorkflowRunRequest {
                workflow_id: workflow_id.to_string(),
                parameters,
                stream: false,
                is_async: force_async || !invocation.is_stream,
            }))
        }
        CozeRoute::Chat => {
            let bot_id = config
                .default_bot_id
                .clone()
                .or_else(|| invocation.bot_id.clone())
                .filter(|bot_id| !bot_id.trim().is_empty())
                .ok_or_else(|| {
                    ProviderError::Config("no default_bot_id and no bot id on the call".to_string())
                })?;
            let user_id = request
                .user
                .as_deref()
                .map(str::trim)
                .filter(|user| !user.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| invocation.trace_id.clone());
            let additional_messages = request
                .user_messages()
                .map(|message| EnterMessage {
                    role: "user".to_string(),
                    kind: Some("question".to_string()),
                    content: message.text(),
                    content_type: "text".to_string(),
                })
                .collect();
            Ok(CozeRequest::Chat(ChatRequest {
                bot_id,
                user_id,
                additional_messages,
                stream: invocation.is_stream,
                auto_save_history: true,
            }))
        }
    }
}
