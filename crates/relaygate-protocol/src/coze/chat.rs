use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::coze::types::{CozeError, CozeUsage, status_enum};

pub const EVENT_CHAT_COMPLETED: &str = "conversation.chat.completed";
pub const EVENT_MESSAGE_DELTA: &str = "conversation.message.delta";
pub const EVENT_ERROR: &str = "error";

pub const MESSAGE_TYPE_ANSWER: &str = "answer";

status_enum! {
    /// Lifecycle of one conversational exchange.
    ChatStatus {
        Created => "created",
        InProgress => "in_progress",
        Completed => "completed",
        Failed => "failed",
        Canceled => "canceled",
        RequiresAction => "requires_action",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnterMessage {
    pub role: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub content: String,
    pub content_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub bot_id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_messages: Vec<EnterMessage>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub auto_save_history: bool,
}

/// Envelope of `POST /v3/chat` and `GET /v3/chat/retrieve`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub data: ChatData,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatData {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub conversation_id: String,
    #[serde(default)]
    pub bot_id: String,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<CozeError>,
    #[serde(default)]
    pub status: ChatStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<CozeUsage>,
}

/// Envelope of `GET /v3/chat/message/list`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageListResponse {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub data: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub role: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub content: JsonValue,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub chat_id: String,
    #[serde(default)]
    pub conversation_id: String,
}
