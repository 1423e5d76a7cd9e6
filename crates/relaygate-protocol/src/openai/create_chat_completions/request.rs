use serde::{Deserialize, Serialize};

use crate::openai::create_chat_completions::types::{
    ChatCompletionRequestMessage, ChatCompletionRole,
};

/// Canonical inbound request.
///
/// Only the fields the relay acts on are typed; everything else the caller
/// sends is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateChatCompletionRequest {
    pub model: String,
    #[serde(default)]
    pub messages: Vec<ChatCompletionRequestMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl CreateChatCompletionRequest {
    pub fn is_stream(&self) -> bool {
        self.stream.unwrap_or(false)
    }

    pub fn user_messages(&self) -> impl DoubleEndedIterator<Item = &ChatCompletionRequestMessage> {
        self.messages
            .iter()
            .filter(|message| message.role == ChatCompletionRole::User)
    }

    /// Text of every message, in order, joined by newlines.
    pub fn prompt_text(&self) -> String {
        self.messages
            .iter()
            .map(ChatCompletionRequestMessage::text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}
