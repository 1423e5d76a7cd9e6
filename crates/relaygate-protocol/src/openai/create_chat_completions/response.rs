use serde::{Deserialize, Serialize};

use crate::openai::create_chat_completions::types::{
    ChatCompletionFinishReason, ChatCompletionResponseMessage, ChatCompletionRole,
    CompletionUsage,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChatCompletionObjectType {
    #[serde(rename = "chat.completion")]
    ChatCompletion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionChoice {
    pub index: i64,
    pub message: ChatCompletionResponseMessage,
    pub finish_reason: ChatCompletionFinishReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateChatCompletionResponse {
    pub id: String,
    pub object: ChatCompletionObjectType,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatCompletionChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<CompletionUsage>,
}

impl CreateChatCompletionResponse {
    /// A single assistant message that finished with `stop`.
    pub fn assistant(
        id: impl Into<String>,
        model: impl Into<String>,
        created: i64,
        content: impl Into<String>,
        usage: CompletionUsage,
    ) -> Self {
        Self {
            id: id.into(),
            object: ChatCompletionObjectType::ChatCompletion,
            created,
            model: model.into(),
            choices: vec![ChatCompletionChoice {
                index: 0,
                message: ChatCompletionResponseMessage {
                    role: ChatCompletionRole::Assistant,
                    content: Some(content.into()),
                },
                finish_reason: ChatCompletionFinishReason::Stop,
            }],
            usage: Some(usage),
        }
    }
}
