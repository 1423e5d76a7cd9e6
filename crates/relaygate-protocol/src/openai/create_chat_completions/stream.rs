use serde::{Deserialize, Serialize};

use crate::openai::create_chat_completions::types::{
    ChatCompletionFinishReason, ChatCompletionStreamResponseDelta, CompletionUsage,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChatCompletionChunkObjectType {
    #[serde(rename = "chat.completion.chunk")]
    ChatCompletionChunk,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionStreamChoice {
    pub index: i64,
    pub delta: ChatCompletionStreamResponseDelta,
    pub finish_reason: Option<ChatCompletionFinishReason>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateChatCompletionStreamResponse {
    pub id: String,
    pub object: ChatCompletionChunkObjectType,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatCompletionStreamChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<CompletionUsage>,
}

impl CreateChatCompletionStreamResponse {
    pub fn delta(
        id: impl Into<String>,
        model: impl Into<String>,
        created: i64,
        content: impl Into<String>,
    ) -> Self {
        Self::single(
            id,
            model,
            created,
            ChatCompletionStreamResponseDelta {
                role: None,
                content: Some(content.into()),
            },
            None,
        )
    }

    pub fn stop(id: impl Into<String>, model: impl Into<String>, created: i64) -> Self {
        Self::single(
            id,
            model,
            created,
            ChatCompletionStreamResponseDelta::default(),
            Some(ChatCompletionFinishReason::Stop),
        )
    }

    fn single(
        id: impl Into<String>,
        model: impl Into<String>,
        created: i64,
        delta: ChatCompletionStreamResponseDelta,
        finish_reason: Option<ChatCompletionFinishReason>,
    ) -> Self {
        Self {
            id: id.into(),
            object: ChatCompletionChunkObjectType::ChatCompletionChunk,
            created,
            model: model.into(),
            choices: vec![ChatCompletionStreamChoice {
                index: 0,
                delta,
                finish_reason,
            }],
            usage: None,
        }
    }

    pub fn is_stop(&self) -> bool {
        self.choices
            .iter()
            .any(|choice| choice.finish_reason == Some(ChatCompletionFinishReason::Stop))
    }

    pub fn content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.delta.content.as_deref())
    }
}
