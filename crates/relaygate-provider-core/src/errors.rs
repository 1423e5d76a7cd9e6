use relaygate_protocol::openai::error::ErrorResponse;

use crate::http::UpstreamTransportErrorKind;

pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    #[error("invalid config: {0}")]
    Config(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("credential error: {0}")]
    Credential(String),
    #[error("transport error ({kind:?}): {message}")]
    Transport {
        kind: UpstreamTransportErrorKind,
        message: String,
    },
    #[error("upstream execution {status}: {message}")]
    UpstreamExecution { status: String, message: String },
    #[error("workflow polling timeout after {attempts} attempts")]
    PollingTimeout { attempts: u32 },
    #[error("unknown upstream status: {0}")]
    UnknownState(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("upstream error {code}: {message}")]
    Upstream { code: i64, message: String },
    #[error("request canceled")]
    Canceled,
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
}

impl ProviderError {
    pub fn transport(kind: UpstreamTransportErrorKind, message: impl Into<String>) -> Self {
        ProviderError::Transport {
            kind,
            message: message.into(),
        }
    }

    pub fn decode(err: impl std::fmt::Display) -> Self {
        ProviderError::Decode(err.to_string())
    }

    /// Stable HTTP status reported to the caller.
    pub fn status_code(&self) -> u16 {
        match self {
            ProviderError::Config(_) | ProviderError::InvalidRequest(_) => 400,
            ProviderError::Credential(_) => 401,
            ProviderError::Transport { .. }
            | ProviderError::UpstreamExecution { .. }
            | ProviderError::UnknownState(_)
            | ProviderError::Decode(_)
            | ProviderError::Upstream { .. } => 502,
            ProviderError::PollingTimeout { .. } => 504,
            ProviderError::Canceled => 499,
            ProviderError::Unsupported(_) => 501,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::Config(_) => "config_error",
            ProviderError::InvalidRequest(_) => "invalid_request_error",
            ProviderError::Credential(_) => "credential_error",
            ProviderError::Transport { .. } => "transport_error",
            ProviderError::UpstreamExecution { .. } => "upstream_execution_error",
            ProviderError::PollingTimeout { .. } => "polling_timeout",
            ProviderError::UnknownState(_) => "unknown_state",
            ProviderError::Decode(_) => "decode_error",
            ProviderError::Upstream { .. } => "upstream_error",
            ProviderError::Canceled => "canceled",
            ProviderError::Unsupported(_) => "unsupported",
        }
    }

    fn code(&self) -> Option<String> {
        match self {
            ProviderError::Upstream { code, .. } => Some(code.to_string()),
            ProviderError::UpstreamExecution { status, .. } => Some(status.clone()),
            ProviderError::UnknownState(status) => Some(status.clone()),
            _ => None,
        }
    }

    /// Canonical `{"error": {...}}` envelope.
    pub fn error_body(&self) -> ErrorResponse {
        ErrorResponse::new(self.to_string(), self.kind(), self.code())
    }
}
