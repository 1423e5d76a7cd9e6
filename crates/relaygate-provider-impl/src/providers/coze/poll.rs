use std::time::Duration;

use tokio_util::sync::CancellationToken;

use relaygate_protocol::coze::chat::{ChatResponse, ChatStatus};
use relaygate_protocol::coze::workflow::{WorkflowResponse, WorkflowStatus};
use relaygate_provider_core::{ProviderError, ProviderResult, RelayInvocation, UsageCounters};

use super::config::CozeJwtConfig;
use super::request::{CHAT_RETRIEVE_PATH, WORKFLOW_STATUS_PATH};
use super::{CozeProvider, decode_envelope, usage_from_coze};

/// Intervals and ceilings for the two completion-detection loops.
///
/// Conversational polling has no attempt cap; it runs until a terminal
/// status or until the invocation's cancellation token fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingPolicy {
    pub chat_interval: Duration,
    pub workflow_interval: Duration,
    pub workflow_max_attempts: u32,
}

impl Default for PollingPolicy {
    fn default() -> Self {
        Self {
            chat_interval: Duration::from_secs(1),
            workflow_interval: Duration::from_secs(2),
            workflow_max_attempts: 150,
        }
    }
}

/// Cooperative wait between polls. No lock is held here.
async fn pause(cancel: &CancellationToken, interval: Duration) -> ProviderResult<()> {
    if cancel.is_cancelled() {
        return Err(ProviderError::Canceled);
    }
    tokio::select! {
        _ = cancel.cancelled() => Err(ProviderError::Canceled),
        _ = tokio::time::sleep(interval) => Ok(()),
    }
}

impl CozeProvider {
    /// Poll `/v3/chat/retrieve` until the exchange leaves its running states.
    /// Returns the usage reported on completion.
    pub(crate) async fn wait_for_chat(
        &self,
        invocation: &RelayInvocation,
        config: &CozeJwtConfig,
        conversation_id: &str,
        chat_id: &str,
    ) -> ProviderResult<Option<UsageCounters>> {
        let url = format!(
            "{}{}?conversation_id={}&chat_id={}",
            invocation.base_url(),
            CHAT_RETRIEVE_PATH,
            urlencoding::encode(conversation_id),
            urlencoding::encode(chat_id)
        );
        let mut attempt: u64 = 0;
        loop {
            pause(&invocation.cancel, self.polling.chat_interval).await?;
            attempt += 1;
            let (status, body) = self.get(invocation, config, &url).await?;
            let resp: ChatResponse = decode_envelope(status, &body)?;
            let data = resp.data;
            tracing::debug!(
                trace_id = %invocation.trace_id,
                chat_id,
                attempt,
                status = %data.status,
                "chat poll"
            );
            match data.status {
                ChatStatus::Created | ChatStatus::InProgress => continue,
                ChatStatus::Completed => return Ok(data.usage.map(usage_from_coze)),
                ChatStatus::Failed | ChatStatus::Canceled | ChatStatus::RequiresAction => {
                    let message = data
                        .last_error
                        .map(|err| err.message)
                        .filter(|message| !message.is_empty())
                        .unwrap_or_else(|| format!("chat {}", data.status));
                    return Err(ProviderError::UpstreamExecution {
                        status: data.status.to_string(),
                        message,
                    });
                }
                ChatStatus::Unknown(status) => return Err(ProviderError::UnknownState(status)),
            }
        }
    }

    /// Poll `/v1/workflow/run/status` at most `workflow_max_attempts` times.
    pub(crate) async fn wait_for_workflow(
        &self,
        invocation: &RelayInvocation,
        config: &CozeJwtConfig,
        execute_id: &str,
    ) -> ProviderResult<WorkflowResponse> {
        let url = format!(
            "{}{}?execute_id={}",
            invocation.base_url(),
            WORKFLOW_STATUS_PATH,
            urlencoding::encode(execute_id)
        );
        let max_attempts = self.polling.workflow_max_attempts;
        for attempt in 1..=max_attempts {
            pause(&invocation.cancel, self.polling.workflow_interval).await?;
            let (status, body) = self.get(invocation, config, &url).await?;
            let resp: WorkflowResponse = decode_envelope(status, &body)?;
            tracing::debug!(
                trace_id = %invocation.trace_id,
                execute_id,
                attempt,
                status = %resp.data.status,
                "workflow poll"
            );
            match &resp.data.status {
                WorkflowStatus::Running => continue,
                WorkflowStatus::Completed => return Ok(resp),
                WorkflowStatus::Failed | WorkflowStatus::Canceled => {
                    let message = resp
                        .data
                        .error
                        .as_ref()
                        .map(|err| err.message.clone())
                        .filter(|message| !message.is_empty())
                        .unwrap_or_else(|| format!("workflow {}", resp.data.status));
                    return Err(ProviderError::UpstreamExecution {
                        status: resp.data.status.to_string(),
                        message,
                    });
                }
                WorkflowStatus::Unknown(status) => {
                    return Err(ProviderError::UnknownState(status.clone()));
                }
            }
        }
        tracing::warn!(
            trace_id = %invocation.trace_id,
            execute_id,
            attempts = max_attempts,
            "workflow polling gave up"
        );
        Err(ProviderError::PollingTimeout {
            attempts: max_attempts,
        })
    }
}
