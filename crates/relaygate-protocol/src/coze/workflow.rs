use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::coze::types::{CozeError, CozeUsage, status_enum};

status_enum! {
    /// Lifecycle of one workflow execution.
    WorkflowStatus {
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Canceled => "canceled",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRunRequest {
    pub workflow_id: String,
    #[serde(default)]
    pub parameters: serde_json::Map<String, JsonValue>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub is_async: bool,
}

/// Envelope of `POST /v1/workflow/run` and `GET /v1/workflow/run/status`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResponse {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub data: WorkflowData,
    /// Synchronous runs may report usage next to `data` instead of inside it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<CozeUsage>,
}

impl WorkflowResponse {
    pub fn usage(&self) -> Option<CozeUsage> {
        self.data.usage.or(self.usage)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkflowData {
    pub execute_id: String,
    pub status: WorkflowStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CozeError>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<CozeUsage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<WorkflowOutput>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowOutput {
    #[serde(default)]
    pub node_id: String,
    #[serde(default)]
    pub node_type: String,
    #[serde(default)]
    pub output: JsonValue,
}

#[derive(Deserialize)]
struct WorkflowDataFields {
    #[serde(default)]
    execute_id: String,
    #[serde(default)]
    status: WorkflowStatus,
    #[serde(default)]
    result: Option<JsonValue>,
    #[serde(default)]
    error: Option<CozeError>,
    #[serde(default)]
    created_at: i64,
    #[serde(default)]
    updated_at: i64,
    #[serde(default)]
    usage: Option<CozeUsage>,
    #[serde(default)]
    outputs: Vec<WorkflowOutput>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WorkflowDataRepr {
    Fields(WorkflowDataFields),
    Text(String),
    Null(()),
}

// Synchronous runs answer with `data` as a bare string holding the output.
impl<'de> Deserialize<'de> for WorkflowData {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(match WorkflowDataRepr::deserialize(deserializer)? {
            WorkflowDataRepr::Fields(fields) => WorkflowData {
                execute_id: fields.execute_id,
                status: fields.status,
                result: fields.result.filter(|value| !value.is_null()),
                error: fields.error,
                created_at: fields.created_at,
                updated_at: fields.updated_at,
                usage: fields.usage,
                outputs: fields.outputs,
            },
            WorkflowDataRepr::Text(text) => WorkflowData {
                status: WorkflowStatus::Completed,
                result: Some(JsonValue::String(text)),
                ..WorkflowData::default()
            },
            WorkflowDataRepr::Null(()) => WorkflowData::default(),
        })
    }
}
