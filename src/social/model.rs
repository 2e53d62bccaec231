use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw protocol response; interpretation is left to the upload state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: for<'de> Deserialize<'de>>(&self) -> serde_json::Result<T> {
        serde_json::from_str(&self.body)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingState {
    Pending,
    InProgress,
    Succeeded,
    Failed,
}

impl ProcessingState {
    pub fn is_waiting(&self) -> bool {
        matches!(self, ProcessingState::Pending | ProcessingState::InProgress)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ProcessingInfo {
    pub state: ProcessingState,
    #[serde(default)]
    pub check_after_secs: Option<u64>,
    #[serde(default)]
    pub progress_percent: Option<u32>,
    #[serde(default)]
    pub error: Option<Value>,
}

/// INIT / FINALIZE / STATUS response body.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct MediaResponse {
    #[serde(default)]
    pub media_id_string: Option<String>,
    #[serde(default)]
    pub processing_info: Option<ProcessingInfo>,
}

/// In-flight upload as last reported by the remote side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadCheckpoint {
    pub media_handle: String,
    pub processing_state: ProcessingState,
    pub check_after_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CreatePostResponse {
    pub data: CreatedPost,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CreatedPost {
    pub id: String,
}
