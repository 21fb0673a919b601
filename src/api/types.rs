use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// API error taxonomy with retry classification.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Analysis failed: {0}")]
    AnalysisFailed(String),

    #[error("No terminal analysis result within the polling budget")]
    SubmissionTimeout,

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Invalid response payload: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    /// Transport-level failures worth replaying; auth failures are handled
    /// by the refresh-once policy instead.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Network(_) | ApiError::Timeout)
    }

    pub fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout
        } else {
            ApiError::Network(e.to_string())
        }
    }
}

/// Server-side lifecycle of an analysis task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl AnalysisStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AnalysisStatus::Completed | AnalysisStatus::Failed)
    }
}

/// Report-retrieval payload, used by the polling fallback and by deep-link
/// refresh of a finished session.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordingReport {
    pub recording_id: String,
    pub question_id: String,
    pub status: AnalysisStatus,
    pub report: Option<serde_json::Value>,
    pub audio_url: String,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Question catalog payload; `audio_url` points at the prompt asset.
#[derive(Debug, Clone, Deserialize)]
pub struct QuestionInfo {
    pub question_id: String,
    pub instruction: String,
    pub audio_url: Option<String>,
}
