pub mod auth;
pub mod types;

pub use auth::{StaticTokenProvider, TokenProvider};
pub use types::{AnalysisStatus, ApiError, QuestionInfo, RecordingReport};

use crate::audio::CapturedRecording;
use reqwest::{multipart, Client, RequestBuilder, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// HTTP client for the analysis backend. Every request carries a bearer
/// credential from the `TokenProvider`; a 401 triggers one silent refresh
/// and one replay before failure is surfaced.
pub struct AnalysisClient {
    http: Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
    request_timeout: Duration,
}

impl AnalysisClient {
    pub fn new(base_url: impl Into<String>, tokens: Arc<dyn TokenProvider>) -> Self {
        // No client-wide timeout: the SSE response body stays open for the
        // whole analysis. Non-streaming calls set a per-request timeout.
        let http = Client::builder()
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Submit a captured recording; the response body is the SSE progress
    /// stream, left to the caller to consume.
    pub async fn submit_recording(
        &self,
        recording: &CapturedRecording,
        question_id: &str,
    ) -> Result<Response, ApiError> {
        let url = self.endpoint("analysis/stream");
        let bytes = recording.bytes.clone();
        let mime = recording.mime_type.clone();
        let question_id = question_id.to_string();

        info!(
            "Submitting recording {} ({} bytes, {:.1}s) for question {}",
            recording.id,
            bytes.len(),
            recording.duration_secs,
            question_id
        );

        let response = self
            .send_authorized(move |http| {
                let part = multipart::Part::bytes(bytes.clone()).file_name("recording.wav");
                let part = match part.mime_str(&mime) {
                    Ok(part) => part,
                    Err(_) => multipart::Part::bytes(bytes.clone()).file_name("recording.wav"),
                };
                let form = multipart::Form::new()
                    .text("question_id", question_id.clone())
                    .part("file", part);
                http.post(&url).multipart(form)
            })
            .await?;

        if !response.status().is_success() {
            return Err(http_error(response).await);
        }
        Ok(response)
    }

    /// Report retrieval keyed by the server recording id. Used by the
    /// polling fallback and by deep-link refresh.
    pub async fn fetch_report(&self, recording_id: &str) -> Result<RecordingReport, ApiError> {
        let url = self.endpoint(&format!("recordings/{}/report", recording_id));
        let timeout = self.request_timeout;
        let response = self
            .send_authorized(move |http| http.get(&url).timeout(timeout))
            .await?;

        if !response.status().is_success() {
            return Err(http_error(response).await);
        }
        response
            .json::<RecordingReport>()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    /// Polling fallback: repeatedly fetch the report until it reaches a
    /// terminal status or the attempt budget runs out.
    pub async fn wait_for_report(
        &self,
        recording_id: &str,
        max_attempts: u32,
        interval: Duration,
    ) -> Result<RecordingReport, ApiError> {
        for attempt in 1..=max_attempts {
            match self.fetch_report(recording_id).await {
                Ok(report) if report.status.is_terminal() => {
                    return match report.status {
                        AnalysisStatus::Failed => Err(ApiError::AnalysisFailed(
                            report
                                .error_message
                                .unwrap_or_else(|| "analysis failed".to_string()),
                        )),
                        _ => Ok(report),
                    };
                }
                Ok(report) => {
                    info!(
                        "Analysis {:?} (attempt {}/{})",
                        report.status, attempt, max_attempts
                    );
                }
                Err(e) if e.is_retryable() => {
                    warn!(
                        "Report poll failed (attempt {}/{}): {}",
                        attempt, max_attempts, e
                    );
                }
                Err(e) => return Err(e),
            }

            if attempt < max_attempts {
                sleep(interval).await;
            }
        }

        Err(ApiError::SubmissionTimeout)
    }

    pub async fn fetch_question(&self, question_id: &str) -> Result<QuestionInfo, ApiError> {
        let url = self.endpoint(&format!("questions/{}", question_id));
        let timeout = self.request_timeout;
        let response = self
            .send_authorized(move |http| http.get(&url).timeout(timeout))
            .await?;

        if !response.status().is_success() {
            return Err(http_error(response).await);
        }
        response
            .json::<QuestionInfo>()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    async fn send_authorized<F>(&self, build: F) -> Result<Response, ApiError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let token = self.tokens.bearer_token().await?;
        let response = build(&self.http)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(ApiError::from_reqwest)?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        warn!("Request rejected with 401; refreshing credentials and replaying once");
        let fresh = self.tokens.refresh_token().await?;
        let replay = build(&self.http)
            .bearer_auth(&fresh)
            .send()
            .await
            .map_err(ApiError::from_reqwest)?;

        if replay.status() == StatusCode::UNAUTHORIZED {
            return Err(ApiError::AuthenticationFailed);
        }
        Ok(replay)
    }
}

async fn http_error(response: Response) -> ApiError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    ApiError::Http { status, body }
}
