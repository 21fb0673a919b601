use crate::api::{AnalysisClient, ApiError};
use crate::audio::{
    AudioRecorder, CaptureEngine, CaptureError, CapturedRecording, PromptPlayer,
    QuestionAudioPlayer,
};
use crate::config::AppConfig;
use crate::sse::{SseEvent, SseParser, StepStatus};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod countdown;
pub mod phase;
pub mod progress;
pub mod sync;

pub use countdown::{Countdown, TickOutcome};
pub use phase::{transition, PhaseTrigger, SessionPhase};
pub use progress::{AnalysisProgress, StepState};
pub use sync::{CursorMode, RecordingPlaybackSync, SegmentSpan, SyncAction};

/// Session-level error taxonomy, localized for the banner.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("Microphone permission denied")]
    PermissionDenied,

    #[error("No microphone found")]
    DeviceNotFound,

    #[error("Audio decode failed: {0}")]
    DecodeFailure(String),

    #[error("Network failure: {0}")]
    NetworkFailure(String),

    #[error("Analysis failed: {0}")]
    AnalysisFailed(String),

    #[error("Analysis did not finish in time")]
    SubmissionTimeout,

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Not available in phase {0:?}")]
    InvalidPhase(SessionPhase),

    #[error("{0}")]
    Other(String),
}

impl From<CaptureError> for SessionError {
    fn from(e: CaptureError) -> Self {
        match e {
            CaptureError::PermissionDenied(_) => SessionError::PermissionDenied,
            CaptureError::DeviceNotFound => SessionError::DeviceNotFound,
            other => SessionError::Other(other.to_string()),
        }
    }
}

impl From<ApiError> for SessionError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::Network(msg) => SessionError::NetworkFailure(msg),
            ApiError::Timeout => SessionError::NetworkFailure("request timed out".to_string()),
            ApiError::AuthenticationFailed => SessionError::AuthenticationFailed,
            ApiError::AnalysisFailed(msg) => SessionError::AnalysisFailed(msg),
            ApiError::SubmissionTimeout => SessionError::SubmissionTimeout,
            other => SessionError::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BannerKind {
    PermissionDenied,
    DeviceNotFound,
    AnalysisFailed,
    Network,
    Other,
}

/// The single dismissible error banner. Starting a new action replaces it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBanner {
    pub kind: BannerKind,
    pub message: String,
}

impl ErrorBanner {
    fn from_error(e: &SessionError) -> Self {
        let kind = match e {
            SessionError::PermissionDenied => BannerKind::PermissionDenied,
            SessionError::DeviceNotFound => BannerKind::DeviceNotFound,
            SessionError::AnalysisFailed(_) | SessionError::SubmissionTimeout => {
                BannerKind::AnalysisFailed
            }
            SessionError::NetworkFailure(_) | SessionError::AuthenticationFailed => {
                BannerKind::Network
            }
            _ => BannerKind::Other,
        };
        Self {
            kind,
            message: e.to_string(),
        }
    }
}

/// UI-facing view of the session, sampled by the presentation layer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub countdown: Countdown,
    pub progress: AnalysisProgress,
    pub has_recording: bool,
    pub recording_duration_secs: Option<f32>,
    pub recording_id: Option<String>,
    pub report_audio_url: Option<String>,
    pub banner: Option<ErrorBanner>,
}

/// The practice-session controller: a pure transition table plus this thin
/// imperative shell for device, playback, and network effects. Generic over
/// the capture and player seams so the machine runs under test without any
/// audio hardware.
pub struct PracticeSession<C: CaptureEngine, P: PromptPlayer> {
    config: AppConfig,
    recorder: C,
    player: P,
    phase: SessionPhase,
    countdown: Countdown,
    progress: AnalysisProgress,
    question_id: Option<String>,
    question_audio_url: Option<String>,
    recording: Option<CapturedRecording>,
    report: Option<serde_json::Value>,
    server_recording_id: Option<String>,
    report_audio_url: Option<String>,
    banner: Option<ErrorBanner>,
}

pub type DefaultPracticeSession = PracticeSession<AudioRecorder, QuestionAudioPlayer>;

impl<C: CaptureEngine, P: PromptPlayer> PracticeSession<C, P> {
    pub fn new(config: AppConfig, recorder: C, player: P) -> Self {
        Self {
            config,
            recorder,
            player,
            phase: SessionPhase::Idle,
            countdown: Countdown::new(),
            progress: AnalysisProgress::new(),
            question_id: None,
            question_audio_url: None,
            recording: None,
            report: None,
            server_recording_id: None,
            report_audio_url: None,
            banner: None,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn countdown(&self) -> &Countdown {
        &self.countdown
    }

    pub fn progress(&self) -> &AnalysisProgress {
        &self.progress
    }

    pub fn recording(&self) -> Option<&CapturedRecording> {
        self.recording.as_ref()
    }

    pub fn report(&self) -> Option<&serde_json::Value> {
        self.report.as_ref()
    }

    pub fn server_recording_id(&self) -> Option<&str> {
        self.server_recording_id.as_deref()
    }

    pub fn banner(&self) -> Option<&ErrorBanner> {
        self.banner.as_ref()
    }

    pub fn dismiss_banner(&mut self) {
        self.banner = None;
    }

    pub fn capture(&self) -> &C {
        &self.recorder
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            countdown: self.countdown.clone(),
            progress: self.progress.clone(),
            has_recording: self.recording.is_some(),
            recording_duration_secs: self.recording.as_ref().map(|r| r.duration_secs),
            recording_id: self.server_recording_id.clone(),
            report_audio_url: self.report_audio_url.clone(),
            banner: self.banner.clone(),
        }
    }

    /// Begin a session for one question. Idle → Listening.
    pub fn start(
        &mut self,
        question_id: impl Into<String>,
        question_audio_url: Option<String>,
    ) -> Result<(), SessionError> {
        self.apply(PhaseTrigger::Start)?;
        self.banner = None;
        self.question_id = Some(question_id.into());
        self.question_audio_url = question_audio_url;
        info!(
            "Session started for question {}",
            self.question_id.as_deref().unwrap_or("?")
        );
        Ok(())
    }

    /// Listening phase: play the question prompt (best-effort) and cross
    /// into Preparing. Microphone permission is requested at this boundary;
    /// a refusal aborts back to Listening with a classified banner and no
    /// stream left open.
    pub async fn run_listening(&mut self) -> Result<(), SessionError> {
        if self.phase != SessionPhase::Listening {
            return Err(SessionError::InvalidPhase(self.phase));
        }

        if let Some(url) = self.question_audio_url.clone() {
            // Playback failures are non-fatal to the session.
            match self.player.load_audio(&url).await {
                Ok(()) => {
                    if let Err(e) = self.player.play_question_audio().await {
                        warn!("Question audio playback failed: {}", e);
                    }
                }
                Err(e) => warn!("Question audio fetch failed: {}", e),
            }
        }

        self.apply(PhaseTrigger::QuestionAudioEnded)?;

        if let Err(e) = self.recorder.warmup() {
            let err: SessionError = e.into();
            warn!("Microphone warm-up refused: {}", err);
            self.recorder.release();
            self.banner = Some(ErrorBanner::from_error(&err));
            self.apply(PhaseTrigger::PermissionRefused)?;
            return Err(err);
        }

        self.countdown.start(self.config.prep_secs);
        Ok(())
    }

    /// One-second clock tick. Drives the Preparing and Recording countdowns;
    /// each zero fires its phase exit exactly once.
    pub async fn tick(&mut self) -> Result<(), SessionError> {
        match self.phase {
            SessionPhase::Preparing => match self.countdown.tick() {
                TickOutcome::Ticked { remaining }
                    if remaining == self.config.warmup_lead_secs =>
                {
                    // Opportunistic re-check; a warmed stream makes this a
                    // no-op.
                    if let Err(e) = self.recorder.warmup() {
                        let err: SessionError = e.into();
                        warn!("Microphone warm-up failed mid-preparation: {}", err);
                        self.recorder.release();
                        self.countdown.cancel();
                        self.banner = Some(ErrorBanner::from_error(&err));
                        self.apply(PhaseTrigger::PermissionRefused)?;
                        return Err(err);
                    }
                    Ok(())
                }
                TickOutcome::Finished => self.enter_recording().await,
                _ => Ok(()),
            },
            SessionPhase::Recording => match self.countdown.tick() {
                TickOutcome::Finished => {
                    self.finish_recording_internal(PhaseTrigger::CountdownFinished)
                }
                _ => Ok(()),
            },
            _ => Ok(()),
        }
    }

    /// Pause toggling is only meaningful while recording, and moves the
    /// countdown and the capture engine together so they never diverge.
    pub fn toggle_pause(&mut self) -> bool {
        if self.phase != SessionPhase::Recording {
            return false;
        }

        if self.countdown.paused {
            self.countdown.resume();
            self.recorder.resume_recording();
            debug!("Recording resumed at {}s remaining", self.countdown.remaining);
            false
        } else {
            self.countdown.pause();
            self.recorder.pause_recording();
            debug!("Recording paused at {}s remaining", self.countdown.remaining);
            true
        }
    }

    /// Explicit user "finish" before the countdown runs out.
    pub fn finish_recording(&mut self) -> Result<(), SessionError> {
        if self.phase != SessionPhase::Recording {
            return Err(SessionError::InvalidPhase(self.phase));
        }
        self.countdown.cancel();
        self.finish_recording_internal(PhaseTrigger::FinishRequested)
    }

    /// Discard the take and start over. Confirmation → Recording.
    pub fn discard_recording(&mut self) -> Result<(), SessionError> {
        if self.phase != SessionPhase::Confirmation {
            return Err(SessionError::InvalidPhase(self.phase));
        }

        self.banner = None;
        self.recording = None;
        self.recorder.clear_recording();
        self.recorder.start_recording()?;
        self.apply(PhaseTrigger::DiscardRequested)?;
        self.countdown.start(self.config.record_secs);
        info!("Recording discarded; re-recording");
        Ok(())
    }

    /// Confirmation → Analyzing. Resets progress to all-pending and hands
    /// back the recording for submission.
    pub fn begin_analysis(&mut self) -> Result<CapturedRecording, SessionError> {
        if self.phase != SessionPhase::Confirmation {
            return Err(SessionError::InvalidPhase(self.phase));
        }
        let recording = self
            .recording
            .clone()
            .ok_or_else(|| SessionError::Other("no captured recording to submit".to_string()))?;

        self.banner = None;
        self.progress.reset();
        self.apply(PhaseTrigger::SubmitRequested)?;
        Ok(recording)
    }

    /// Feed one analysis-stream event into the machine. Events arriving
    /// outside Analyzing are ignored (a late chunk after an error exit).
    pub fn apply_analysis_event(&mut self, event: SseEvent) {
        if self.phase != SessionPhase::Analyzing {
            debug!("Ignoring analysis event outside Analyzing phase");
            return;
        }

        match event {
            SseEvent::Step { step, status } => {
                debug!("Analysis step {:?}: {:?}", step, status);
                self.progress.apply(step, status);
            }
            SseEvent::Completed {
                report,
                recording_id,
                audio_url,
            } => {
                // Progress must be terminal before leaving Analyzing.
                for step in crate::sse::AnalysisStep::ALL {
                    self.progress.apply(step, StepStatus::Completed);
                }
                self.report = Some(report);
                self.server_recording_id = recording_id;
                self.report_audio_url = audio_url;
                if self.apply(PhaseTrigger::AnalysisCompleted).is_ok() {
                    info!("Analysis completed; report ready");
                }
            }
            SseEvent::Error { message, step } => {
                warn!("Analysis failed at {:?}: {}", step, message);
                self.fail_analysis(SessionError::AnalysisFailed(message));
            }
        }
    }

    /// Called when the stream ends. If no terminal event was seen, the
    /// attempt failed: back to Confirmation with the recording preserved.
    pub fn analysis_stream_ended(&mut self) {
        if self.phase == SessionPhase::Analyzing {
            self.fail_analysis(SessionError::NetworkFailure(
                "analysis stream ended before a result".to_string(),
            ));
        }
    }

    /// Full submission wiring: multipart upload, then the SSE read loop.
    pub async fn submit(&mut self, client: &AnalysisClient) -> Result<(), SessionError> {
        let question_id = self
            .question_id
            .clone()
            .ok_or_else(|| SessionError::Other("no question selected".to_string()))?;
        let recording = self.begin_analysis()?;

        let mut response = match client.submit_recording(&recording, &question_id).await {
            Ok(response) => response,
            Err(e) => {
                let err: SessionError = e.into();
                self.fail_analysis(err.clone());
                return Err(err);
            }
        };

        let mut parser = SseParser::new();
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    for event in parser.push(&chunk) {
                        self.apply_analysis_event(event);
                    }
                    if self.phase != SessionPhase::Analyzing {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Analysis stream read failed: {}", e);
                    break;
                }
            }
        }
        parser.finish();
        self.analysis_stream_ended();
        Ok(())
    }

    /// Report → Listening with a full state reset.
    pub fn practice_again(&mut self) -> Result<(), SessionError> {
        if self.phase != SessionPhase::Report {
            return Err(SessionError::InvalidPhase(self.phase));
        }
        self.apply(PhaseTrigger::PracticeAgain)?;
        self.reset_run_state();
        info!("Practicing again");
        Ok(())
    }

    /// Restart from any phase: tear down in-flight audio first, then return
    /// to Listening.
    pub fn restart(&mut self) {
        self.player.stop_audio();
        self.recorder.release();
        let _ = self.apply(PhaseTrigger::Restart);
        self.reset_run_state();
        info!("Session restarted");
    }

    async fn enter_recording(&mut self) -> Result<(), SessionError> {
        // A failed beep never blocks the recording deadline.
        if let Err(e) = self.player.play_beep().await {
            warn!("Beep playback failed: {}", e);
        }

        match self.recorder.start_recording() {
            Ok(()) => {
                self.apply(PhaseTrigger::CountdownFinished)?;
                self.countdown.start(self.config.record_secs);
                info!("Recording started ({}s budget)", self.config.record_secs);
                Ok(())
            }
            Err(e) => {
                let err: SessionError = e.into();
                warn!("Could not start recording: {}", err);
                self.recorder.release();
                self.banner = Some(ErrorBanner::from_error(&err));
                self.apply(PhaseTrigger::PermissionRefused)?;
                Err(err)
            }
        }
    }

    fn finish_recording_internal(&mut self, trigger: PhaseTrigger) -> Result<(), SessionError> {
        let recording = self.recorder.stop_recording();
        match recording {
            Some(recording) => {
                info!(
                    "Recording finished: {:.1}s, {} bytes",
                    recording.duration_secs,
                    recording.bytes.len()
                );
                self.recording = Some(recording);
            }
            None => warn!("Recording stopped with no captured audio"),
        }
        self.apply(trigger)
    }

    fn fail_analysis(&mut self, err: SessionError) {
        self.banner = Some(ErrorBanner::from_error(&err));
        let _ = self.apply(PhaseTrigger::AnalysisFailed);
    }

    fn reset_run_state(&mut self) {
        self.countdown.cancel();
        self.progress.reset();
        self.recording = None;
        self.report = None;
        self.server_recording_id = None;
        self.report_audio_url = None;
        self.banner = None;
    }

    fn apply(&mut self, trigger: PhaseTrigger) -> Result<(), SessionError> {
        match transition(self.phase, trigger) {
            Some(next) => {
                debug!("Phase {:?} --{:?}--> {:?}", self.phase, trigger, next);
                self.phase = next;
                Ok(())
            }
            None => Err(SessionError::InvalidPhase(self.phase)),
        }
    }
}
