pub mod buffer;
pub mod capture;
pub mod playback;

pub use buffer::AudioBuffer;
pub use playback::{PlaybackEnd, PlaybackError, PromptPlayer, QuestionAudioPlayer};

use serde::Serialize;
use std::sync::{atomic::AtomicU32, Arc};
use thiserror::Error;
use uuid::Uuid;

use capture::AudioCapture;

/// Capture error taxonomy surfaced to the session layer.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Microphone permission denied: {0}")]
    PermissionDenied(String),

    #[error("No input device available")]
    DeviceNotFound,

    #[error("Capture already active")]
    AlreadyActive,

    #[error("Capture backend error: {0}")]
    Backend(String),
}

/// A finished capture, immutable once created. Superseded by the server's
/// recording id after submission.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedRecording {
    pub id: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub duration_secs: f32,
}

impl CapturedRecording {
    pub fn from_buffer(buffer: &AudioBuffer) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            bytes: buffer.to_wav_bytes(),
            mime_type: "audio/wav".to_string(),
            duration_secs: buffer.duration_secs,
        }
    }
}

/// Seam between the session controller and the microphone, so the state
/// machine can be exercised without a live input device.
pub trait CaptureEngine: Send {
    /// Pre-acquire the device; idempotent while the stream is open.
    fn warmup(&mut self) -> Result<(), CaptureError>;
    fn start_recording(&mut self) -> Result<(), CaptureError>;
    fn pause_recording(&mut self);
    fn resume_recording(&mut self);
    /// Finalize and release the device. No-op (None) when nothing was
    /// captured.
    fn stop_recording(&mut self) -> Option<CapturedRecording>;
    /// Discard buffered audio, keeping the device open for a re-take.
    fn clear_recording(&mut self);
    /// Tear down the device without keeping a result. Idempotent; every
    /// phase transition that discards audio goes through here.
    fn release(&mut self);
    fn is_recording(&self) -> bool;
    fn is_open(&self) -> bool;
}

/// Production capture engine backed by cpal.
pub struct AudioRecorder {
    capture: AudioCapture,
}

impl AudioRecorder {
    pub fn new() -> Self {
        Self {
            capture: AudioCapture::new(),
        }
    }

    pub fn audio_level_handle(&self) -> Arc<AtomicU32> {
        self.capture.audio_level_handle()
    }

    pub fn is_paused(&self) -> bool {
        self.capture.is_paused()
    }
}

impl Default for AudioRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureEngine for AudioRecorder {
    fn warmup(&mut self) -> Result<(), CaptureError> {
        self.capture.warmup()
    }

    fn start_recording(&mut self) -> Result<(), CaptureError> {
        self.capture.start()
    }

    fn pause_recording(&mut self) {
        self.capture.pause();
    }

    fn resume_recording(&mut self) {
        self.capture.resume();
    }

    fn stop_recording(&mut self) -> Option<CapturedRecording> {
        self.capture
            .stop()
            .map(|buffer| CapturedRecording::from_buffer(&buffer))
    }

    fn clear_recording(&mut self) {
        self.capture.clear();
    }

    fn release(&mut self) {
        let _ = self.capture.stop();
    }

    fn is_recording(&self) -> bool {
        self.capture.is_recording()
    }

    fn is_open(&self) -> bool {
        self.capture.is_open()
    }
}
