//! Guided speaking-practice session core.
//!
//! The session walks one question through Listening, Preparing, Recording,
//! Confirmation, Analyzing and Report. [`session::PracticeSession`] owns the
//! phase machine and countdowns, [`audio`] captures the take and plays the
//! question prompt and beep, [`api`] talks to the analysis backend, and
//! [`sse`] parses its event stream. The embedding UI samples
//! [`session::SessionSnapshot`] and drives the one-second clock.

pub mod api;
pub mod audio;
pub mod config;
pub mod session;
pub mod sse;

pub use api::AnalysisClient;
pub use audio::{AudioRecorder, CaptureEngine, CapturedRecording, PromptPlayer, QuestionAudioPlayer};
pub use config::AppConfig;
pub use session::{DefaultPracticeSession, PracticeSession, SessionError, SessionSnapshot};
pub use sse::{SseEvent, SseParser};
