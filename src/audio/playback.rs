use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

const BEEP_FREQ_HZ: f32 = 880.0;
const BEEP_DURATION_MS: u32 = 350;
const BEEP_FADE_MS: u32 = 15;
const BEEP_GAIN: f32 = 0.3;
const BEEP_SAMPLE_RATE: u32 = 44_100;

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("No output device available")]
    NoOutputDevice,

    #[error("Audio decode failed: {0}")]
    DecodeFailure(String),

    #[error("Audio fetch failed: {0}")]
    Network(String),

    #[error("No question audio loaded")]
    NothingLoaded,

    #[error("Playback backend error: {0}")]
    Backend(String),
}

/// How a playback wait resolved. Callers treat an early stop the same as a
/// natural end for flow control; the flag exists for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackEnd {
    pub stopped_early: bool,
}

/// Decoded PCM kept for the page lifetime; cloning shares the sample data.
#[derive(Clone)]
struct DecodedAudio {
    samples: Arc<Vec<f32>>,
    sample_rate: u32,
    channels: u16,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PlayerStats {
    pub fetches: u32,
    pub decodes: u32,
}

/// Seam between the session controller and the speaker, so the state
/// machine can be exercised without an output device.
#[async_trait]
pub trait PromptPlayer: Send {
    /// Fetch raw bytes once per distinct URL. Does not decode yet.
    async fn load_audio(&mut self, url: &str) -> Result<(), PlaybackError>;
    /// Decode lazily (cached) and play to the end; a new playback stops any
    /// active one first.
    async fn play_question_audio(&mut self) -> Result<PlaybackEnd, PlaybackError>;
    /// Synthesized tone, no network dependency.
    async fn play_beep(&mut self) -> Result<PlaybackEnd, PlaybackError>;
    /// Halt active playback, resolving its pending wait early.
    fn stop_audio(&mut self);
    /// Release caches and any active playback.
    fn teardown(&mut self);
}

/// Production prompt player: per-URL byte cache, lazy WAV decode cache, and
/// one-shot playback on a dedicated output-stream thread.
pub struct QuestionAudioPlayer {
    http: reqwest::Client,
    raw_cache: HashMap<String, Vec<u8>>,
    decoded_cache: HashMap<String, DecodedAudio>,
    question_url: Option<String>,
    current: Option<PlaybackHandle>,
    stats: PlayerStats,
}

impl QuestionAudioPlayer {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            raw_cache: HashMap::new(),
            decoded_cache: HashMap::new(),
            question_url: None,
            current: None,
            stats: PlayerStats::default(),
        }
    }

    /// Seed the byte cache directly, e.g. when the asset arrives bundled
    /// with the question payload.
    pub fn insert_audio_bytes(&mut self, url: &str, bytes: Vec<u8>) {
        self.raw_cache.entry(url.to_string()).or_insert(bytes);
        self.question_url = Some(url.to_string());
    }

    pub fn stats(&self) -> PlayerStats {
        self.stats
    }

    fn ensure_decoded(&mut self, url: &str) -> Result<DecodedAudio, PlaybackError> {
        if let Some(decoded) = self.decoded_cache.get(url) {
            return Ok(decoded.clone());
        }
        let bytes = self.raw_cache.get(url).ok_or(PlaybackError::NothingLoaded)?;
        let decoded = decode_wav(bytes)?;
        self.stats.decodes += 1;
        debug!(
            "Decoded question audio: {} frames at {} Hz",
            decoded.samples.len() / decoded.channels.max(1) as usize,
            decoded.sample_rate
        );
        self.decoded_cache.insert(url.to_string(), decoded.clone());
        Ok(decoded)
    }

    async fn play(&mut self, audio: DecodedAudio) -> Result<PlaybackEnd, PlaybackError> {
        self.stop_audio();
        let (handle, done_rx) = spawn_playback(audio)?;
        self.current = Some(handle);
        match done_rx.await {
            Ok(end) => Ok(end),
            // Sender dropped without resolving: treat as an early stop.
            Err(_) => Ok(PlaybackEnd {
                stopped_early: true,
            }),
        }
    }
}

#[async_trait]
impl PromptPlayer for QuestionAudioPlayer {
    async fn load_audio(&mut self, url: &str) -> Result<(), PlaybackError> {
        if self.raw_cache.contains_key(url) {
            debug!("Question audio already cached: {}", url);
            self.question_url = Some(url.to_string());
            return Ok(());
        }

        self.stats.fetches += 1;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| PlaybackError::Network(e.to_string()))?;
        if !response.status().is_success() {
            return Err(PlaybackError::Network(format!(
                "HTTP {} fetching question audio",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| PlaybackError::Network(e.to_string()))?;

        info!("Fetched question audio: {} bytes from {}", bytes.len(), url);
        self.raw_cache.insert(url.to_string(), bytes.to_vec());
        self.question_url = Some(url.to_string());
        Ok(())
    }

    async fn play_question_audio(&mut self) -> Result<PlaybackEnd, PlaybackError> {
        let url = self
            .question_url
            .clone()
            .ok_or(PlaybackError::NothingLoaded)?;
        let audio = self.ensure_decoded(&url)?;
        self.play(audio).await
    }

    async fn play_beep(&mut self) -> Result<PlaybackEnd, PlaybackError> {
        let audio = DecodedAudio {
            samples: Arc::new(synthesize_beep(BEEP_SAMPLE_RATE)),
            sample_rate: BEEP_SAMPLE_RATE,
            channels: 1,
        };
        self.play(audio).await
    }

    fn stop_audio(&mut self) {
        if let Some(mut handle) = self.current.take() {
            handle.stop();
        }
    }

    fn teardown(&mut self) {
        self.stop_audio();
        self.raw_cache.clear();
        self.decoded_cache.clear();
        self.question_url = None;
    }
}

struct PlaybackHandle {
    msg_tx: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    done: Arc<Mutex<Option<oneshot::Sender<PlaybackEnd>>>>,
}

impl PlaybackHandle {
    fn stop(&mut self) {
        if let Ok(mut guard) = self.done.lock() {
            if let Some(tx) = guard.take() {
                let _ = tx.send(PlaybackEnd {
                    stopped_early: true,
                });
            }
        }
        let _ = self.msg_tx.send(());
    }
}

impl Drop for PlaybackHandle {
    fn drop(&mut self) {
        let _ = self.msg_tx.send(());
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                warn!("playback thread panicked during shutdown");
            }
        }
    }
}

/// Spawn a thread that owns the one-shot output stream. The done channel
/// resolves exactly once: either from the audio callback at natural end or
/// from `PlaybackHandle::stop`.
fn spawn_playback(
    audio: DecodedAudio,
) -> Result<(PlaybackHandle, oneshot::Receiver<PlaybackEnd>), PlaybackError> {
    let (done_tx, done_rx) = oneshot::channel();
    let done = Arc::new(Mutex::new(Some(done_tx)));
    let (msg_tx, msg_rx) = mpsc::channel::<()>();
    let (ready_tx, ready_rx) = mpsc::channel::<Result<(), PlaybackError>>();

    let cb_done = done.clone();
    let cb_msg_tx = msg_tx.clone();

    let join = thread::spawn(move || {
        let built = (|| -> Result<cpal::Stream, PlaybackError> {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or(PlaybackError::NoOutputDevice)?;
            let config = device
                .default_output_config()
                .map_err(|e| PlaybackError::Backend(e.to_string()))?;

            let out_channels = config.channels().max(1) as usize;
            let ratio = resample_ratio(audio.sample_rate, config.sample_rate());
            let src_channels = audio.channels.max(1) as usize;
            let src_frames = audio.samples.len() / src_channels;
            let samples = audio.samples.clone();
            let mut pos = 0.0f32;
            let mut finished = false;

            let err_fn = |err| error!("an error occurred on stream: {}", err);
            let stream = match config.sample_format() {
                cpal::SampleFormat::F32 => device
                    .build_output_stream(
                        &config.into(),
                        move |data: &mut [f32], _: &_| {
                            for frame in data.chunks_mut(out_channels) {
                                let idx = pos as usize;
                                let value = if idx + 1 < src_frames {
                                    let frac = pos - idx as f32;
                                    let s0 = frame_value(&samples, idx, src_channels);
                                    let s1 = frame_value(&samples, idx + 1, src_channels);
                                    s0 + (s1 - s0) * frac
                                } else if idx < src_frames {
                                    frame_value(&samples, idx, src_channels)
                                } else {
                                    if !finished {
                                        finished = true;
                                        if let Ok(mut guard) = cb_done.lock() {
                                            if let Some(tx) = guard.take() {
                                                let _ = tx.send(PlaybackEnd {
                                                    stopped_early: false,
                                                });
                                            }
                                        }
                                        let _ = cb_msg_tx.send(());
                                    }
                                    0.0
                                };
                                for ch in frame {
                                    *ch = value;
                                }
                                pos += ratio;
                            }
                        },
                        err_fn,
                        None,
                    )
                    .map_err(|e| PlaybackError::Backend(e.to_string()))?,
                other => {
                    return Err(PlaybackError::Backend(format!(
                        "unsupported output format {:?}",
                        other
                    )))
                }
            };

            stream
                .play()
                .map_err(|e| PlaybackError::Backend(e.to_string()))?;
            Ok(stream)
        })();

        match built {
            Ok(stream) => {
                let _ = ready_tx.send(Ok(()));
                // Hold the stream until natural end or an explicit stop.
                let _ = msg_rx.recv();
                drop(stream);
            }
            Err(e) => {
                let _ = ready_tx.send(Err(e));
            }
        }
    });

    match ready_rx.recv() {
        Ok(Ok(())) => Ok((
            PlaybackHandle {
                msg_tx,
                join: Some(join),
                done,
            },
            done_rx,
        )),
        Ok(Err(e)) => {
            let _ = join.join();
            Err(e)
        }
        Err(_) => {
            let _ = join.join();
            Err(PlaybackError::Backend(
                "playback thread exited before reporting readiness".to_string(),
            ))
        }
    }
}

/// Source-cursor step per output frame. Rates are plain `u32` hertz.
fn resample_ratio(src_rate: u32, out_rate: u32) -> f32 {
    src_rate as f32 / out_rate.max(1) as f32
}

fn frame_value(samples: &[f32], frame: usize, channels: usize) -> f32 {
    let start = frame * channels;
    let mut sum = 0.0;
    for ch in 0..channels {
        sum += samples.get(start + ch).copied().unwrap_or(0.0);
    }
    sum / channels as f32
}

fn decode_wav(bytes: &[u8]) -> Result<DecodedAudio, PlaybackError> {
    let reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| PlaybackError::DecodeFailure(e.to_string()))?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let max = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max))
                .collect::<Result<Vec<f32>, _>>()
                .map_err(|e| PlaybackError::DecodeFailure(e.to_string()))?
        }
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<f32>, _>>()
            .map_err(|e| PlaybackError::DecodeFailure(e.to_string()))?,
    };

    if samples.is_empty() {
        return Err(PlaybackError::DecodeFailure("empty audio".to_string()));
    }

    Ok(DecodedAudio {
        samples: Arc::new(samples),
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

/// Fixed-frequency tone with a linear fade-in/out envelope.
fn synthesize_beep(sample_rate: u32) -> Vec<f32> {
    let total = (sample_rate * BEEP_DURATION_MS / 1000) as usize;
    let fade = ((sample_rate * BEEP_FADE_MS / 1000) as usize).max(1);
    let mut samples = Vec::with_capacity(total);

    for i in 0..total {
        let t = i as f32 / sample_rate as f32;
        let mut s = (2.0 * std::f32::consts::PI * BEEP_FREQ_HZ * t).sin() * BEEP_GAIN;
        if i < fade {
            s *= i as f32 / fade as f32;
        }
        if total - i <= fade {
            s *= (total - i) as f32 / fade as f32;
        }
        samples.push(s);
    }

    samples
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioBuffer;

    fn wav_fixture() -> Vec<u8> {
        let mut buffer = AudioBuffer::new(16_000, 1);
        buffer.append(&vec![1000i16; 1_600]);
        buffer.to_wav_bytes()
    }

    #[test]
    fn beep_has_fade_envelope() {
        let samples = synthesize_beep(BEEP_SAMPLE_RATE);
        let expected = (BEEP_SAMPLE_RATE * BEEP_DURATION_MS / 1000) as usize;
        assert_eq!(samples.len(), expected);

        // First sample silent, interior above the fade floor, all clamped.
        assert!(samples[0].abs() < 1e-3);
        assert!(samples.iter().any(|s| s.abs() > 0.1));
        assert!(samples.iter().all(|s| s.abs() <= BEEP_GAIN + 1e-6));
        assert!(samples[samples.len() - 1].abs() < 1e-3);
    }

    #[test]
    fn decode_round_trips_wav_fixture() {
        let decoded = decode_wav(&wav_fixture()).unwrap();
        assert_eq!(decoded.sample_rate, 16_000);
        assert_eq!(decoded.channels, 1);
        assert_eq!(decoded.samples.len(), 1_600);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(
            decode_wav(&[0u8; 32]),
            Err(PlaybackError::DecodeFailure(_))
        ));
    }

    #[test]
    fn decode_is_cached_per_url() {
        let mut player = QuestionAudioPlayer::new(reqwest::Client::new());
        player.insert_audio_bytes("q1.wav", wav_fixture());

        player.ensure_decoded("q1.wav").unwrap();
        player.ensure_decoded("q1.wav").unwrap();
        assert_eq!(player.stats().decodes, 1);
    }

    #[tokio::test]
    async fn cached_url_is_not_fetched_again() {
        let mut player = QuestionAudioPlayer::new(reqwest::Client::new());
        player.insert_audio_bytes("q1.wav", wav_fixture());

        player.load_audio("q1.wav").await.unwrap();
        player.load_audio("q1.wav").await.unwrap();
        assert_eq!(player.stats().fetches, 0);
    }

    #[tokio::test]
    async fn play_without_load_is_rejected() {
        let mut player = QuestionAudioPlayer::new(reqwest::Client::new());
        assert!(matches!(
            player.play_question_audio().await,
            Err(PlaybackError::NothingLoaded)
        ));
    }

    #[test]
    fn resample_ratio_steps_the_source_cursor() {
        assert_eq!(resample_ratio(16_000, 48_000), 1.0 / 3.0);
        assert_eq!(resample_ratio(44_100, 44_100), 1.0);
        // A zero-rate device config must not divide by zero.
        assert_eq!(resample_ratio(16_000, 0), 16_000.0);
    }

    #[test]
    fn mono_frame_lookup_averages_channels() {
        let samples = vec![0.0, 1.0, 0.5, 0.5];
        assert_eq!(frame_value(&samples, 0, 2), 0.5);
        assert_eq!(frame_value(&samples, 1, 2), 0.5);
        assert_eq!(frame_value(&samples, 2, 2), 0.0);
    }
}
