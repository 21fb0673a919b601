use super::CaptureError;
use crate::audio::AudioBuffer;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{
    atomic::{AtomicBool, AtomicU32, Ordering},
    mpsc, Arc, Mutex,
};
use std::thread;
use tracing::{error, info, warn};

const RMS_BOOST: f32 = 2.5;
pub const LEVEL_MAX: f32 = 100.0;

/// Microphone capture engine.
///
/// The cpal stream is owned by a dedicated thread (cpal streams are not
/// Send), controlled through a stop channel. The capture thread keeps the
/// device open between `warmup` and `stop`, which is what hides the
/// permission-prompt latency from the recording deadline.
pub struct AudioCapture {
    worker: Option<StreamWorker>,
    buffer: Arc<Mutex<AudioBuffer>>,
    level: Arc<AtomicU32>,
    recording: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
}

struct StreamWorker {
    stop_tx: mpsc::Sender<()>,
    join: thread::JoinHandle<()>,
}

impl AudioCapture {
    pub fn new() -> Self {
        Self {
            worker: None,
            buffer: Arc::new(Mutex::new(AudioBuffer::new(16_000, 1))),
            level: Arc::new(AtomicU32::new(0.0f32.to_bits())),
            recording: Arc::new(AtomicBool::new(false)),
            paused: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request the input device ahead of time and hold the stream idle.
    /// Repeated calls while the stream is open are no-ops.
    pub fn warmup(&mut self) -> Result<(), CaptureError> {
        if self.worker.is_some() {
            return Ok(());
        }
        self.open_stream()
    }

    /// Begin buffering samples. Consumes a warmed stream if present, or
    /// opens a fresh one. On failure no state changes are kept.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.recording.load(Ordering::Relaxed) {
            return Err(CaptureError::AlreadyActive);
        }
        if self.worker.is_none() {
            self.open_stream()?;
        }
        if let Ok(mut guard) = self.buffer.lock() {
            guard.clear();
        }
        self.paused.store(false, Ordering::Relaxed);
        self.recording.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Freeze buffering and force the reported level to 0. The stream stays
    /// open so `resume` continues without data loss.
    pub fn pause(&self) {
        if self.recording.load(Ordering::Relaxed) {
            self.paused.store(true, Ordering::Relaxed);
            self.level.store(0.0f32.to_bits(), Ordering::Relaxed);
        }
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Relaxed);
    }

    /// Finalize the buffered capture and release the device. Safe to call
    /// while idle (no-op returning None). Releasing the stream stops all
    /// device tracks, which clears the OS microphone indicator.
    pub fn stop(&mut self) -> Option<AudioBuffer> {
        self.recording.store(false, Ordering::Relaxed);
        self.paused.store(false, Ordering::Relaxed);
        self.level.store(0.0f32.to_bits(), Ordering::Relaxed);

        let worker = self.worker.take()?;
        let _ = worker.stop_tx.send(());
        if worker.join.join().is_err() {
            warn!("capture thread panicked during shutdown");
        }

        let mut guard = self.buffer.lock().ok()?;
        let out = guard.clone();
        guard.clear();
        if out.is_empty() {
            None
        } else {
            Some(out)
        }
    }

    /// Discard buffered samples without releasing the device.
    pub fn clear(&self) {
        if let Ok(mut guard) = self.buffer.lock() {
            guard.clear();
        }
    }

    pub fn audio_level_handle(&self) -> Arc<AtomicU32> {
        self.level.clone()
    }

    pub fn is_open(&self) -> bool {
        self.worker.is_some()
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Relaxed)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    fn open_stream(&mut self) -> Result<(), CaptureError> {
        let buffer = self.buffer.clone();
        let level = self.level.clone();
        let recording = self.recording.clone();
        let paused = self.paused.clone();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(u32, u16), CaptureError>>();

        let join = thread::spawn(move || {
            let built = (|| -> Result<(cpal::Stream, u32, u16), CaptureError> {
                let host = cpal::default_host();
                let device = host
                    .default_input_device()
                    .ok_or(CaptureError::DeviceNotFound)?;
                info!("Input device: {}", device_display_name(&device));

                let config = device
                    .default_input_config()
                    .map_err(classify_config_error)?;
                let sample_rate = config.sample_rate();
                let channels = config.channels();

                let err_fn = |err| error!("an error occurred on stream: {}", err);
                let stream = match config.sample_format() {
                    cpal::SampleFormat::I16 => {
                        let buffer = buffer.clone();
                        let level = level.clone();
                        let recording = recording.clone();
                        let paused = paused.clone();
                        device.build_input_stream(
                            &config.into(),
                            move |data: &[i16], _: &_| {
                                write_input_data(data, &buffer, &level, &recording, &paused)
                            },
                            err_fn,
                            None,
                        )
                    }
                    cpal::SampleFormat::F32 => device.build_input_stream(
                        &config.into(),
                        move |data: &[f32], _: &_| {
                            write_input_data_f32(data, &buffer, &level, &recording, &paused)
                        },
                        err_fn,
                        None,
                    ),
                    other => {
                        return Err(CaptureError::Backend(format!(
                            "unsupported sample format {:?}",
                            other
                        )))
                    }
                }
                .map_err(classify_build_error)?;

                stream.play().map_err(|e| CaptureError::Backend(e.to_string()))?;
                Ok((stream, sample_rate, channels))
            })();

            match built {
                Ok((stream, sample_rate, channels)) => {
                    let _ = ready_tx.send(Ok((sample_rate, channels)));
                    // Hold the stream until told to stop. Dropping it
                    // releases the device tracks.
                    let _ = stop_rx.recv();
                    drop(stream);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            }
        });

        match ready_rx.recv() {
            Ok(Ok((sample_rate, channels))) => {
                if let Ok(mut guard) = self.buffer.lock() {
                    guard.sample_rate = sample_rate;
                    guard.channels = channels;
                    guard.clear();
                }
                self.worker = Some(StreamWorker { stop_tx, join });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = join.join();
                Err(e)
            }
            Err(_) => {
                let _ = join.join();
                Err(CaptureError::Backend(
                    "capture thread exited before reporting readiness".to_string(),
                ))
            }
        }
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn device_display_name(device: &cpal::Device) -> String {
    device
        .name()
        .or_else(|_| device.description().map(|d| d.name().to_string()))
        .unwrap_or_else(|_| "Unknown input".to_string())
}

fn classify_build_error(e: cpal::BuildStreamError) -> CaptureError {
    match e {
        cpal::BuildStreamError::DeviceNotAvailable => CaptureError::DeviceNotFound,
        other => classify_message(other.to_string()),
    }
}

fn classify_config_error(e: cpal::DefaultStreamConfigError) -> CaptureError {
    match e {
        cpal::DefaultStreamConfigError::DeviceNotAvailable => CaptureError::DeviceNotFound,
        other => classify_message(other.to_string()),
    }
}

fn classify_message(msg: String) -> CaptureError {
    let lower = msg.to_ascii_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("access") {
        CaptureError::PermissionDenied(msg)
    } else {
        CaptureError::Backend(msg)
    }
}

fn write_input_data(
    input: &[i16],
    buffer: &Arc<Mutex<AudioBuffer>>,
    level: &Arc<AtomicU32>,
    recording: &Arc<AtomicBool>,
    paused: &Arc<AtomicBool>,
) {
    if paused.load(Ordering::Relaxed) {
        level.store(0.0f32.to_bits(), Ordering::Relaxed);
        return;
    }

    let rms = rms_i16(input);
    level.store(scale_level(rms).to_bits(), Ordering::Relaxed);

    if recording.load(Ordering::Relaxed) {
        if let Ok(mut guard) = buffer.lock() {
            guard.append(input);
        }
    }
}

fn write_input_data_f32(
    input: &[f32],
    buffer: &Arc<Mutex<AudioBuffer>>,
    level: &Arc<AtomicU32>,
    recording: &Arc<AtomicBool>,
    paused: &Arc<AtomicBool>,
) {
    if paused.load(Ordering::Relaxed) {
        level.store(0.0f32.to_bits(), Ordering::Relaxed);
        return;
    }

    let rms = rms_f32(input);
    level.store(scale_level(rms).to_bits(), Ordering::Relaxed);

    if recording.load(Ordering::Relaxed) {
        let samples: Vec<i16> = input
            .iter()
            .map(|&x| (x.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
            .collect();
        if let Ok(mut guard) = buffer.lock() {
            guard.append(&samples);
        }
    }
}

/// Rescale an RMS magnitude to the 0-100 meter range with a fixed boost.
fn scale_level(rms: f32) -> f32 {
    (rms * RMS_BOOST * LEVEL_MAX).clamp(0.0, LEVEL_MAX)
}

fn rms_i16(input: &[i16]) -> f32 {
    if input.is_empty() {
        return 0.0;
    }
    let sum: f32 = input
        .iter()
        .map(|&s| {
            let v = s as f32 / i16::MAX as f32;
            v * v
        })
        .sum();
    (sum / input.len() as f32).sqrt()
}

fn rms_f32(input: &[f32]) -> f32 {
    if input.is_empty() {
        return 0.0;
    }
    let sum: f32 = input.iter().map(|&s| s * s).sum();
    (sum / input.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared_state() -> (
        Arc<Mutex<AudioBuffer>>,
        Arc<AtomicU32>,
        Arc<AtomicBool>,
        Arc<AtomicBool>,
    ) {
        (
            Arc::new(Mutex::new(AudioBuffer::new(16_000, 1))),
            Arc::new(AtomicU32::new(0.0f32.to_bits())),
            Arc::new(AtomicBool::new(true)),
            Arc::new(AtomicBool::new(false)),
        )
    }

    #[test]
    fn level_is_clamped_to_meter_range() {
        assert_eq!(scale_level(0.0), 0.0);
        assert_eq!(scale_level(10.0), LEVEL_MAX);
        let mid = scale_level(0.2);
        assert!(mid > 0.0 && mid < LEVEL_MAX);
    }

    #[test]
    fn rms_of_silence_is_zero() {
        assert_eq!(rms_i16(&[0, 0, 0, 0]), 0.0);
        assert_eq!(rms_f32(&[]), 0.0);
    }

    #[test]
    fn callback_appends_while_recording() {
        let (buffer, level, recording, paused) = shared_state();
        write_input_data(&[100, -100, 100, -100], &buffer, &level, &recording, &paused);

        assert_eq!(buffer.lock().unwrap().samples.len(), 4);
        assert!(f32::from_bits(level.load(Ordering::Relaxed)) > 0.0);
    }

    #[test]
    fn paused_callback_drops_no_previous_bytes_and_zeroes_level() {
        let (buffer, level, recording, paused) = shared_state();
        write_input_data(&[500; 8], &buffer, &level, &recording, &paused);

        paused.store(true, Ordering::Relaxed);
        write_input_data(&[500; 8], &buffer, &level, &recording, &paused);
        assert_eq!(buffer.lock().unwrap().samples.len(), 8);
        assert_eq!(f32::from_bits(level.load(Ordering::Relaxed)), 0.0);

        // Resume: the two segments concatenate into one continuous capture.
        paused.store(false, Ordering::Relaxed);
        write_input_data(&[500; 8], &buffer, &level, &recording, &paused);
        assert_eq!(buffer.lock().unwrap().samples.len(), 16);
    }

    #[test]
    fn idle_stream_meters_without_buffering() {
        let (buffer, level, recording, paused) = shared_state();
        recording.store(false, Ordering::Relaxed);

        write_input_data(&[1000; 16], &buffer, &level, &recording, &paused);
        assert!(buffer.lock().unwrap().is_empty());
        assert!(f32::from_bits(level.load(Ordering::Relaxed)) > 0.0);
    }

    #[test]
    fn f32_input_is_converted_and_clamped() {
        let (buffer, level, recording, paused) = shared_state();
        write_input_data_f32(&[2.0, -2.0], &buffer, &level, &recording, &paused);

        let guard = buffer.lock().unwrap();
        assert_eq!(guard.samples[0], i16::MAX);
        assert_eq!(guard.samples[1], -i16::MAX);
    }

    #[test]
    fn stop_on_idle_engine_is_noop() {
        let mut capture = AudioCapture::new();
        assert!(capture.stop().is_none());
        assert!(!capture.is_open());
    }
}
