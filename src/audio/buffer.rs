use serde::{Deserialize, Serialize};

/// Interleaved 16-bit PCM accumulated by the capture callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioBuffer {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
    /// Derived from the sample count, kept current by `append`.
    #[serde(skip)]
    pub duration_secs: f32,
}

impl AudioBuffer {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            samples: Vec::new(),
            sample_rate,
            channels,
            duration_secs: 0.0,
        }
    }

    pub fn append(&mut self, data: &[i16]) {
        self.samples.extend_from_slice(data);
        self.update_duration();
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.duration_secs = 0.0;
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    fn update_duration(&mut self) {
        if self.sample_rate == 0 {
            self.duration_secs = 0.0;
        } else {
            let frames = self.samples.len() as f32 / self.channels.max(1) as f32;
            self.duration_secs = frames / self.sample_rate as f32;
        }
    }

    /// Encode as a 16-bit PCM WAV file.
    pub fn to_wav_bytes(&self) -> Vec<u8> {
        let samples = &self.samples;
        let mut wav = Vec::with_capacity(44 + samples.len() * 2);

        // RIFF header
        wav.extend_from_slice(b"RIFF");
        let file_size = (36 + samples.len() * 2) as u32;
        wav.extend_from_slice(&file_size.to_le_bytes());
        wav.extend_from_slice(b"WAVE");

        // fmt chunk
        wav.extend_from_slice(b"fmt ");
        wav.extend_from_slice(&16u32.to_le_bytes()); // chunk size
        wav.extend_from_slice(&1u16.to_le_bytes()); // PCM format
        wav.extend_from_slice(&self.channels.to_le_bytes());
        wav.extend_from_slice(&self.sample_rate.to_le_bytes());
        let byte_rate = self.sample_rate * self.channels as u32 * 2;
        wav.extend_from_slice(&byte_rate.to_le_bytes());
        wav.extend_from_slice(&(self.channels * 2).to_le_bytes()); // block align
        wav.extend_from_slice(&16u16.to_le_bytes()); // bits per sample

        // data chunk
        wav.extend_from_slice(b"data");
        let data_size = (samples.len() * 2) as u32;
        wav.extend_from_slice(&data_size.to_le_bytes());

        for &sample in samples {
            wav.extend_from_slice(&sample.to_le_bytes());
        }

        wav
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_tracks_appended_samples() {
        let mut buffer = AudioBuffer::new(16_000, 1);
        buffer.append(&vec![0i16; 16_000]);
        assert!((buffer.duration_secs - 1.0).abs() < f32::EPSILON);

        buffer.append(&vec![0i16; 8_000]);
        assert!((buffer.duration_secs - 1.5).abs() < f32::EPSILON);
    }

    #[test]
    fn duration_accounts_for_channels() {
        let mut buffer = AudioBuffer::new(16_000, 2);
        buffer.append(&vec![0i16; 32_000]);
        assert!((buffer.duration_secs - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn wav_header_is_well_formed() {
        let mut buffer = AudioBuffer::new(16_000, 1);
        buffer.append(&[0i16, 1, -1, 42]);
        let wav = buffer.to_wav_bytes();

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(wav.len(), 44 + 4 * 2);

        let data_size = u32::from_le_bytes([wav[40], wav[41], wav[42], wav[43]]);
        assert_eq!(data_size, 8);
    }

    #[test]
    fn clear_resets_duration() {
        let mut buffer = AudioBuffer::new(16_000, 1);
        buffer.append(&vec![0i16; 1_000]);
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.duration_secs, 0.0);
    }
}
