//! SampleBuffer - decoded PCM shared between the control and audio threads
//!
//! A buffer is written exactly once, at construction, and is read-only
//! afterwards. Sharing happens through `Arc<SampleBuffer>`: the player's
//! registry holds one reference and every attached sample source holds
//! another, so the sample memory lives until the last reader lets go.
//!
//! `unload()` only flips the validity flag. Sources check the flag at the
//! start of every block and finish silently once it is cleared, which lets
//! the control thread retire a buffer without racing the audio callback.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::EngineError;
use crate::wav::{AudioFormat, SampleEncoding, WavReader};

/// Immutable interleaved `f32` samples in [-1.0, 1.0] plus their format.
#[derive(Debug)]
pub struct SampleBuffer {
    samples: Box<[f32]>,
    format: AudioFormat,
    valid: AtomicBool,
}

impl SampleBuffer {
    /// Decode every sample of a parsed WAV asset into a new buffer.
    pub fn load_sample_data(reader: &WavReader<'_>) -> Self {
        let mut samples = Vec::new();
        reader.decode_into(&mut samples);

        Self {
            samples: samples.into_boxed_slice(),
            format: *reader.format(),
            valid: AtomicBool::new(true),
        }
    }

    /// Wrap already-normalized interleaved samples.
    ///
    /// A trailing partial frame is dropped.
    ///
    /// # Errors
    /// `InvalidChannelCount` unless `channel_count` is 1 or 2.
    pub fn from_interleaved(
        mut samples: Vec<f32>,
        channel_count: u16,
        sample_rate: u32,
    ) -> Result<Self, EngineError> {
        if !(1..=2).contains(&channel_count) {
            return Err(EngineError::InvalidChannelCount {
                channels: channel_count,
            });
        }

        let frame_count = samples.len() / channel_count as usize;
        samples.truncate(frame_count * channel_count as usize);

        Ok(Self {
            samples: samples.into_boxed_slice(),
            format: AudioFormat {
                channel_count,
                sample_rate,
                bits_per_sample: 32,
                frame_count,
                encoding: SampleEncoding::IeeeFloat,
            },
            valid: AtomicBool::new(true),
        })
    }

    pub fn format(&self) -> &AudioFormat {
        &self.format
    }

    pub fn frame_count(&self) -> usize {
        self.format.frame_count
    }

    pub fn channel_count(&self) -> u16 {
        self.format.channel_count
    }

    pub fn sample_rate(&self) -> u32 {
        self.format.sample_rate
    }

    /// Samples of one frame, or `None` past the end or after `unload()`.
    pub fn read_frame(&self, index: usize) -> Option<&[f32]> {
        if !self.is_valid() || index >= self.format.frame_count {
            return None;
        }
        let channels = self.format.channel_count as usize;
        let start = index * channels;
        Some(&self.samples[start..start + channels])
    }

    /// All interleaved samples, regardless of validity.
    pub(crate) fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Mark the buffer unusable. Readers see this on their next block.
    pub fn unload(&self) {
        self.valid.store(false, Ordering::Release);
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Linearly interpolated copy at `target_rate`.
    ///
    /// Assets are usually authored at 44.1 kHz while low-latency Android
    /// streams prefer 48 kHz; converting once at load time keeps the audio
    /// callback free of rate conversion.
    pub fn resampled(&self, target_rate: u32) -> Self {
        let source_rate = self.format.sample_rate;
        if target_rate == 0 || source_rate == target_rate || self.format.frame_count == 0 {
            return Self {
                samples: self.samples.clone(),
                format: self.format,
                valid: AtomicBool::new(self.is_valid()),
            };
        }

        let channels = self.format.channel_count as usize;
        let frames = self.format.frame_count;
        let ratio = f64::from(target_rate) / f64::from(source_rate);
        let output_frames = (frames as f64 * ratio).ceil() as usize;
        let mut output = Vec::with_capacity(output_frames * channels);

        for i in 0..output_frames {
            let src_pos = i as f64 / ratio;
            let src_idx = src_pos.floor() as usize;
            let frac = (src_pos - src_idx as f64) as f32;

            for ch in 0..channels {
                let sample = if src_idx + 1 < frames {
                    let s1 = self.samples[src_idx * channels + ch];
                    let s2 = self.samples[(src_idx + 1) * channels + ch];
                    s1 + (s2 - s1) * frac
                } else {
                    self.samples[(frames - 1) * channels + ch]
                };
                output.push(sample);
            }
        }

        Self {
            samples: output.into_boxed_slice(),
            format: AudioFormat {
                sample_rate: target_rate,
                frame_count: output_frames,
                ..self.format
            },
            valid: AtomicBool::new(self.is_valid()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_interleaved_counts_frames() {
        let buffer = SampleBuffer::from_interleaved(vec![0.1, 0.2, 0.3, 0.4, 0.5], 2, 48_000)
            .unwrap();
        assert_eq!(buffer.frame_count(), 2);
        assert_eq!(buffer.channel_count(), 2);
        assert_eq!(buffer.read_frame(1), Some(&[0.3, 0.4][..]));
        assert_eq!(buffer.read_frame(2), None);
    }

    #[test]
    fn test_from_interleaved_rejects_surround() {
        let result = SampleBuffer::from_interleaved(vec![0.0; 6], 6, 48_000);
        assert!(matches!(
            result,
            Err(EngineError::InvalidChannelCount { channels: 6 })
        ));
    }

    #[test]
    fn test_unload_invalidates_reads() {
        let buffer = SampleBuffer::from_interleaved(vec![0.5; 4], 1, 44_100).unwrap();
        assert!(buffer.is_valid());
        assert!(buffer.read_frame(0).is_some());

        buffer.unload();

        assert!(!buffer.is_valid());
        assert_eq!(buffer.read_frame(0), None);
    }

    #[test]
    fn test_resample_same_rate_is_identity() {
        let buffer = SampleBuffer::from_interleaved(vec![0.1, 0.2, 0.3], 1, 48_000).unwrap();
        let resampled = buffer.resampled(48_000);
        assert_eq!(resampled.samples(), buffer.samples());
        assert_eq!(resampled.sample_rate(), 48_000);
    }

    #[test]
    fn test_resample_upsample_interpolates() {
        let buffer = SampleBuffer::from_interleaved(vec![0.0, 1.0], 1, 24_000).unwrap();
        let resampled = buffer.resampled(48_000);

        assert_eq!(resampled.frame_count(), 4);
        assert_eq!(resampled.sample_rate(), 48_000);
        assert_eq!(resampled.samples(), &[0.0, 0.5, 1.0, 1.0]);
    }

    #[test]
    fn test_resample_keeps_channels_apart() {
        let buffer =
            SampleBuffer::from_interleaved(vec![1.0, -1.0, 1.0, -1.0, 1.0, -1.0], 2, 44_100)
                .unwrap();
        let resampled = buffer.resampled(48_000);

        assert_eq!(resampled.channel_count(), 2);
        assert_eq!(resampled.frame_count(), 4);
        for frame in resampled.samples().chunks_exact(2) {
            assert_eq!(frame, &[1.0, -1.0]);
        }
    }

    #[test]
    fn test_sync_and_send() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SampleBuffer>();
    }
}
