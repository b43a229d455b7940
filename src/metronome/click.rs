//! Click - synthesized fallback click and sample-accurate beat arithmetic
//!
//! Pure functions with deterministic output. `samples_per_beat` and
//! `is_on_beat` are allocation-free; the click generator allocates and must
//! run on the control thread.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::audio::SampleBuffer;
use crate::error::EngineError;

/// Duration of the synthesized click in milliseconds
const CLICK_DURATION_MS: f32 = 20.0;

/// Peak level of the synthesized click, leaving headroom for the accent gain
const CLICK_LEVEL: f32 = 0.5;

/// Generate a 20 ms white-noise click with a linear decay.
///
/// A fixed seed makes every call return identical samples.
///
/// # Examples
/// ```
/// use metronome_player::metronome::generate_click_sample;
/// let click = generate_click_sample(48_000);
/// assert_eq!(click.len(), 960);
/// ```
pub fn generate_click_sample(sample_rate: u32) -> Vec<f32> {
    let num_samples = (sample_rate as f32 * CLICK_DURATION_MS / 1000.0) as usize;
    let mut rng = StdRng::seed_from_u64(42);

    (0..num_samples)
        .map(|i| {
            let envelope = 1.0 - i as f32 / num_samples as f32;
            rng.gen_range(-1.0..1.0) * CLICK_LEVEL * envelope
        })
        .collect()
}

/// Mono sample buffer holding the synthesized click.
pub fn click_sample_buffer(sample_rate: u32) -> Result<SampleBuffer, EngineError> {
    SampleBuffer::from_interleaved(generate_click_sample(sample_rate), 1, sample_rate)
}

/// Frames between consecutive beats: `sample_rate * 60 / bpm`.
///
/// A zero tempo is treated as 1 BPM.
#[inline]
pub fn samples_per_beat(bpm: u32, sample_rate: u32) -> u64 {
    (sample_rate as u64 * 60) / bpm.max(1) as u64
}

/// Whether `frame` falls exactly on a beat boundary.
#[inline]
pub fn is_on_beat(frame: u64, bpm: u32, sample_rate: u32) -> bool {
    let spb = samples_per_beat(bpm, sample_rate).max(1);
    frame.is_multiple_of(spb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_click_duration() {
        for &sr in &[44_100, 48_000, 96_000] {
            let click = generate_click_sample(sr);
            let expected = (sr as f32 * CLICK_DURATION_MS / 1000.0) as usize;
            assert_eq!(click.len(), expected, "click should be 20ms at {} Hz", sr);
        }
    }

    #[test]
    fn test_click_range_and_decay() {
        let click = generate_click_sample(48_000);
        assert!(click.iter().all(|s| s.abs() <= CLICK_LEVEL));

        let head: f32 = click[..100].iter().map(|s| s.abs()).sum();
        let tail: f32 = click[click.len() - 100..].iter().map(|s| s.abs()).sum();
        assert!(head > tail, "click should decay");
    }

    #[test]
    fn test_click_deterministic() {
        assert_eq!(generate_click_sample(48_000), generate_click_sample(48_000));
    }

    #[test]
    fn test_click_buffer() {
        let buffer = click_sample_buffer(44_100).unwrap();
        assert_eq!(buffer.channel_count(), 1);
        assert_eq!(buffer.sample_rate(), 44_100);
        assert_eq!(buffer.frame_count(), 882);
    }

    #[test]
    fn test_samples_per_beat() {
        assert_eq!(samples_per_beat(120, 48_000), 24_000);
        assert_eq!(samples_per_beat(60, 48_000), 48_000);
        assert_eq!(samples_per_beat(100, 44_100), 26_460);
        assert_eq!(samples_per_beat(0, 48_000), 2_880_000);
    }

    #[test]
    fn test_is_on_beat() {
        let spb = samples_per_beat(120, 48_000);
        assert!(is_on_beat(0, 120, 48_000));
        assert!(is_on_beat(spb * 3, 120, 48_000));
        for offset in 1..50 {
            assert!(!is_on_beat(spb + offset, 120, 48_000));
            assert!(!is_on_beat(spb - offset, 120, 48_000));
        }
    }
}
