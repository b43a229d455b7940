//! SampleSource - a playback cursor over a shared [`SampleBuffer`]
//!
//! Sources are plain values. The control thread builds them and hands them
//! to the renderer; from then on only the audio thread mutates them, so no
//! field needs to be atomic. Trigger and stop requests cross threads through
//! the mix bus counters instead (see `engine::mixer`).
//!
//! # Real-Time Safety
//! `render_next_block` performs no allocation, locking, or I/O. Rendering is
//! purely additive into the caller's accumulator and never clips.

use std::f32::consts::FRAC_PI_2;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::sample_buffer::SampleBuffer;

/// Playback state of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SourceState {
    Idle = 0,
    Playing = 1,
    Finished = 2,
}

impl SourceState {
    /// Decode a value published through an `AtomicU8`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => SourceState::Playing,
            2 => SourceState::Finished,
            _ => SourceState::Idle,
        }
    }
}

/// Playback behavior once the playhead reaches the end of the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Play once, then report `Finished`
    OneShot,
    /// Wrap to the first frame until stopped
    Looping,
}

/// Mapping of a pan position in [-1, 1] to left/right coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanLaw {
    /// right = (pan + 1) / 2, left = 1 - right (-6 dB at center)
    #[default]
    Linear,
    /// cos/sin over a quarter circle (-3 dB at center)
    ConstantPower,
}

impl PanLaw {
    /// Left and right coefficients for `pan` (clamped to [-1, 1]).
    pub fn coefficients(self, pan: f32) -> (f32, f32) {
        let pan = pan.clamp(-1.0, 1.0);
        match self {
            PanLaw::Linear => {
                let right = (pan + 1.0) * 0.5;
                (1.0 - right, right)
            }
            PanLaw::ConstantPower => {
                let theta = (pan + 1.0) * 0.5 * FRAC_PI_2;
                (theta.cos(), theta.sin())
            }
        }
    }
}

/// Stateful cursor producing a gain/pan-scaled stream from a buffer.
#[derive(Debug, Clone)]
pub struct SampleSource {
    buffer: Arc<SampleBuffer>,
    kind: SourceKind,
    playhead: usize,
    pan: f32,
    gain: f32,
    pan_law: PanLaw,
    left_gain: f32,
    right_gain: f32,
    state: SourceState,
}

impl SampleSource {
    /// Create an idle source at unity gain.
    pub fn new(buffer: Arc<SampleBuffer>, kind: SourceKind, pan: f32) -> Self {
        let mut source = Self {
            buffer,
            kind,
            playhead: 0,
            pan: 0.0,
            gain: 1.0,
            pan_law: PanLaw::default(),
            left_gain: 0.0,
            right_gain: 0.0,
            state: SourceState::Idle,
        };
        source.set_pan(pan);
        source
    }

    pub fn one_shot(buffer: Arc<SampleBuffer>, pan: f32) -> Self {
        Self::new(buffer, SourceKind::OneShot, pan)
    }

    pub fn looping(buffer: Arc<SampleBuffer>, pan: f32) -> Self {
        Self::new(buffer, SourceKind::Looping, pan)
    }

    pub fn with_gain(mut self, gain: f32) -> Self {
        self.set_gain(gain);
        self
    }

    pub fn with_pan_law(mut self, pan_law: PanLaw) -> Self {
        self.pan_law = pan_law;
        self.update_channel_gains();
        self
    }

    pub fn buffer(&self) -> &Arc<SampleBuffer> {
        &self.buffer
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn state(&self) -> SourceState {
        self.state
    }

    pub fn playhead(&self) -> usize {
        self.playhead
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn pan(&self) -> f32 {
        self.pan
    }

    /// Set the source gain. Negative or NaN values become 0.
    pub fn set_gain(&mut self, gain: f32) {
        self.gain = if gain.is_nan() { 0.0 } else { gain.max(0.0) };
        self.update_channel_gains();
    }

    pub fn set_pan(&mut self, pan: f32) {
        self.pan = if pan.is_nan() { 0.0 } else { pan.clamp(-1.0, 1.0) };
        self.update_channel_gains();
    }

    fn update_channel_gains(&mut self) {
        let (left, right) = self.pan_law.coefficients(self.pan);
        self.left_gain = left * self.gain;
        self.right_gain = right * self.gain;
    }

    /// Arm the source from its first frame.
    ///
    /// Re-triggering a source that is still playing restarts it in place;
    /// a slot never sounds more than one voice.
    pub fn trigger(&mut self) {
        self.playhead = 0;
        self.state = SourceState::Playing;
    }

    pub fn stop(&mut self) {
        self.playhead = 0;
        self.state = SourceState::Idle;
    }

    /// Mix up to `frames` frames into `out` (interleaved, `out_channels`
    /// wide) and return how many frames were written.
    ///
    /// Audio thread only. A one-shot source writes at most its remaining
    /// frames and becomes `Finished` when the playhead reaches the end;
    /// idle or finished sources write nothing and keep their playhead. A
    /// source whose buffer was unloaded finishes without reading it.
    pub fn render_next_block(&mut self, out: &mut [f32], frames: usize, out_channels: usize) -> usize {
        if self.state != SourceState::Playing || out_channels == 0 {
            return 0;
        }

        let total = self.buffer.frame_count();
        if !self.buffer.is_valid() || total == 0 {
            self.state = SourceState::Finished;
            return 0;
        }

        let frames = frames.min(out.len() / out_channels);
        let src_channels = self.buffer.channel_count() as usize;
        let mut written = 0;

        while written < frames {
            if self.playhead >= total {
                match self.kind {
                    SourceKind::OneShot => break,
                    SourceKind::Looping => self.playhead = 0,
                }
            }

            let run = (frames - written).min(total - self.playhead);
            let src = &self.buffer.samples()
                [self.playhead * src_channels..(self.playhead + run) * src_channels];
            let dst = &mut out[written * out_channels..(written + run) * out_channels];
            self.mix_run(src, dst, src_channels, out_channels);

            self.playhead += run;
            written += run;
        }

        if self.kind == SourceKind::OneShot && self.playhead >= total {
            self.state = SourceState::Finished;
        }

        written
    }

    #[inline]
    fn mix_run(&self, src: &[f32], dst: &mut [f32], src_channels: usize, out_channels: usize) {
        match (src_channels, out_channels) {
            (1, 1) => {
                for (o, s) in dst.iter_mut().zip(src) {
                    *o += s * self.gain;
                }
            }
            (1, _) => {
                for (frame, s) in dst.chunks_exact_mut(out_channels).zip(src) {
                    frame[0] += s * self.left_gain;
                    frame[1] += s * self.right_gain;
                }
            }
            (_, 1) => {
                for (o, pair) in dst.iter_mut().zip(src.chunks_exact(2)) {
                    *o += (pair[0] + pair[1]) * 0.5 * self.gain;
                }
            }
            _ => {
                for (frame, pair) in dst.chunks_exact_mut(out_channels).zip(src.chunks_exact(2)) {
                    frame[0] += pair[0] * self.left_gain;
                    frame[1] += pair[1] * self.right_gain;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(samples: Vec<f32>, channels: u16) -> Arc<SampleBuffer> {
        Arc::new(SampleBuffer::from_interleaved(samples, channels, 48_000).unwrap())
    }

    #[test]
    fn test_state_machine() {
        let mut source = SampleSource::one_shot(buffer(vec![0.5; 4], 1), 0.0);
        assert_eq!(source.state(), SourceState::Idle);

        let mut out = [0.0; 8];
        assert_eq!(source.render_next_block(&mut out, 8, 1), 0);

        source.trigger();
        assert_eq!(source.state(), SourceState::Playing);
        assert_eq!(source.render_next_block(&mut out, 8, 1), 4);
        assert_eq!(source.state(), SourceState::Finished);

        source.trigger();
        assert_eq!(source.state(), SourceState::Playing);
        assert_eq!(source.playhead(), 0);

        source.stop();
        assert_eq!(source.state(), SourceState::Idle);
    }

    #[test]
    fn test_retrigger_restarts_in_place() {
        let mut source = SampleSource::one_shot(buffer(vec![1.0; 10], 1), 0.0);
        source.trigger();

        let mut out = [0.0; 6];
        source.render_next_block(&mut out, 6, 1);
        assert_eq!(source.playhead(), 6);

        source.trigger();
        assert_eq!(source.playhead(), 0);

        // Still a single voice: output is one sample deep, not two.
        let mut out = [0.0; 4];
        source.render_next_block(&mut out, 4, 1);
        assert_eq!(out, [1.0; 4]);
    }

    #[test]
    fn test_render_past_end_writes_remaining_frames() {
        let mut source = SampleSource::one_shot(buffer(vec![0.25; 10], 1), 0.0);
        source.trigger();

        let mut out = [0.0; 7];
        assert_eq!(source.render_next_block(&mut out, 7, 1), 7);
        let mut out = [0.0; 7];
        assert_eq!(source.render_next_block(&mut out, 7, 1), 3);
        assert_eq!(source.state(), SourceState::Finished);
        assert_eq!(&out[..3], &[0.25; 3]);
        assert_eq!(&out[3..], &[0.0; 4]);

        let mut out = [0.0; 7];
        assert_eq!(source.render_next_block(&mut out, 7, 1), 0);
        assert_eq!(source.playhead(), 10);
        assert_eq!(out, [0.0; 7]);
    }

    #[test]
    fn test_render_is_additive() {
        let mut source = SampleSource::one_shot(buffer(vec![0.25; 4], 1), 0.0);
        source.trigger();

        let mut out = [0.5; 4];
        source.render_next_block(&mut out, 4, 1);
        assert_eq!(out, [0.75; 4]);
    }

    #[test]
    fn test_gain_and_linear_pan() {
        let mut source = SampleSource::one_shot(buffer(vec![1.0; 2], 1), -1.0).with_gain(0.5);
        source.trigger();

        let mut out = [0.0; 4];
        source.render_next_block(&mut out, 2, 2);
        assert_eq!(out, [0.5, 0.0, 0.5, 0.0]);

        let mut centered = SampleSource::one_shot(buffer(vec![1.0; 1], 1), 0.0);
        centered.trigger();
        let mut out = [0.0; 2];
        centered.render_next_block(&mut out, 1, 2);
        assert_eq!(out, [0.5, 0.5]);
    }

    #[test]
    fn test_constant_power_pan_preserves_power() {
        for pan in [-1.0f32, -0.5, 0.0, 0.3, 1.0] {
            let (left, right) = PanLaw::ConstantPower.coefficients(pan);
            assert!((left * left + right * right - 1.0).abs() < 1e-6);
        }
        let (left, right) = PanLaw::ConstantPower.coefficients(0.0);
        assert!((left - right).abs() < 1e-6);
    }

    #[test]
    fn test_stereo_buffer_to_mono_output_averages() {
        let mut source = SampleSource::one_shot(buffer(vec![1.0, 0.0, 0.5, 0.5], 2), 0.0);
        source.trigger();

        let mut out = [0.0; 2];
        assert_eq!(source.render_next_block(&mut out, 2, 1), 2);
        assert_eq!(out, [0.5, 0.5]);
    }

    #[test]
    fn test_stereo_buffer_to_stereo_output_keeps_channels() {
        let mut source =
            SampleSource::one_shot(buffer(vec![1.0, -1.0], 2), 0.0).with_pan_law(PanLaw::Linear);
        source.trigger();

        let mut out = [0.0; 2];
        source.render_next_block(&mut out, 1, 2);
        assert_eq!(out, [0.5, -0.5]);
    }

    #[test]
    fn test_looping_wraps_until_stopped() {
        let mut source = SampleSource::looping(buffer(vec![0.1, 0.2, 0.3], 1), 0.0);
        source.trigger();

        let mut out = [0.0; 7];
        assert_eq!(source.render_next_block(&mut out, 7, 1), 7);
        assert_eq!(source.state(), SourceState::Playing);
        assert_eq!(out, [0.1, 0.2, 0.3, 0.1, 0.2, 0.3, 0.1]);

        source.stop();
        assert_eq!(source.render_next_block(&mut out, 7, 1), 0);
    }

    #[test]
    fn test_unloaded_buffer_finishes_silently() {
        let shared = buffer(vec![0.9; 16], 1);
        let mut source = SampleSource::one_shot(Arc::clone(&shared), 0.0);
        source.trigger();

        shared.unload();

        let mut out = [0.0; 16];
        assert_eq!(source.render_next_block(&mut out, 16, 1), 0);
        assert_eq!(source.state(), SourceState::Finished);
        assert_eq!(out, [0.0; 16]);
    }

    #[test]
    fn test_frames_limited_by_output_length() {
        let mut source = SampleSource::one_shot(buffer(vec![0.5; 100], 1), 0.0);
        source.trigger();

        let mut out = [0.0; 8];
        assert_eq!(source.render_next_block(&mut out, 64, 2), 4);
        assert_eq!(source.playhead(), 4);
    }

    #[test]
    fn test_negative_gain_clamped() {
        let source = SampleSource::one_shot(buffer(vec![0.5; 1], 1), 3.0).with_gain(-2.0);
        assert_eq!(source.gain(), 0.0);
        assert_eq!(source.pan(), 1.0);
    }

    #[test]
    fn test_state_round_trips_through_u8() {
        for state in [SourceState::Idle, SourceState::Playing, SourceState::Finished] {
            assert_eq!(SourceState::from_u8(state as u8), state);
        }
    }
}
