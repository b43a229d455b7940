//! Format metadata shared by the decoder, sample buffers, and the CLI.

use serde::{Deserialize, Serialize};

/// How sample words are stored in the `data` chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleEncoding {
    /// Integer PCM (8-bit unsigned, 16/24/32-bit signed)
    Pcm,
    /// 32-bit IEEE float
    IeeeFloat,
}

/// Decoded stream description.
///
/// `channel_count` is always 1 or 2 and `bits_per_sample` one of
/// 8, 16, 24 or 32 for anything produced by [`WavReader`](super::WavReader).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub channel_count: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub frame_count: usize,
    pub encoding: SampleEncoding,
}

impl AudioFormat {
    /// Bytes occupied by one interleaved frame in the source data.
    pub fn block_align(&self) -> usize {
        self.channel_count as usize * (self.bits_per_sample as usize / 8)
    }

    /// Playback length at the native sample rate.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count as f64 / f64::from(self.sample_rate)
    }
}
