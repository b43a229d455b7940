//! RIFF/WAVE parser.
//!
//! Walks the chunk list of an in-memory WAV asset, validates the `fmt `
//! chunk, and exposes the `data` chunk as normalized `f32` samples.
//! Parsing borrows the input bytes; nothing is copied until the samples are
//! decoded into a [`SampleBuffer`](crate::audio::SampleBuffer).

use crate::error::DecodeError;

use super::format::{AudioFormat, SampleEncoding};

const RIFF_HEADER_LEN: usize = 12;
const CHUNK_HEADER_LEN: usize = 8;
const FMT_MIN_LEN: usize = 16;
const FMT_EXTENSIBLE_LEN: usize = 40;

const FORMAT_PCM: u16 = 0x0001;
const FORMAT_IEEE_FLOAT: u16 = 0x0003;
const FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Parsed WAV asset borrowing its `data` chunk from the input buffer.
#[derive(Debug, Clone)]
pub struct WavReader<'a> {
    format: AudioFormat,
    data: &'a [u8],
}

impl<'a> WavReader<'a> {
    /// Parse a complete RIFF/WAVE byte buffer.
    ///
    /// Chunks may appear in any order; unknown chunks are skipped by their
    /// declared size (plus the RIFF pad byte for odd sizes).
    ///
    /// # Errors
    /// - `BadMagic` if the RIFF/WAVE identifiers are missing
    /// - `Truncated` if a chunk claims more bytes than remain, or the buffer
    ///   ends before a `data` chunk
    /// - `MissingChunk` if `data` is present without `fmt `
    /// - `UnsupportedFormat` for encodings the engine cannot play
    pub fn parse(bytes: &'a [u8]) -> Result<Self, DecodeError> {
        if bytes.len() < RIFF_HEADER_LEN {
            if bytes.len() >= 4 && &bytes[0..4] == b"RIFF" {
                return Err(DecodeError::Truncated {
                    needed: RIFF_HEADER_LEN,
                    available: bytes.len(),
                });
            }
            return Err(DecodeError::BadMagic);
        }
        if &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
            return Err(DecodeError::BadMagic);
        }

        let mut fmt: Option<FmtChunk> = None;
        let mut data: Option<&'a [u8]> = None;
        let mut pos = RIFF_HEADER_LEN;

        while pos < bytes.len() && (fmt.is_none() || data.is_none()) {
            let remaining = bytes.len() - pos;
            if remaining < CHUNK_HEADER_LEN {
                return Err(DecodeError::Truncated {
                    needed: CHUNK_HEADER_LEN,
                    available: remaining,
                });
            }

            let id = &bytes[pos..pos + 4];
            let size = read_u32(&bytes[pos + 4..pos + 8]) as usize;
            let body_start = pos + CHUNK_HEADER_LEN;
            let available = bytes.len() - body_start;
            if size > available {
                return Err(DecodeError::Truncated {
                    needed: size,
                    available,
                });
            }
            let body = &bytes[body_start..body_start + size];

            match id {
                b"fmt " => fmt = Some(FmtChunk::parse(body)?),
                b"data" => data = Some(body),
                other => {
                    tracing::trace!(
                        "[WavReader] Skipping chunk {:?} ({} bytes)",
                        String::from_utf8_lossy(other),
                        size
                    );
                }
            }

            pos = body_start + size + (size & 1);
        }

        match (fmt, data) {
            (Some(fmt), Some(data)) => {
                let block_align = fmt.block_align as usize;
                let format = AudioFormat {
                    channel_count: fmt.channels,
                    sample_rate: fmt.sample_rate,
                    bits_per_sample: fmt.bits_per_sample,
                    frame_count: data.len() / block_align,
                    encoding: fmt.encoding,
                };
                Ok(Self { format, data })
            }
            (None, Some(_)) => Err(DecodeError::MissingChunk { id: "fmt " }),
            (_, None) => Err(DecodeError::Truncated {
                needed: CHUNK_HEADER_LEN,
                available: 0,
            }),
        }
    }

    pub fn format(&self) -> &AudioFormat {
        &self.format
    }

    pub fn channel_count(&self) -> u16 {
        self.format.channel_count
    }

    pub fn sample_rate(&self) -> u32 {
        self.format.sample_rate
    }

    pub fn frame_count(&self) -> usize {
        self.format.frame_count
    }

    /// Iterate interleaved samples normalized to [-1.0, 1.0].
    ///
    /// A trailing partial frame in the `data` chunk is ignored.
    pub fn samples(&self) -> impl Iterator<Item = f32> + '_ {
        let bytes_per_sample = self.format.bits_per_sample as usize / 8;
        let used = self.format.frame_count * self.format.block_align();
        let encoding = self.format.encoding;
        let bits = self.format.bits_per_sample;

        self.data[..used]
            .chunks_exact(bytes_per_sample)
            .map(move |word| decode_sample(encoding, bits, word))
    }

    /// Append every normalized sample to `out`.
    pub fn decode_into(&self, out: &mut Vec<f32>) {
        out.reserve(self.format.frame_count * self.format.channel_count as usize);
        out.extend(self.samples());
    }
}

/// Validated contents of a `fmt ` chunk.
#[derive(Debug, Clone, Copy)]
struct FmtChunk {
    encoding: SampleEncoding,
    channels: u16,
    sample_rate: u32,
    block_align: u16,
    bits_per_sample: u16,
}

impl FmtChunk {
    fn parse(body: &[u8]) -> Result<Self, DecodeError> {
        if body.len() < FMT_MIN_LEN {
            return Err(DecodeError::Truncated {
                needed: FMT_MIN_LEN,
                available: body.len(),
            });
        }

        let mut tag = read_u16(&body[0..2]);
        let channels = read_u16(&body[2..4]);
        let sample_rate = read_u32(&body[4..8]);
        let block_align = read_u16(&body[12..14]);
        let bits_per_sample = read_u16(&body[14..16]);

        if tag == FORMAT_EXTENSIBLE {
            if body.len() < FMT_EXTENSIBLE_LEN {
                return Err(DecodeError::Truncated {
                    needed: FMT_EXTENSIBLE_LEN,
                    available: body.len(),
                });
            }
            // The sub-format GUID starts with the plain format tag.
            tag = read_u16(&body[24..26]);
        }

        let encoding = match tag {
            FORMAT_PCM => SampleEncoding::Pcm,
            FORMAT_IEEE_FLOAT => SampleEncoding::IeeeFloat,
            other => {
                return Err(DecodeError::UnsupportedFormat {
                    reason: format!("compression code 0x{:04X}", other),
                })
            }
        };

        if !(1..=2).contains(&channels) {
            return Err(DecodeError::UnsupportedFormat {
                reason: format!("{} channels", channels),
            });
        }
        if !matches!(bits_per_sample, 8 | 16 | 24 | 32) {
            return Err(DecodeError::UnsupportedFormat {
                reason: format!("{} bits per sample", bits_per_sample),
            });
        }
        if encoding == SampleEncoding::IeeeFloat && bits_per_sample != 32 {
            return Err(DecodeError::UnsupportedFormat {
                reason: format!("{}-bit float", bits_per_sample),
            });
        }
        if sample_rate == 0 {
            return Err(DecodeError::UnsupportedFormat {
                reason: "sample rate 0".to_string(),
            });
        }
        let expected_align = channels * (bits_per_sample / 8);
        if block_align != expected_align {
            return Err(DecodeError::UnsupportedFormat {
                reason: format!(
                    "block align {} (expected {})",
                    block_align, expected_align
                ),
            });
        }

        Ok(Self {
            encoding,
            channels,
            sample_rate,
            block_align,
            bits_per_sample,
        })
    }
}

/// Convert one little-endian sample word to a float in [-1.0, 1.0].
#[inline]
fn decode_sample(encoding: SampleEncoding, bits: u16, word: &[u8]) -> f32 {
    match (encoding, bits) {
        (SampleEncoding::Pcm, 8) => (f32::from(word[0]) - 128.0) / 128.0,
        (SampleEncoding::Pcm, 16) => f32::from(i16::from_le_bytes([word[0], word[1]])) / 32_768.0,
        (SampleEncoding::Pcm, 24) => {
            // Place the 24-bit word in the top of an i32 so the shift sign-extends.
            let raw = i32::from_le_bytes([0, word[0], word[1], word[2]]) >> 8;
            raw as f32 / 8_388_608.0
        }
        (SampleEncoding::Pcm, _) => {
            let raw = i32::from_le_bytes([word[0], word[1], word[2], word[3]]);
            (f64::from(raw) / 2_147_483_648.0) as f32
        }
        (SampleEncoding::IeeeFloat, _) => {
            let value = f32::from_le_bytes([word[0], word[1], word[2], word[3]]);
            if value.is_finite() {
                value.clamp(-1.0, 1.0)
            } else {
                0.0
            }
        }
    }
}

#[inline]
fn read_u16(bytes: &[u8]) -> u16 {
    u16::from_le_bytes([bytes[0], bytes[1]])
}

#[inline]
fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn chunk(id: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + body.len() + 1);
        out.extend_from_slice(id);
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(body);
        if body.len() % 2 == 1 {
            out.push(0);
        }
        out
    }

    fn fmt_body(tag: u16, channels: u16, rate: u32, bits: u16) -> Vec<u8> {
        let block_align = channels * (bits / 8);
        let mut body = Vec::new();
        body.extend_from_slice(&tag.to_le_bytes());
        body.extend_from_slice(&channels.to_le_bytes());
        body.extend_from_slice(&rate.to_le_bytes());
        body.extend_from_slice(&(rate * block_align as u32).to_le_bytes());
        body.extend_from_slice(&block_align.to_le_bytes());
        body.extend_from_slice(&bits.to_le_bytes());
        body
    }

    fn riff(chunks: &[Vec<u8>]) -> Vec<u8> {
        let body: Vec<u8> = chunks.concat();
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&((body.len() + 4) as u32).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(&body);
        out
    }

    fn hound_wav(spec: hound::WavSpec, samples: &[i32]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_parses_hound_pcm16_mono() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44_100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let bytes = hound_wav(spec, &[0, 16_384, -16_384, 32_767, -32_768]);

        let reader = WavReader::parse(&bytes).unwrap();
        assert_eq!(reader.channel_count(), 1);
        assert_eq!(reader.sample_rate(), 44_100);
        assert_eq!(reader.frame_count(), 5);
        assert_eq!(reader.format().encoding, SampleEncoding::Pcm);

        let samples: Vec<f32> = reader.samples().collect();
        assert_eq!(samples[0], 0.0);
        assert_eq!(samples[1], 0.5);
        assert_eq!(samples[2], -0.5);
        assert_eq!(samples[4], -1.0);
        assert!(samples[3] < 1.0 && samples[3] > 0.9999);
    }

    #[test]
    fn test_pcm16_requantize_within_one_lsb() {
        let originals: Vec<i32> = (i16::MIN as i32..=i16::MAX as i32).step_by(7).collect();
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 48_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut padded = originals.clone();
        if padded.len() % 2 == 1 {
            padded.push(0);
        }
        let bytes = hound_wav(spec, &padded);

        let reader = WavReader::parse(&bytes).unwrap();
        for (decoded, &original) in reader.samples().zip(padded.iter()) {
            let requantized = (decoded * 32_768.0).round() as i32;
            assert!(
                (requantized - original).abs() <= 1,
                "sample {} re-quantized to {}",
                original,
                requantized
            );
        }
    }

    #[test]
    fn test_rejects_bad_magic() {
        assert_eq!(WavReader::parse(b"not a wav file").unwrap_err(), DecodeError::BadMagic);
        assert_eq!(WavReader::parse(b"").unwrap_err(), DecodeError::BadMagic);

        let mut bytes = riff(&[chunk(b"fmt ", &fmt_body(1, 1, 8000, 16)), chunk(b"data", &[0, 0])]);
        bytes[8..12].copy_from_slice(b"AVI ");
        assert_eq!(WavReader::parse(&bytes).unwrap_err(), DecodeError::BadMagic);
    }

    #[test]
    fn test_short_riff_header_is_truncated() {
        let err = WavReader::parse(b"RIFF\x10\x00").unwrap_err();
        assert!(matches!(err, DecodeError::Truncated { needed: 12, available: 6 }));
    }

    #[test]
    fn test_rejects_oversized_chunk() {
        let mut bytes = riff(&[chunk(b"fmt ", &fmt_body(1, 1, 8000, 16))]);
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&1000u32.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 10]);

        let err = WavReader::parse(&bytes).unwrap_err();
        assert_eq!(
            err,
            DecodeError::Truncated {
                needed: 1000,
                available: 10
            }
        );
    }

    #[test]
    fn test_missing_data_chunk_is_truncated() {
        let bytes = riff(&[chunk(b"fmt ", &fmt_body(1, 1, 8000, 16))]);
        assert!(matches!(
            WavReader::parse(&bytes).unwrap_err(),
            DecodeError::Truncated { .. }
        ));
    }

    #[test]
    fn test_missing_fmt_chunk() {
        let bytes = riff(&[chunk(b"data", &[0, 0, 0, 0])]);
        assert_eq!(
            WavReader::parse(&bytes).unwrap_err(),
            DecodeError::MissingChunk { id: "fmt " }
        );
    }

    #[test]
    fn test_chunks_in_any_order_with_unknown_chunks_skipped() {
        let data: Vec<u8> = [1000i16, -1000].iter().flat_map(|s| s.to_le_bytes()).collect();
        let bytes = riff(&[
            chunk(b"LIST", b"odd"),
            chunk(b"data", &data),
            chunk(b"cue ", &[0u8; 24]),
            chunk(b"fmt ", &fmt_body(1, 1, 22_050, 16)),
        ]);

        let reader = WavReader::parse(&bytes).unwrap();
        assert_eq!(reader.sample_rate(), 22_050);
        assert_eq!(reader.frame_count(), 2);
        let samples: Vec<f32> = reader.samples().collect();
        assert!((samples[0] - 1000.0 / 32_768.0).abs() < 1e-7);
        assert!((samples[1] + 1000.0 / 32_768.0).abs() < 1e-7);
    }

    #[test]
    fn test_rejects_unsupported_compression() {
        let bytes = riff(&[chunk(b"fmt ", &fmt_body(2, 1, 8000, 16)), chunk(b"data", &[0, 0])]);
        match WavReader::parse(&bytes).unwrap_err() {
            DecodeError::UnsupportedFormat { reason } => assert!(reason.contains("0x0002")),
            other => panic!("Expected UnsupportedFormat, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_unsupported_layouts() {
        let three_channels = riff(&[
            chunk(b"fmt ", &fmt_body(1, 3, 8000, 16)),
            chunk(b"data", &[0u8; 6]),
        ]);
        assert!(matches!(
            WavReader::parse(&three_channels).unwrap_err(),
            DecodeError::UnsupportedFormat { .. }
        ));

        let twelve_bit = riff(&[
            chunk(b"fmt ", &fmt_body(1, 1, 8000, 12)),
            chunk(b"data", &[0u8; 2]),
        ]);
        assert!(matches!(
            WavReader::parse(&twelve_bit).unwrap_err(),
            DecodeError::UnsupportedFormat { .. }
        ));

        let float16 = riff(&[
            chunk(b"fmt ", &fmt_body(3, 1, 8000, 16)),
            chunk(b"data", &[0u8; 2]),
        ]);
        assert!(matches!(
            WavReader::parse(&float16).unwrap_err(),
            DecodeError::UnsupportedFormat { .. }
        ));
    }

    #[test]
    fn test_short_fmt_chunk_is_truncated() {
        let bytes = riff(&[chunk(b"fmt ", &[1, 0, 1, 0]), chunk(b"data", &[0, 0])]);
        assert_eq!(
            WavReader::parse(&bytes).unwrap_err(),
            DecodeError::Truncated {
                needed: 16,
                available: 4
            }
        );
    }

    #[test]
    fn test_decodes_8_bit_unsigned() {
        let bytes = riff(&[
            chunk(b"fmt ", &fmt_body(1, 1, 8000, 8)),
            chunk(b"data", &[0, 128, 192, 255]),
        ]);
        let samples: Vec<f32> = WavReader::parse(&bytes).unwrap().samples().collect();
        assert_eq!(samples, vec![-1.0, 0.0, 0.5, 127.0 / 128.0]);
    }

    #[test]
    fn test_decodes_24_bit_signed() {
        let data = [
            0x00, 0x00, 0x40, // +0.5
            0x00, 0x00, 0xC0, // -0.5
            0xFF, 0xFF, 0xFF, // -1 LSB
        ];
        let bytes = riff(&[chunk(b"fmt ", &fmt_body(1, 1, 8000, 24)), chunk(b"data", &data)]);
        let samples: Vec<f32> = WavReader::parse(&bytes).unwrap().samples().collect();
        assert_eq!(samples[0], 0.5);
        assert_eq!(samples[1], -0.5);
        assert!((samples[2] + 1.0 / 8_388_608.0).abs() < 1e-9);
    }

    #[test]
    fn test_decodes_32_bit_int_and_float() {
        let int_data: Vec<u8> = [i32::MIN, 1 << 30].iter().flat_map(|s| s.to_le_bytes()).collect();
        let bytes = riff(&[chunk(b"fmt ", &fmt_body(1, 1, 8000, 32)), chunk(b"data", &int_data)]);
        let samples: Vec<f32> = WavReader::parse(&bytes).unwrap().samples().collect();
        assert_eq!(samples, vec![-1.0, 0.5]);

        let float_data: Vec<u8> = [0.25f32, -2.0, f32::NAN]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let bytes = riff(&[chunk(b"fmt ", &fmt_body(3, 1, 8000, 32)), chunk(b"data", &float_data)]);
        let reader = WavReader::parse(&bytes).unwrap();
        assert_eq!(reader.format().encoding, SampleEncoding::IeeeFloat);
        let samples: Vec<f32> = reader.samples().collect();
        assert_eq!(samples, vec![0.25, -1.0, 0.0]);
    }

    #[test]
    fn test_resolves_extensible_subformat() {
        let mut body = fmt_body(FORMAT_EXTENSIBLE, 2, 48_000, 16);
        body.extend_from_slice(&22u16.to_le_bytes()); // cbSize
        body.extend_from_slice(&16u16.to_le_bytes()); // valid bits
        body.extend_from_slice(&3u32.to_le_bytes()); // channel mask
        body.extend_from_slice(&FORMAT_PCM.to_le_bytes());
        body.extend_from_slice(&[0u8; 14]);

        let bytes = riff(&[chunk(b"fmt ", &body), chunk(b"data", &[0u8; 8])]);
        let reader = WavReader::parse(&bytes).unwrap();
        assert_eq!(reader.channel_count(), 2);
        assert_eq!(reader.frame_count(), 2);
        assert_eq!(reader.format().encoding, SampleEncoding::Pcm);
    }

    #[test]
    fn test_ignores_trailing_partial_frame() {
        let bytes = riff(&[
            chunk(b"fmt ", &fmt_body(1, 2, 8000, 16)),
            chunk(b"data", &[0u8; 10]),
        ]);
        let reader = WavReader::parse(&bytes).unwrap();
        assert_eq!(reader.frame_count(), 2);
        assert_eq!(reader.samples().count(), 4);

        let mut out = Vec::new();
        reader.decode_into(&mut out);
        assert_eq!(out.len(), 4);
    }
}
