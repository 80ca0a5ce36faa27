//! Audio transport conversions.
//!
//! Two independent steps, composed by the session when speech arrives:
//!
//! 1. [`decode_base64`]: base64 text (standard alphabet) → raw bytes.
//! 2. [`decode_pcm16`]: little-endian signed 16-bit PCM → [`AudioBuffer`]
//!    with samples normalised to `[-1.0, 1.0]` (`i16 / 32768`).
//!
//! [`encode_pcm16`] and [`quantize`] are the inverse of step 2 and are exact
//! for every in-range sample.
//!
//! ```rust
//! use pov_kids::audio::{decode_base64, decode_pcm16, encode_pcm16};
//!
//! let bytes = encode_pcm16(&[0, 16_384, -32_768]);
//! let buffer = decode_pcm16(&bytes, 24_000, 1).unwrap();
//! assert_eq!(buffer.samples, vec![0.0, 0.5, -1.0]);
//!
//! assert!(decode_base64("not base64!").is_err());
//! ```

use base64::Engine;
use thiserror::Error;

/// Divisor mapping `i16` onto `[-1.0, 1.0)`.
const PCM16_SCALE: f32 = 32_768.0;

// ---------------------------------------------------------------------------
// CodecError
// ---------------------------------------------------------------------------

/// Reasons a byte sequence could not be turned into playable audio.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CodecError {
    #[error("invalid base64 audio payload: {0}")]
    Base64(String),

    /// PCM16 needs two bytes per sample; a trailing byte is never dropped.
    #[error("PCM16 payload has odd length {len}")]
    OddLength { len: usize },

    /// Sample count is not a whole number of frames.
    #[error("{samples} samples do not divide into {channels}-channel frames")]
    PartialFrame { samples: usize, channels: u16 },

    #[error("invalid audio format: {0}")]
    InvalidFormat(String),

    #[error("WAV encoding failed: {0}")]
    Wav(String),
}

// ---------------------------------------------------------------------------
// AudioBuffer
// ---------------------------------------------------------------------------

/// Decoded, playable audio.
///
/// Samples are interleaved `f32` in `[-1.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<f32>,
}

impl AudioBuffer {
    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    /// Playback length in seconds.
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f32 / self.sample_rate as f32
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

// ---------------------------------------------------------------------------
// base64
// ---------------------------------------------------------------------------

/// Decode standard-alphabet base64 text into bytes.
pub fn decode_base64(text: &str) -> Result<Vec<u8>, CodecError> {
    base64::engine::general_purpose::STANDARD
        .decode(text.trim())
        .map_err(|e| CodecError::Base64(e.to_string()))
}

/// Encode bytes as standard-alphabet base64 text.
pub fn encode_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

// ---------------------------------------------------------------------------
// PCM16
// ---------------------------------------------------------------------------

/// Interpret `bytes` as little-endian `i16` samples and normalise them.
///
/// # Errors
///
/// * [`CodecError::InvalidFormat`]: zero sample rate or channel count.
/// * [`CodecError::OddLength`]: `bytes.len()` is not a multiple of 2.
/// * [`CodecError::PartialFrame`]: the sample count is not a multiple of
///   `channels`.
pub fn decode_pcm16(bytes: &[u8], sample_rate: u32, channels: u16) -> Result<AudioBuffer, CodecError> {
    if sample_rate == 0 {
        return Err(CodecError::InvalidFormat("sample rate must be > 0".into()));
    }
    if channels == 0 {
        return Err(CodecError::InvalidFormat("channel count must be > 0".into()));
    }
    if bytes.len() % 2 != 0 {
        return Err(CodecError::OddLength { len: bytes.len() });
    }

    let sample_count = bytes.len() / 2;
    if sample_count % channels as usize != 0 {
        return Err(CodecError::PartialFrame {
            samples: sample_count,
            channels,
        });
    }

    let samples = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / PCM16_SCALE)
        .collect();

    Ok(AudioBuffer {
        sample_rate,
        channels,
        samples,
    })
}

/// Serialise `i16` samples as little-endian bytes.
pub fn encode_pcm16(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Map a normalised amplitude back onto `i16`, clamping out-of-range input.
pub fn quantize(sample: f32) -> i16 {
    let scaled = (sample * PCM16_SCALE).round();
    scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Base64 speech payload → playable buffer in one call.
pub fn decode_speech(base64_pcm: &str, sample_rate: u32, channels: u16) -> Result<AudioBuffer, CodecError> {
    let bytes = decode_base64(base64_pcm)?;
    decode_pcm16(&bytes, sample_rate, channels)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_is_exact_for_every_i16() {
        let all: Vec<i16> = (i16::MIN..=i16::MAX).collect();
        let buffer = decode_pcm16(&encode_pcm16(&all), 24_000, 1).unwrap();
        let back: Vec<i16> = buffer.samples.iter().map(|&s| quantize(s)).collect();
        assert_eq!(back, all);
    }

    #[test]
    fn samples_are_normalised() {
        let buffer = decode_pcm16(&encode_pcm16(&[i16::MIN, 0, i16::MAX]), 24_000, 1).unwrap();
        assert_eq!(buffer.samples[0], -1.0);
        assert_eq!(buffer.samples[1], 0.0);
        assert!(buffer.samples[2] < 1.0 && buffer.samples[2] > 0.9999);
    }

    #[test]
    fn little_endian_byte_order() {
        // 0x0100 little-endian = [0x00, 0x01] = 256
        let buffer = decode_pcm16(&[0x00, 0x01], 24_000, 1).unwrap();
        assert_eq!(quantize(buffer.samples[0]), 256);
    }

    #[test]
    fn odd_length_fails_without_truncating() {
        for len in [1usize, 3, 5, 4_801] {
            let bytes = vec![0u8; len];
            assert_eq!(
                decode_pcm16(&bytes, 24_000, 1).unwrap_err(),
                CodecError::OddLength { len }
            );
        }
    }

    #[test]
    fn partial_stereo_frame_fails() {
        let bytes = encode_pcm16(&[1, 2, 3]);
        assert_eq!(
            decode_pcm16(&bytes, 24_000, 2).unwrap_err(),
            CodecError::PartialFrame {
                samples: 3,
                channels: 2
            }
        );
    }

    #[test]
    fn zero_channels_or_rate_rejected() {
        assert!(matches!(
            decode_pcm16(&[0, 0], 24_000, 0),
            Err(CodecError::InvalidFormat(_))
        ));
        assert!(matches!(
            decode_pcm16(&[0, 0], 0, 1),
            Err(CodecError::InvalidFormat(_))
        ));
    }

    #[test]
    fn empty_payload_is_an_empty_buffer() {
        let buffer = decode_pcm16(&[], 24_000, 1).unwrap();
        assert!(buffer.is_empty());
        assert_eq!(buffer.duration_secs(), 0.0);
    }

    #[test]
    fn metadata_and_duration() {
        let buffer = decode_pcm16(&encode_pcm16(&vec![0; 48_000]), 24_000, 2).unwrap();
        assert_eq!(buffer.sample_rate, 24_000);
        assert_eq!(buffer.channels, 2);
        assert_eq!(buffer.frames(), 24_000);
        assert!((buffer.duration_secs() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn quantize_clamps_out_of_range() {
        assert_eq!(quantize(2.0), i16::MAX);
        assert_eq!(quantize(-2.0), i16::MIN);
    }

    #[test]
    fn base64_round_trip_and_malformed_input() {
        let bytes = vec![0u8, 1, 2, 254, 255];
        assert_eq!(decode_base64(&encode_base64(&bytes)).unwrap(), bytes);
        assert!(matches!(decode_base64("@@@"), Err(CodecError::Base64(_))));
    }

    #[test]
    fn decode_speech_composes_both_steps() {
        let payload = encode_base64(&encode_pcm16(&[16_384, -16_384]));
        let buffer = decode_speech(&payload, 24_000, 1).unwrap();
        assert_eq!(buffer.samples, vec![0.5, -0.5]);

        let odd = encode_base64(&[1, 2, 3]);
        assert_eq!(
            decode_speech(&odd, 24_000, 1).unwrap_err(),
            CodecError::OddLength { len: 3 }
        );
    }
}
