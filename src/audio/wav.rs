//! Recorded utterances and their WAV encoding.

use std::io::Cursor;

use super::codec::{encode_base64, quantize, CodecError};

/// MIME type submitted alongside an encoded utterance.
pub const WAV_MIME: &str = "audio/wav";

/// A finished recording: mono samples at a fixed rate.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

impl Utterance {
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }

    /// 16-bit mono PCM WAV bytes.
    pub fn to_wav(&self) -> Result<Vec<u8>, CodecError> {
        if self.sample_rate == 0 {
            return Err(CodecError::InvalidFormat("sample rate must be > 0".into()));
        }

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut out = Cursor::new(Vec::new());
        {
            let mut writer =
                hound::WavWriter::new(&mut out, spec).map_err(|e| CodecError::Wav(e.to_string()))?;
            for &s in &self.samples {
                writer
                    .write_sample(quantize(s))
                    .map_err(|e| CodecError::Wav(e.to_string()))?;
            }
            writer.finalize().map_err(|e| CodecError::Wav(e.to_string()))?;
        }
        Ok(out.into_inner())
    }

    /// WAV bytes as base64, ready for the evaluation request.
    pub fn to_base64(&self) -> Result<String, CodecError> {
        Ok(encode_base64(&self.to_wav()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::codec::decode_base64;

    #[test]
    fn wav_header_and_samples() {
        let utterance = Utterance {
            sample_rate: 16_000,
            samples: vec![0.0, 0.5, -0.5, 1.0],
        };
        let bytes = utterance.to_wav().unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");

        let mut reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 16_000);
        assert_eq!(spec.bits_per_sample, 16);

        let samples: Vec<i16> = reader.samples::<i16>().map(Result::unwrap).collect();
        assert_eq!(samples, vec![0, 16_384, -16_384, i16::MAX]);
    }

    #[test]
    fn base64_decodes_back_to_wav() {
        let utterance = Utterance {
            sample_rate: 16_000,
            samples: vec![0.1; 1_600],
        };
        let encoded = utterance.to_base64().unwrap();
        let bytes = decode_base64(&encoded).unwrap();
        assert_eq!(bytes, utterance.to_wav().unwrap());
        assert!((utterance.duration_secs() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn zero_rate_is_rejected() {
        let utterance = Utterance {
            sample_rate: 0,
            samples: vec![0.0],
        };
        assert!(matches!(utterance.to_wav(), Err(CodecError::InvalidFormat(_))));
    }
}
