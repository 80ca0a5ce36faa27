//! Sample-rate conversion and channel mixing.
//!
//! Used on both sides of the audio subsystem:
//!
//! * recording: [`stereo_to_mono`] then [`resample`] down to the upload rate;
//! * playback: [`resample`] the 24 kHz speech to the device rate, then
//!   [`mono_to_interleaved`] to fill every device channel.
//!
//! The resampler uses linear interpolation; speech prompts and short
//! utterances do not need anything better.

// ---------------------------------------------------------------------------
// stereo_to_mono
// ---------------------------------------------------------------------------

/// Mix interleaved multi-channel audio down to mono by averaging all channels.
///
/// * `channels == 1` returns the input unchanged.
/// * `channels == 0` returns an empty vector.
///
/// ```rust
/// use pov_kids::audio::stereo_to_mono;
///
/// let stereo = vec![0.5_f32, -0.5, 0.2, 0.4]; // L R L R
/// let mono = stereo_to_mono(&stereo, 2);
/// assert_eq!(mono.len(), 2);
/// assert!((mono[1] - 0.3).abs() < 1e-6);
/// ```
pub fn stereo_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

/// Duplicate each mono sample across `channels` interleaved slots.
pub fn mono_to_interleaved(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => samples
            .iter()
            .flat_map(|&s| std::iter::repeat(s).take(n as usize))
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// resample
// ---------------------------------------------------------------------------

/// Resample mono `samples` from `source_rate` Hz to `target_rate` Hz.
///
/// * Equal rates return the input unchanged.
/// * Empty input or a zero rate returns an empty vector.
///
/// The output length is `ceil(samples.len() * target_rate / source_rate)`.
///
/// ```rust
/// use pov_kids::audio::resample;
///
/// let hi = vec![0.5_f32; 480];
/// assert_eq!(resample(&hi, 48_000, 16_000).len(), 160);
/// assert_eq!(resample(&hi, 24_000, 48_000).len(), 960);
/// ```
pub fn resample(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate {
        return samples.to_vec();
    }

    if samples.is_empty() || source_rate == 0 || target_rate == 0 {
        return Vec::new();
    }

    let ratio = target_rate as f64 / source_rate as f64;
    let output_len = (samples.len() as f64 * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_pos = i as f64 / ratio;
        let idx = src_pos as usize;
        let frac = (src_pos - idx as f64) as f32;

        let sample = if idx + 1 < samples.len() {
            samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
        } else if idx < samples.len() {
            samples[idx]
        } else {
            0.0
        };

        output.push(sample);
    }

    output
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stereo_to_mono_already_mono() {
        let input = vec![0.1_f32, 0.2, 0.3];
        assert_eq!(stereo_to_mono(&input, 1), input);
    }

    #[test]
    fn stereo_to_mono_two_channel() {
        let out = stereo_to_mono(&[1.0_f32, -1.0, 0.5, 0.5], 2);
        assert_eq!(out.len(), 2);
        assert!((out[0] - 0.0).abs() < 1e-6);
        assert!((out[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn stereo_to_mono_zero_channels() {
        assert!(stereo_to_mono(&[1.0_f32, 2.0], 0).is_empty());
    }

    #[test]
    fn mono_to_interleaved_duplicates_samples() {
        assert_eq!(
            mono_to_interleaved(&[0.1, 0.2], 2),
            vec![0.1, 0.1, 0.2, 0.2]
        );
        assert_eq!(mono_to_interleaved(&[0.1], 1), vec![0.1]);
        assert!(mono_to_interleaved(&[0.1], 0).is_empty());
    }

    #[test]
    fn resample_same_rate_is_noop() {
        let input: Vec<f32> = (0..160).map(|i| i as f32 / 160.0).collect();
        assert_eq!(resample(&input, 16_000, 16_000), input);
    }

    #[test]
    fn resample_empty_or_zero_rate() {
        assert!(resample(&[], 48_000, 16_000).is_empty());
        assert!(resample(&[0.1], 0, 16_000).is_empty());
        assert!(resample(&[0.1], 16_000, 0).is_empty());
    }

    #[test]
    fn resample_48k_to_16k_output_length() {
        assert_eq!(resample(&vec![0.5_f32; 480], 48_000, 16_000).len(), 160);
    }

    #[test]
    fn resample_24k_to_44100_output_length() {
        let out = resample(&vec![0.0_f32; 24_000], 24_000, 44_100);
        assert!(out.len().abs_diff(44_100) <= 1, "got {}", out.len());
    }

    #[test]
    fn resample_constant_signal_preserves_amplitude() {
        for &s in &resample(&vec![0.5_f32; 480], 24_000, 48_000) {
            assert!((s - 0.5).abs() < 1e-5, "amplitude drift: {s}");
        }
    }
}
