/// Default sample rate (Hz) used throughout the pipeline.
pub const DEFAULT_SAMPLE_RATE: f32 = 48_000.0;

#[inline(always)]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Convert frequency in Hz to mel scale.
#[inline(always)]
pub fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

/// Convert mel scale to frequency in Hz.
#[inline(always)]
pub fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10.0f32.powf(mel / 2595.0) - 1.0)
}

/// Split an interleaved block into one buffer per channel.
///
/// A trailing partial frame is zero-filled so every channel ends up with the
/// same number of frames.
pub fn deinterleave(samples: &[f32], channels: usize) -> Vec<Vec<f32>> {
    let channels = channels.max(1);
    if channels == 1 {
        return vec![samples.to_vec()];
    }

    let frames = samples.len().div_ceil(channels);
    let mut output: Vec<Vec<f32>> = (0..channels).map(|_| Vec::with_capacity(frames)).collect();

    for frame in samples.chunks(channels) {
        for (channel, buffer) in output.iter_mut().enumerate() {
            buffer.push(frame.get(channel).copied().unwrap_or(0.0));
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mel_conversion_round_trips() {
        for hz in [0.0_f32, 440.0, 1_000.0, 12_000.0] {
            let back = mel_to_hz(hz_to_mel(hz));
            assert!((back - hz).abs() < 0.05, "{hz} came back as {back}");
        }
        assert!((hz_to_mel(1_000.0) - 999.99).abs() < 0.1);
    }

    #[test]
    fn deinterleave_splits_frames_and_pads_tail() {
        let channels = deinterleave(&[1.0, -1.0, 2.0, -2.0, 3.0], 2);
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0], vec![1.0, 2.0, 3.0]);
        assert_eq!(channels[1], vec![-1.0, -2.0, 0.0]);
    }

    #[test]
    fn deinterleave_mono_is_a_copy() {
        let channels = deinterleave(&[0.25, 0.5], 1);
        assert_eq!(channels, vec![vec![0.25, 0.5]]);
    }
}
