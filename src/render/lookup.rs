//! Lookup images consumed by the spectrogram shader.

use super::params::RenderParameters;
use crate::dsp::FrequencyScale;
use crate::dsp::spectrogram::default_max_frequency;

pub const PALETTE_LUT_SIZE: u32 = 256;
pub const FREQUENCY_LUT_SIZE: u32 = 1024;

/// Expand evenly spaced colour stops into `PALETTE_LUT_SIZE` RGBA8 texels.
pub fn palette_lut(stops: &[[f32; 4]]) -> Vec<u8> {
    let mut data = vec![0u8; PALETTE_LUT_SIZE as usize * 4];
    let Some(&last) = stops.last() else {
        return data;
    };

    let max_index = (PALETTE_LUT_SIZE - 1) as f32;
    let segments = stops.len().saturating_sub(1) as f32;

    for (i, chunk) in data.chunks_exact_mut(4).enumerate() {
        let scaled = i as f32 / max_index * segments;
        let index = (scaled.floor() as usize).min(stops.len() - 1);
        let next = (index + 1).min(stops.len() - 1);
        let frac = scaled - index as f32;
        let (from, to) = if segments == 0.0 {
            (last, last)
        } else {
            (stops[index], stops[next])
        };

        for (channel, byte) in chunk.iter_mut().enumerate() {
            let value = from[channel] + (to[channel] - from[channel]) * frac;
            *byte = (value.clamp(0.0, 1.0) * 255.0).round() as u8;
        }
    }

    data
}

/// Highest frequency stored in an analysed column for these parameters.
pub fn full_range_hz(params: &RenderParameters) -> f32 {
    default_max_frequency(params.sample_rate, params.window_size)
}

/// Row lookup for columns analysed on a linear axis from 0 Hz to
/// [`full_range_hz`]: entry `i` holds the row fraction of the frequency found
/// `i / (FREQUENCY_LUT_SIZE - 1)` of the way along `scale`.
pub fn frequency_lut(scale: FrequencyScale, full_range_hz: f32) -> Vec<f32> {
    let max_index = (FREQUENCY_LUT_SIZE - 1) as f32;
    if full_range_hz <= 0.0 || !full_range_hz.is_finite() {
        return (0..FREQUENCY_LUT_SIZE).map(|i| i as f32 / max_index).collect();
    }

    (0..FREQUENCY_LUT_SIZE)
        .map(|i| {
            let hz = scale.interpolate_hz(0.0, full_range_hz, i as f32 / max_index);
            (hz / full_range_hz).clamp(0.0, 1.0)
        })
        .collect()
}

/// Displayed `[min, max]` frequencies as fractions of the full scale axis.
pub fn scale_range(params: &RenderParameters) -> (f64, f64) {
    let scale = params.scale;
    let low = f64::from(scale.from_hz(0.0));
    let high = f64::from(scale.from_hz(full_range_hz(params)));
    let span = high - low;
    if !(span > 0.0) {
        return (0.0, 1.0);
    }

    let normalise = |hz: f32| {
        let position = f64::from(scale.from_hz(hz.max(0.0)));
        ((position - low) / span).clamp(0.0, 1.0)
    };
    (
        normalise(params.min_frequency_hz),
        normalise(params.max_frequency_hz),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::params::GradientPreset;

    #[test]
    fn palette_endpoints_match_first_and_last_stop() {
        let lut = palette_lut(GradientPreset::HeatedMetal.stops());
        assert_eq!(lut.len(), 256 * 4);
        assert_eq!(&lut[..4], &[0, 0, 0, 255]);
        assert_eq!(&lut[lut.len() - 4..], &[255, 255, 255, 255]);
    }

    #[test]
    fn monochrome_palette_is_a_grey_ramp() {
        let lut = palette_lut(GradientPreset::Monochrome.stops());
        for texel in lut.chunks_exact(4) {
            assert_eq!(texel[0], texel[1]);
            assert_eq!(texel[1], texel[2]);
        }
        assert!(lut.chunks_exact(4).zip(lut.chunks_exact(4).skip(1)).all(|(a, b)| a[0] <= b[0]));
    }

    #[test]
    fn linear_lookup_is_identity() {
        let lut = frequency_lut(FrequencyScale::Linear, 20_000.0);
        assert_eq!(lut.len(), FREQUENCY_LUT_SIZE as usize);
        for (i, value) in lut.iter().enumerate() {
            let expected = i as f32 / (FREQUENCY_LUT_SIZE - 1) as f32;
            assert!((value - expected).abs() < 1e-4, "entry {i}: {value}");
        }
    }

    #[test]
    fn mel_lookup_spends_more_rows_on_low_frequencies() {
        let lut = frequency_lut(FrequencyScale::Mel, 24_000.0);
        assert!(lut[0].abs() < 1e-6);
        assert!((lut[lut.len() - 1] - 1.0).abs() < 1e-4);
        assert!(lut.windows(2).all(|pair| pair[1] >= pair[0]));
        assert!(lut[lut.len() / 2] < 0.5);
    }

    #[test]
    fn scale_range_normalises_display_bounds() {
        let params = RenderParameters {
            scale: FrequencyScale::Linear,
            sample_rate: 48_000.0,
            window_size: 4096,
            min_frequency_hz: 0.0,
            max_frequency_hz: full_range_hz(&RenderParameters::default()) / 2.0,
            ..RenderParameters::default()
        };
        let (min, max) = scale_range(&params);
        assert!(min.abs() < 1e-9);
        assert!((max - 0.5).abs() < 1e-6);

        let beyond = RenderParameters {
            max_frequency_hz: 96_000.0,
            ..params
        };
        assert_eq!(scale_range(&beyond).1, 1.0);
    }
}
