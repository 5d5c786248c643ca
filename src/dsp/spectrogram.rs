//! Spectrogram analysis built on a windowed real FFT.
//!
//! Each window of samples is tapered with a seven-term Blackman-Harris window,
//! transformed, and the magnitude spectrum is resampled onto a display axis
//! (linear or mel) between a minimum and maximum frequency.

use crate::util::audio::{DEFAULT_SAMPLE_RATE, hz_to_mel, lerp, mel_to_hz};
use parking_lot::{Mutex, RwLock};
use realfft::{RealFftPlanner, RealToComplex};
use rustc_hash::FxHashMap;
use rustfft::num_complex::Complex32;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

/// Seven-term Blackman-Harris coefficients; term `i` contributes
/// `coeff[i] * cos(2πin/N)`.
pub const BLACKMAN_HARRIS_COEFFICIENTS: [f32; 7] = [
    0.2711, -0.4333, 0.2181, -0.0659, 0.0108, -0.00078, 0.000_013_9,
];

pub const DEFAULT_WINDOW_SIZE: usize = 4096;
pub const DEFAULT_WINDOW_STEP_SIZE: usize = 1024;

/// Frequency axis used when resampling FFT magnitudes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrequencyScale {
    Linear,
    #[default]
    Mel,
}

impl FrequencyScale {
    pub const ALL: [FrequencyScale; 2] = [FrequencyScale::Linear, FrequencyScale::Mel];

    pub fn name(self) -> &'static str {
        match self {
            FrequencyScale::Linear => "linear",
            FrequencyScale::Mel => "mel",
        }
    }

    /// Map a frequency in Hz onto this scale.
    #[inline]
    pub fn from_hz(self, hz: f32) -> f32 {
        match self {
            FrequencyScale::Linear => hz,
            FrequencyScale::Mel => hz_to_mel(hz),
        }
    }

    /// Map a position on this scale back to Hz.
    #[inline]
    pub fn to_hz(self, value: f32) -> f32 {
        match self {
            FrequencyScale::Linear => value,
            FrequencyScale::Mel => mel_to_hz(value),
        }
    }

    /// Frequency at fraction `t` of the way from `min_hz` to `max_hz`,
    /// interpolated in this scale's space.
    #[inline]
    pub fn interpolate_hz(self, min_hz: f32, max_hz: f32, t: f32) -> f32 {
        match self {
            FrequencyScale::Linear => lerp(min_hz, max_hz, t),
            FrequencyScale::Mel => self.to_hz(lerp(self.from_hz(min_hz), self.from_hz(max_hz), t)),
        }
    }
}

impl fmt::Display for FrequencyScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FrequencyScale {
    type Err = AnalysisError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(FrequencyScale::Linear),
            "mel" => Ok(FrequencyScale::Mel),
            _ => Err(AnalysisError::UnsupportedScale(value.to_owned())),
        }
    }
}

/// Configuration error raised synchronously by the analyzer.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisError {
    InvalidWindowSize(usize),
    InvalidStepSize { window_size: usize, step_size: usize },
    InvalidScaleSize,
    InvalidSampleRate(f32),
    InvalidFrequencyRange { min_hz: f32, max_hz: f32 },
    UnsupportedScale(String),
    Transform(String),
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisError::InvalidWindowSize(size) => {
                write!(f, "window size {size} must be a non-zero even number")
            }
            AnalysisError::InvalidStepSize {
                window_size,
                step_size,
            } => write!(
                f,
                "window step size {step_size} must evenly divide window size {window_size}"
            ),
            AnalysisError::InvalidScaleSize => write!(f, "scale size must be greater than zero"),
            AnalysisError::InvalidSampleRate(rate) => {
                write!(f, "sample rate {rate} must be finite and positive")
            }
            AnalysisError::InvalidFrequencyRange { min_hz, max_hz } => {
                write!(f, "frequency range {min_hz}..{max_hz} Hz is empty or invalid")
            }
            AnalysisError::UnsupportedScale(name) => {
                write!(f, "unsupported frequency scale '{name}'")
            }
            AnalysisError::Transform(reason) => write!(f, "FFT failed: {reason}"),
        }
    }
}

impl std::error::Error for AnalysisError {}

/// Caller-supplied analysis options. Unset frequency bounds and scale size
/// are filled in by [`SpectrogramOptions::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrogramOptions {
    pub sample_rate: f32,
    pub window_size: usize,
    pub window_step_size: usize,
    pub scale: FrequencyScale,
    pub min_frequency_hz: Option<f32>,
    pub max_frequency_hz: Option<f32>,
    pub scale_size: Option<usize>,
    /// First request of a stream: extend the range backward with silence.
    pub is_start: bool,
    /// Last request of a stream: extend the range forward with silence.
    pub is_end: bool,
}

impl Default for SpectrogramOptions {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            window_size: DEFAULT_WINDOW_SIZE,
            window_step_size: DEFAULT_WINDOW_STEP_SIZE,
            scale: FrequencyScale::Linear,
            min_frequency_hz: None,
            max_frequency_hz: None,
            scale_size: None,
            is_start: false,
            is_end: false,
        }
    }
}

impl SpectrogramOptions {
    pub fn resolve(&self) -> Result<ResolvedOptions, AnalysisError> {
        let window_size = self.window_size;
        if window_size == 0 || window_size % 2 != 0 {
            return Err(AnalysisError::InvalidWindowSize(window_size));
        }

        let step_size = self.window_step_size;
        if step_size == 0 || window_size % step_size != 0 {
            return Err(AnalysisError::InvalidStepSize {
                window_size,
                step_size,
            });
        }

        let sample_rate = self.sample_rate;
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(AnalysisError::InvalidSampleRate(sample_rate));
        }

        let scale_size = self.scale_size.unwrap_or(window_size / 2);
        if scale_size == 0 {
            return Err(AnalysisError::InvalidScaleSize);
        }

        let min_hz = self.min_frequency_hz.unwrap_or(0.0);
        let max_hz = self
            .max_frequency_hz
            .unwrap_or_else(|| default_max_frequency(sample_rate, window_size));
        if !(min_hz.is_finite() && max_hz.is_finite()) || min_hz < 0.0 || min_hz >= max_hz {
            return Err(AnalysisError::InvalidFrequencyRange { min_hz, max_hz });
        }

        Ok(ResolvedOptions {
            sample_rate,
            window_size,
            window_step_size: step_size,
            scale: self.scale,
            min_frequency_hz: min_hz,
            max_frequency_hz: max_hz,
            scale_size,
        })
    }
}

/// Fully specified options echoed back with every analysis result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolvedOptions {
    pub sample_rate: f32,
    pub window_size: usize,
    pub window_step_size: usize,
    pub scale: FrequencyScale,
    pub min_frequency_hz: f32,
    pub max_frequency_hz: f32,
    pub scale_size: usize,
}

impl ResolvedOptions {
    #[inline]
    pub fn steps_per_window(&self) -> usize {
        self.window_size / self.window_step_size
    }
}

/// Highest frequency whose FFT index stays strictly below Nyquist:
/// `sample_rate * (window_size - 2) / (2 * window_size)`.
pub fn default_max_frequency(sample_rate: f32, window_size: usize) -> f32 {
    if window_size == 0 {
        return 0.0;
    }
    sample_rate * (window_size as f32 - 2.0) / (2.0 * window_size as f32)
}

/// Number of columns produced for `length` samples, including the extra
/// boundary columns requested by `is_start` / `is_end`.
pub fn window_count(
    length: usize,
    window_size: usize,
    step_size: usize,
    is_start: bool,
    is_end: bool,
) -> usize {
    if step_size == 0 {
        return 0;
    }
    let steps_per_window = (window_size / step_size) as i64;
    let base = length.div_ceil(step_size) as i64 - steps_per_window + 1;
    let boundary = (steps_per_window - 1) * (i64::from(is_start) + i64::from(is_end));
    (base + boundary).max(0) as usize
}

/// Columns computed by [`generate_spectrogram`], stored column-major.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrogramOutput {
    pub window_count: usize,
    pub resolved: ResolvedOptions,
    /// `window_count * resolved.scale_size` intensities.
    pub data: Vec<f32>,
}

impl SpectrogramOutput {
    pub fn column(&self, index: usize) -> Option<&[f32]> {
        let height = self.resolved.scale_size;
        self.data.get(index * height..(index + 1) * height)
    }
}

/// Analyse `samples[start..start + length]` into spectrogram columns.
///
/// Samples outside the requested range (or outside `samples`) read as zero.
pub fn generate_spectrogram(
    samples: &[f32],
    start: usize,
    length: usize,
    options: &SpectrogramOptions,
) -> Result<SpectrogramOutput, AnalysisError> {
    let resolved = options.resolve()?;
    let window_size = resolved.window_size;
    let step = resolved.window_step_size;
    let height = resolved.scale_size;

    let count = window_count(length, window_size, step, options.is_start, options.is_end);
    let mut data = vec![0.0; count * height];
    if count == 0 {
        return Ok(SpectrogramOutput {
            window_count: 0,
            resolved,
            data,
        });
    }

    let range_start = start as i64;
    let range_end = (start.saturating_add(length)).min(samples.len()) as i64;
    let lead_in = if options.is_start {
        ((resolved.steps_per_window() - 1) * step) as i64
    } else {
        0
    };
    let first_window = range_start - lead_in;

    let fft = PlanCache::global().forward(window_size);
    let window = WindowCache::global().blackman_harris(window_size);
    let bins = bin_map(&resolved);
    let normalization = 1.0 / (window_size as f32).sqrt();

    let mut input = fft.make_input_vec();
    let mut spectrum: Vec<Complex32> = fft.make_output_vec();
    let mut scratch = fft.make_scratch_vec();
    let mut magnitudes = vec![0.0f32; spectrum.len()];

    for (column_index, column) in data.chunks_exact_mut(height).enumerate() {
        let window_start = first_window + (column_index * step) as i64;

        for (offset, (slot, coeff)) in input.iter_mut().zip(window.iter()).enumerate() {
            let index = window_start + offset as i64;
            let sample = if index >= range_start && index < range_end {
                samples[index as usize]
            } else {
                0.0
            };
            *slot = sample * coeff;
        }

        fft.process_with_scratch(&mut input, &mut spectrum, &mut scratch)
            .map_err(|err| AnalysisError::Transform(err.to_string()))?;

        for (magnitude, value) in magnitudes.iter_mut().zip(&spectrum) {
            *magnitude = value.norm() * normalization;
        }

        for (target, bin) in column.iter_mut().zip(&bins) {
            *target = lerp(magnitudes[bin.lower], magnitudes[bin.upper], bin.fraction);
        }
    }

    Ok(SpectrogramOutput {
        window_count: count,
        resolved,
        data,
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct BinSample {
    lower: usize,
    upper: usize,
    fraction: f32,
}

fn bin_map(resolved: &ResolvedOptions) -> Vec<BinSample> {
    let last_bin = resolved.window_size / 2;
    let size = resolved.scale_size;
    let hz_to_index = resolved.window_size as f32 / resolved.sample_rate;

    (0..size)
        .map(|j| {
            let t = if size > 1 {
                j as f32 / (size - 1) as f32
            } else {
                0.0
            };
            let hz = resolved.scale.interpolate_hz(
                resolved.min_frequency_hz,
                resolved.max_frequency_hz,
                t,
            );
            let position = (hz * hz_to_index).clamp(0.0, last_bin as f32);
            let lower = position.floor() as usize;
            let upper = (position.ceil() as usize).min(last_bin);
            BinSample {
                lower,
                upper,
                fraction: position - lower as f32,
            }
        })
        .collect()
}

fn blackman_harris_coefficients(len: usize) -> Vec<f32> {
    let denom = len as f64;
    (0..len)
        .map(|n| {
            let phase = core::f64::consts::TAU * n as f64 / denom;
            BLACKMAN_HARRIS_COEFFICIENTS
                .iter()
                .enumerate()
                .map(|(i, &coeff)| f64::from(coeff) * (phase * i as f64).cos())
                .sum::<f64>() as f32
        })
        .collect()
}

struct WindowCache {
    entries: RwLock<FxHashMap<usize, Arc<[f32]>>>,
}

impl WindowCache {
    fn global() -> &'static WindowCache {
        static INSTANCE: OnceLock<WindowCache> = OnceLock::new();
        INSTANCE.get_or_init(|| WindowCache {
            entries: RwLock::new(FxHashMap::default()),
        })
    }

    fn blackman_harris(&self, len: usize) -> Arc<[f32]> {
        if let Some(existing) = self.entries.read().get(&len) {
            return Arc::clone(existing);
        }

        let mut write = self.entries.write();
        Arc::clone(
            write
                .entry(len)
                .or_insert_with(|| Arc::from(blackman_harris_coefficients(len))),
        )
    }
}

struct PlanCache {
    planner: Mutex<RealFftPlanner<f32>>,
}

impl PlanCache {
    fn global() -> &'static PlanCache {
        static INSTANCE: OnceLock<PlanCache> = OnceLock::new();
        INSTANCE.get_or_init(|| PlanCache {
            planner: Mutex::new(RealFftPlanner::new()),
        })
    }

    // The planner memoises plans internally; the lock only serialises lookups.
    fn forward(&self, len: usize) -> Arc<dyn RealToComplex<f32>> {
        self.planner.lock().plan_fft_forward(len)
    }
}
