use crate::dsp::FrequencyScale;
use crate::util::audio::DEFAULT_SAMPLE_RATE;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_CONTRAST: f32 = 25.0;
pub const DEFAULT_SENSITIVITY: f32 = 25.0;
pub const DEFAULT_ZOOM: f32 = 4.0;
pub const DEFAULT_MIN_FREQUENCY_HZ: f32 = 10.0;
pub const DEFAULT_MAX_FREQUENCY_HZ: f32 = 12_000.0;
pub const DEFAULT_RENDER_WINDOW_SIZE: usize = 4096;

const SMOOTHING_FACTOR: f64 = 0.5;
const SNAP_EPSILON: f64 = 1e-9;

/// Built-in colour ramps, evenly spaced RGBA stops from silence to peak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GradientPreset {
    #[default]
    HeatedMetal,
    Monochrome,
    Ice,
}

const HEATED_METAL_STOPS: [[f32; 4]; 5] = [
    [0.000, 0.000, 0.000, 1.0],
    [0.218, 0.106, 0.332, 1.0],
    [0.609, 0.000, 0.000, 1.0],
    [1.000, 0.737, 0.353, 1.0],
    [1.000, 1.000, 1.000, 1.0],
];

const MONOCHROME_STOPS: [[f32; 4]; 2] = [[0.0, 0.0, 0.0, 1.0], [1.0, 1.0, 1.0, 1.0]];

const ICE_STOPS: [[f32; 4]; 5] = [
    [0.000, 0.000, 0.000, 1.0],
    [0.043, 0.086, 0.302, 1.0],
    [0.090, 0.420, 0.710, 1.0],
    [0.620, 0.890, 0.980, 1.0],
    [1.000, 1.000, 1.000, 1.0],
];

impl GradientPreset {
    pub const ALL: [GradientPreset; 3] = [
        GradientPreset::HeatedMetal,
        GradientPreset::Monochrome,
        GradientPreset::Ice,
    ];

    pub fn name(self) -> &'static str {
        match self {
            GradientPreset::HeatedMetal => "heated-metal",
            GradientPreset::Monochrome => "monochrome",
            GradientPreset::Ice => "ice",
        }
    }

    pub fn stops(self) -> &'static [[f32; 4]] {
        match self {
            GradientPreset::HeatedMetal => &HEATED_METAL_STOPS,
            GradientPreset::Monochrome => &MONOCHROME_STOPS,
            GradientPreset::Ice => &ICE_STOPS,
        }
    }
}

impl fmt::Display for GradientPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Snapshot of everything that controls how the column history is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderParameters {
    pub contrast: f32,
    pub sensitivity: f32,
    /// Screen pixels per column.
    pub zoom: f32,
    pub min_frequency_hz: f32,
    pub max_frequency_hz: f32,
    pub sample_rate: f32,
    pub window_size: usize,
    pub scale: FrequencyScale,
    pub gradient: GradientPreset,
}

impl Default for RenderParameters {
    fn default() -> Self {
        Self {
            contrast: DEFAULT_CONTRAST,
            sensitivity: DEFAULT_SENSITIVITY,
            zoom: DEFAULT_ZOOM,
            min_frequency_hz: DEFAULT_MIN_FREQUENCY_HZ,
            max_frequency_hz: DEFAULT_MAX_FREQUENCY_HZ,
            sample_rate: DEFAULT_SAMPLE_RATE,
            window_size: DEFAULT_RENDER_WINDOW_SIZE,
            scale: FrequencyScale::Mel,
            gradient: GradientPreset::HeatedMetal,
        }
    }
}

impl RenderParameters {
    /// New snapshot with every field set in `patch` replaced.
    #[must_use]
    pub fn apply(&self, patch: &ParameterPatch) -> Self {
        Self {
            contrast: patch.contrast.unwrap_or(self.contrast),
            sensitivity: patch.sensitivity.unwrap_or(self.sensitivity),
            zoom: patch.zoom.unwrap_or(self.zoom),
            min_frequency_hz: patch.min_frequency_hz.unwrap_or(self.min_frequency_hz),
            max_frequency_hz: patch.max_frequency_hz.unwrap_or(self.max_frequency_hz),
            sample_rate: patch.sample_rate.unwrap_or(self.sample_rate),
            window_size: patch.window_size.unwrap_or(self.window_size),
            scale: patch.scale.unwrap_or(self.scale),
            gradient: patch.gradient.unwrap_or(self.gradient),
        }
    }

    /// Whether the row axis of analysed columns differs.
    pub fn axis_differs(&self, other: &Self) -> bool {
        self.scale != other.scale
            || self.sample_rate != other.sample_rate
            || self.window_size != other.window_size
    }

    /// Whether the frequency lookup or displayed range needs rebuilding.
    pub fn frequency_view_differs(&self, other: &Self) -> bool {
        self.axis_differs(other)
            || self.min_frequency_hz != other.min_frequency_hz
            || self.max_frequency_hz != other.max_frequency_hz
    }
}

/// Partial update of [`RenderParameters`]; unset fields keep their value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contrast: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensitivity: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zoom: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_frequency_hz: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_frequency_hz: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<FrequencyScale>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gradient: Option<GradientPreset>,
}

impl ParameterPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Value that glides halfway towards its target on every frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Smoothed {
    current: f64,
    target: f64,
}

impl Smoothed {
    pub fn new(value: f64) -> Self {
        Self {
            current: value,
            target: value,
        }
    }

    #[inline]
    pub fn current(&self) -> f64 {
        self.current
    }

    #[inline]
    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn set_target(&mut self, target: f64) {
        self.target = target;
    }

    /// Jump straight to `value`.
    pub fn snap(&mut self, value: f64) {
        self.current = value;
        self.target = value;
    }

    pub fn is_settled(&self) -> bool {
        self.current == self.target
    }

    pub fn step(&mut self) -> f64 {
        let next = self.current + (self.target - self.current) * SMOOTHING_FACTOR;
        self.current = if (self.target - next).abs() < SNAP_EPSILON {
            self.target
        } else {
            next
        };
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let params = RenderParameters::default();
        assert_eq!(params.contrast, 25.0);
        assert_eq!(params.sensitivity, 25.0);
        assert_eq!(params.zoom, 4.0);
        assert_eq!(params.min_frequency_hz, 10.0);
        assert_eq!(params.max_frequency_hz, 12_000.0);
        assert_eq!(params.sample_rate, 48_000.0);
        assert_eq!(params.window_size, 4096);
        assert_eq!(params.scale, FrequencyScale::Mel);
        assert_eq!(params.gradient, GradientPreset::HeatedMetal);
    }

    #[test]
    fn apply_replaces_only_set_fields() {
        let base = RenderParameters::default();
        let patch = ParameterPatch {
            contrast: Some(10.0),
            scale: Some(FrequencyScale::Linear),
            ..ParameterPatch::default()
        };

        let next = base.apply(&patch);
        assert_eq!(next.contrast, 10.0);
        assert_eq!(next.scale, FrequencyScale::Linear);
        assert_eq!(next.sensitivity, base.sensitivity);
        assert_eq!(next.gradient, base.gradient);
        assert!(next.axis_differs(&base));

        assert_eq!(next.apply(&ParameterPatch::default()), next);
        assert!(ParameterPatch::default().is_empty());
    }

    #[test]
    fn frequency_bounds_do_not_count_as_axis_changes() {
        let base = RenderParameters::default();
        let next = base.apply(&ParameterPatch {
            max_frequency_hz: Some(8_000.0),
            ..ParameterPatch::default()
        });
        assert!(!next.axis_differs(&base));
        assert!(next.frequency_view_differs(&base));
    }

    #[test]
    fn patch_deserialises_from_partial_json() {
        let patch: ParameterPatch =
            serde_json::from_str(r#"{"zoom": 2.0, "gradient": "ice", "scale": "linear"}"#)
                .expect("valid patch");
        assert_eq!(patch.zoom, Some(2.0));
        assert_eq!(patch.gradient, Some(GradientPreset::Ice));
        assert_eq!(patch.scale, Some(FrequencyScale::Linear));
        assert_eq!(patch.contrast, None);

        let json = serde_json::to_string(&patch).expect("serialise");
        assert!(!json.contains("contrast"));
    }

    #[test]
    fn smoothing_halves_the_distance_and_snaps() {
        let mut value = Smoothed::new(0.0);
        value.set_target(1.0);
        assert_eq!(value.target(), 1.0);
        assert_eq!(value.step(), 0.5);
        assert_eq!(value.step(), 0.75);

        for _ in 0..64 {
            value.step();
        }
        assert!(value.is_settled());
        assert_eq!(value.current(), 1.0);
    }

    #[test]
    fn smoothing_is_idempotent_at_rest() {
        let mut value = Smoothed::new(3.25);
        assert_eq!(value.step(), 3.25);
        assert_eq!(value.step(), 3.25);
        assert!(value.is_settled());

        value.set_target(4.0);
        value.snap(2.0);
        assert_eq!(value.target(), 2.0);
        assert_eq!(value.step(), 2.0);
    }

    #[test]
    fn gradient_names_match_their_serialised_form() {
        for preset in GradientPreset::ALL {
            let json = serde_json::to_string(&preset).expect("serialise");
            assert_eq!(json, format!("\"{preset}\""));
            assert_eq!(preset.stops().first(), Some(&[0.0, 0.0, 0.0, 1.0]));
        }
    }
}
