//! Streaming spectrogram renderer.
//!
//! Only columns written since the previous update are uploaded; render
//! parameters glide towards their targets across frames.

pub mod lookup;
pub mod params;
pub mod spectrogram;
pub mod view;

use std::fmt;

pub use params::{GradientPreset, ParameterPatch, RenderParameters};
pub use spectrogram::StreamingRenderer;
pub use view::{ColumnSink, CpuMirror, RendererState, SpectrogramView, UploadPlan};

/// Failure to acquire or build GPU resources.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderError {
    NoAdapter,
    RequestDevice(String),
    Validation(String),
    TextureTooLarge {
        width: usize,
        height: usize,
        limit: u32,
    },
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::NoAdapter => write!(f, "no compatible GPU adapter found"),
            RenderError::RequestDevice(reason) => write!(f, "failed to open GPU device: {reason}"),
            RenderError::Validation(reason) => write!(f, "GPU validation failed: {reason}"),
            RenderError::TextureTooLarge {
                width,
                height,
                limit,
            } => write!(
                f,
                "column buffer {width}x{height} exceeds the texture limit of {limit}"
            ),
        }
    }
}

impl std::error::Error for RenderError {}
