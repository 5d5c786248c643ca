//! Utility functions and types shared across the pipeline.

pub mod audio;
pub mod telemetry;

pub use audio::{hz_to_mel, lerp, mel_to_hz};
