//! Signal processing: spectral analysis and the rolling column history.
//!
//! Both halves are plain data transformations with no threading or GPU
//! concerns; the worker pool and renderer build on top of them.

pub mod column_buffer;
pub mod spectrogram;

pub use column_buffer::{BufferError, CircularColumnBuffer};
pub use spectrogram::{
    AnalysisError, FrequencyScale, ResolvedOptions, SpectrogramOptions, SpectrogramOutput,
    generate_spectrogram,
};
