//! Streaming spectrogram: capture chunks are analysed on a worker pool into
//! frequency columns, kept in a rolling per-channel history and mirrored into
//! a GPU texture that is redrawn with smoothed render parameters.

pub mod config;
pub mod dsp;
pub mod pipeline;
pub mod render;
pub mod util;
pub mod worker;
