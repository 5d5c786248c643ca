//! Per-channel orchestration from capture chunks to the column history.
//!
//! A [`ChannelFeeder`] turns arbitrary capture chunks into contiguous
//! [`SampleTick`]s; a [`ChannelPipeline`] sends each tick to the worker pool
//! and appends the resulting columns to the channel's
//! [`CircularColumnBuffer`], strictly in submission order.

use crate::dsp::spectrogram::{DEFAULT_WINDOW_SIZE, DEFAULT_WINDOW_STEP_SIZE};
use crate::dsp::{CircularColumnBuffer, FrequencyScale, SpectrogramOptions};
use crate::util::audio::DEFAULT_SAMPLE_RATE;
use crate::worker::{SpectrogramPool, WorkerRequest};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::mem;
use std::sync::Arc;
use tracing::{debug, info};

pub const DEFAULT_HISTORY_COLUMNS: usize = 2048;
const MAX_RECYCLED_BUFFERS: usize = 4;

/// Analysis shape shared by every channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    pub window_size: usize,
    pub window_step_size: usize,
    /// Columns kept in each channel's history.
    pub history_columns: usize,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            window_step_size: DEFAULT_WINDOW_STEP_SIZE,
            history_columns: DEFAULT_HISTORY_COLUMNS,
        }
    }
}

impl AnalysisSettings {
    /// Full-range linear options; the renderer remaps rows onto the display
    /// scale.
    pub fn options(&self, sample_rate: f32, is_start: bool) -> SpectrogramOptions {
        SpectrogramOptions {
            sample_rate,
            window_size: self.window_size,
            window_step_size: self.window_step_size,
            scale: FrequencyScale::Linear,
            is_start,
            ..SpectrogramOptions::default()
        }
    }

    pub fn column_height(&self) -> usize {
        self.window_size / 2
    }
}

/// One analysis request worth of samples for a single channel.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleTick {
    pub sample_buffer: Vec<f32>,
    pub start: usize,
    pub length: usize,
    pub sample_rate: f32,
    /// First tick of a stream; columns fade in from silence.
    pub is_start: bool,
}

/// Accumulates capture chunks and emits ticks covering whole windows.
///
/// Each tick spans `window_size + k * step` samples; the samples needed by the
/// next window are carried over so consecutive ticks produce a gapless run
/// of columns.
#[derive(Debug)]
pub struct ChannelFeeder {
    window_size: usize,
    step: usize,
    sample_rate: f32,
    pending: Vec<f32>,
    started: bool,
    recycle: Vec<Vec<f32>>,
}

impl ChannelFeeder {
    pub fn new(settings: &AnalysisSettings) -> Self {
        Self {
            window_size: settings.window_size.max(1),
            step: settings.window_step_size.max(1),
            sample_rate: DEFAULT_SAMPLE_RATE,
            pending: Vec::new(),
            started: false,
            recycle: Vec::new(),
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Append `chunk` and return a tick once at least one window is available.
    pub fn push(&mut self, chunk: &[f32], sample_rate: f32) -> Option<SampleTick> {
        if sample_rate != self.sample_rate {
            if self.started {
                debug!(
                    "[pipeline] sample rate changed {} -> {sample_rate}; restarting stream",
                    self.sample_rate
                );
            }
            self.sample_rate = sample_rate;
            self.reset();
        }

        self.pending.extend_from_slice(chunk);
        if self.pending.len() < self.window_size {
            return None;
        }

        let whole_steps = (self.pending.len() - self.window_size) / self.step;
        let usable = self.window_size + whole_steps * self.step;
        let carry_from = usable - self.window_size + self.step;

        let mut carried = self.reuse_buffer(self.pending.len() - carry_from);
        carried.extend_from_slice(&self.pending[carry_from..]);
        let sample_buffer = mem::replace(&mut self.pending, carried);

        let is_start = !self.started;
        self.started = true;

        Some(SampleTick {
            sample_buffer,
            start: 0,
            length: usable,
            sample_rate,
            is_start,
        })
    }

    /// Hand back a buffer echoed by a worker for reuse.
    pub fn recycle(&mut self, mut buffer: Vec<f32>) {
        if self.recycle.len() < MAX_RECYCLED_BUFFERS {
            buffer.clear();
            self.recycle.push(buffer);
        }
    }

    /// Drop carried samples; the next tick starts a new stream.
    pub fn reset(&mut self) {
        let pending = mem::take(&mut self.pending);
        self.recycle(pending);
        self.started = false;
    }

    pub fn reconfigure(&mut self, settings: &AnalysisSettings) {
        self.window_size = settings.window_size.max(1);
        self.step = settings.window_step_size.max(1);
        self.reset();
    }

    fn reuse_buffer(&mut self, needed: usize) -> Vec<f32> {
        let mut buffer = self.recycle.pop().unwrap_or_default();
        buffer.clear();
        buffer.reserve(needed);
        buffer
    }
}

/// Result of applying one tick.
#[derive(Debug)]
pub struct ProcessedTick {
    pub columns: usize,
    pub evicted: usize,
    /// The tick's sample buffer, returned by the worker.
    pub recycled: Vec<f32>,
}

/// Single owner of one channel's column history.
pub struct ChannelPipeline {
    pool: Arc<SpectrogramPool>,
    settings: AnalysisSettings,
    sample_rate: f32,
    buffer: CircularColumnBuffer,
    force_full: bool,
}

impl fmt::Debug for ChannelPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelPipeline")
            .field("settings", &self.settings)
            .field("sample_rate", &self.sample_rate)
            .field("buffer", &self.buffer)
            .finish_non_exhaustive()
    }
}

impl ChannelPipeline {
    pub fn new(pool: Arc<SpectrogramPool>, settings: AnalysisSettings) -> Result<Self> {
        Self::validate(&settings, DEFAULT_SAMPLE_RATE)?;
        if settings.history_columns == 0 {
            bail!("history must hold at least one column");
        }

        Ok(Self {
            pool,
            buffer: CircularColumnBuffer::new(settings.history_columns, settings.column_height()),
            settings,
            sample_rate: DEFAULT_SAMPLE_RATE,
            force_full: true,
        })
    }

    pub fn buffer(&self) -> &CircularColumnBuffer {
        &self.buffer
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Analyse `tick` on the pool and append its columns.
    pub async fn process(&mut self, tick: SampleTick) -> Result<ProcessedTick> {
        if tick.sample_rate != self.sample_rate {
            self.reconfigure(self.settings.window_size, tick.sample_rate)?;
        }

        let request = WorkerRequest::ComputeSpectrogram {
            sample_buffer: tick.sample_buffer,
            samples_start: tick.start,
            samples_length: tick.length,
            options: self.settings.options(tick.sample_rate, tick.is_start),
        };

        let result = self
            .pool
            .submit(request)
            .wait()
            .await
            .context("spectrogram analysis failed")?;

        if result.column_height() != self.buffer.height() {
            bail!(
                "worker returned columns of height {} for a history of height {}",
                result.column_height(),
                self.buffer.height()
            );
        }

        let evicted = self
            .buffer
            .enqueue(&result.spectrogram_buffer)
            .context("failed to append analysed columns")?;

        Ok(ProcessedTick {
            columns: result.window_count,
            evicted,
            recycled: result.input_buffer_echo,
        })
    }

    /// Forget every column; the next render update re-uploads everything.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.force_full = true;
    }

    /// Whether a full re-upload was requested since the last call.
    pub fn take_force_full(&mut self) -> bool {
        mem::take(&mut self.force_full)
    }

    /// Change how many columns of history are kept, preserving the newest.
    pub fn resize_history(&mut self, columns: usize) -> Result<()> {
        if columns == 0 {
            bail!("history must hold at least one column");
        }
        self.buffer.resize_width(columns);
        self.settings.history_columns = columns;
        Ok(())
    }

    /// Switch window size or sample rate. History from the previous
    /// configuration is discarded.
    pub fn reconfigure(&mut self, window_size: usize, sample_rate: f32) -> Result<()> {
        let settings = AnalysisSettings {
            window_size,
            ..self.settings
        };
        Self::validate(&settings, sample_rate)?;

        if settings.column_height() == self.buffer.height() {
            self.buffer.clear();
        } else {
            self.buffer =
                CircularColumnBuffer::new(settings.history_columns, settings.column_height());
        }

        info!(
            "[pipeline] analysis reconfigured: window {} / step {} at {sample_rate} Hz",
            settings.window_size, settings.window_step_size
        );

        self.settings = settings;
        self.sample_rate = sample_rate;
        self.force_full = true;
        Ok(())
    }

    fn validate(settings: &AnalysisSettings, sample_rate: f32) -> Result<()> {
        settings
            .options(sample_rate, false)
            .resolve()
            .with_context(|| {
                format!(
                    "invalid analysis settings (window {}, step {}, {sample_rate} Hz)",
                    settings.window_size, settings.window_step_size
                )
            })?;
        Ok(())
    }
}
