//! Request and response messages understood by the spectrogram workers.

use super::{TaskHandler, WorkerError, WorkerPool};
use crate::dsp::spectrogram::{ResolvedOptions, SpectrogramOptions, generate_spectrogram};

pub const COMPUTE_SPECTROGRAM_ACTION: &str = "compute-spectrogram";

#[derive(Debug, Clone, PartialEq)]
pub enum WorkerRequest {
    /// Analyse `sample_buffer[samples_start..samples_start + samples_length]`.
    /// The buffer is moved to the worker and returned untouched in
    /// [`ComputeResult::input_buffer_echo`].
    ComputeSpectrogram {
        sample_buffer: Vec<f32>,
        samples_start: usize,
        samples_length: usize,
        options: SpectrogramOptions,
    },
}

impl WorkerRequest {
    pub fn action(&self) -> &'static str {
        match self {
            WorkerRequest::ComputeSpectrogram { .. } => COMPUTE_SPECTROGRAM_ACTION,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComputeResult {
    pub window_count: usize,
    pub resolved_options: ResolvedOptions,
    /// `window_count * resolved_options.scale_size` intensities, column-major.
    pub spectrogram_buffer: Vec<f32>,
    pub input_buffer_echo: Vec<f32>,
}

impl ComputeResult {
    pub fn column_height(&self) -> usize {
        self.resolved_options.scale_size
    }
}

/// Stateless handler running [`generate_spectrogram`] on pool threads.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpectrogramWorker;

impl TaskHandler for SpectrogramWorker {
    type Request = WorkerRequest;
    type Response = ComputeResult;

    fn handle(&self, request: WorkerRequest) -> Result<ComputeResult, WorkerError> {
        match request {
            WorkerRequest::ComputeSpectrogram {
                sample_buffer,
                samples_start,
                samples_length,
                options,
            } => {
                let output =
                    generate_spectrogram(&sample_buffer, samples_start, samples_length, &options)?;
                Ok(ComputeResult {
                    window_count: output.window_count,
                    resolved_options: output.resolved,
                    spectrogram_buffer: output.data,
                    input_buffer_echo: sample_buffer,
                })
            }
        }
    }

    fn describe(request: &WorkerRequest) -> &'static str {
        request.action()
    }
}

pub type SpectrogramPool = WorkerPool<SpectrogramWorker>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::{AnalysisError, FrequencyScale};

    fn request(samples: Vec<f32>, length: usize, options: SpectrogramOptions) -> WorkerRequest {
        WorkerRequest::ComputeSpectrogram {
            sample_buffer: samples,
            samples_start: 0,
            samples_length: length,
            options,
        }
    }

    #[test]
    fn compute_returns_columns_and_echoes_input() {
        let pool = SpectrogramPool::new(SpectrogramWorker, 2).expect("spawn workers");
        let samples: Vec<f32> = (0..2048).map(|i| (i as f32 * 0.1).sin()).collect();
        let options = SpectrogramOptions {
            window_size: 1024,
            window_step_size: 256,
            scale: FrequencyScale::Mel,
            scale_size: Some(64),
            ..SpectrogramOptions::default()
        };

        let job = request(samples.clone(), samples.len(), options);
        assert_eq!(job.action(), "compute-spectrogram");

        let result = pool.submit(job).wait_blocking().expect("analysis succeeds");
        assert_eq!(result.window_count, 5);
        assert_eq!(result.column_height(), 64);
        assert_eq!(result.spectrogram_buffer.len(), 5 * 64);
        assert_eq!(result.resolved_options.scale, FrequencyScale::Mel);
        assert_eq!(result.input_buffer_echo, samples);
    }

    #[test]
    fn invalid_options_reject_the_request() {
        let pool = SpectrogramPool::new(SpectrogramWorker, 1).expect("spawn workers");
        let options = SpectrogramOptions {
            window_size: 1000,
            window_step_size: 300,
            ..SpectrogramOptions::default()
        };

        let err = pool
            .submit(request(vec![0.0; 1000], 1000, options))
            .wait_blocking()
            .expect_err("step does not divide window");
        assert_eq!(
            err,
            WorkerError::Analysis(AnalysisError::InvalidStepSize {
                window_size: 1000,
                step_size: 300,
            })
        );

        let healthy = SpectrogramOptions {
            window_size: 256,
            window_step_size: 128,
            ..SpectrogramOptions::default()
        };
        let result = pool
            .submit(request(vec![0.0; 256], 256, healthy))
            .wait_blocking()
            .expect("pool keeps serving");
        assert_eq!(result.window_count, 1);
    }
}
