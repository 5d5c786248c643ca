//! Background analysis workers.
//!
//! A fixed set of threads, each fed over its own channel, consumes a shared
//! FIFO of requests. Callers get a [`PendingResult`] future per request; no
//! memory is shared with the workers, request buffers move into them.

pub mod pool;
pub mod protocol;

use crate::dsp::AnalysisError;
use std::fmt;

pub use pool::{PendingResult, WorkerPool, default_pool_size};
pub use protocol::{ComputeResult, SpectrogramPool, SpectrogramWorker, WorkerRequest};

/// Per-task failure reported through a [`PendingResult`].
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerError {
    Analysis(AnalysisError),
    Panicked(String),
    /// The pool shut down before the request was dispatched.
    ShutDown,
    /// The worker went away without replying.
    Disconnected,
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerError::Analysis(err) => write!(f, "analysis failed: {err}"),
            WorkerError::Panicked(message) => write!(f, "worker panicked: {message}"),
            WorkerError::ShutDown => write!(f, "worker pool has shut down"),
            WorkerError::Disconnected => write!(f, "worker disconnected before replying"),
        }
    }
}

impl std::error::Error for WorkerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WorkerError::Analysis(err) => Some(err),
            _ => None,
        }
    }
}

impl From<AnalysisError> for WorkerError {
    fn from(err: AnalysisError) -> Self {
        WorkerError::Analysis(err)
    }
}

/// Work executed on a pool thread. One handler instance is shared by every
/// worker in the pool.
pub trait TaskHandler: Send + Sync + 'static {
    type Request: Send + 'static;
    type Response: Send + 'static;

    fn handle(&self, request: Self::Request) -> Result<Self::Response, WorkerError>;

    /// Short label used in log lines.
    fn describe(_request: &Self::Request) -> &'static str {
        "task"
    }
}
