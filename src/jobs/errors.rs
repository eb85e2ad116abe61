//! Research job error types.

use thiserror::Error;

use crate::inference::InferenceError;

/// Why a research strategy did not produce a report.
///
/// Recorded into the job's `error` field; never propagated to a caller.
#[derive(Debug, Error)]
pub enum JobExecutionError {
    /// The provider call itself failed.
    #[error(transparent)]
    Inference(#[from] InferenceError),

    /// The remote agent reported failure or cancellation.
    #[error("{0}")]
    Remote(String),

    /// The job's cancellation token fired.
    #[error("research cancelled")]
    Cancelled,

    /// The strategy panicked.
    #[error("research task panicked: {0}")]
    Panicked(String),
}

/// The waiting caller's own request was cancelled before the job finished.
///
/// The job itself is untouched and keeps running.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("wait interrupted; the job continues in the background")]
pub struct WaitInterrupted;
