//! Background research jobs.
//!
//! - [`store`]: the process-wide registry, scheduler, cancel and bounded wait
//! - [`strategy`]: how a job's research is actually carried out

pub mod errors;
pub mod store;
pub mod strategy;
pub mod types;

pub use errors::{JobExecutionError, WaitInterrupted};
pub use store::{CancelOutcome, JobStore, WaitOutcome};
pub use strategy::{ResearchStrategy, ResearchTask};
pub use types::{Job, JobId, JobStatus, ResearchOutcome};
