//! In-memory research job registry and scheduler.
//!
//! The store owns every job for the life of the process. Jobs are never
//! removed, only transitioned `InProgress → Completed | Failed | Cancelled`.
//! All mutation happens under one `std::sync::Mutex`, which is never held
//! across an `.await`.
//!
//! Each job gets its own `CancellationToken`. Scheduled work runs on its own
//! tokio task racing that token; the outcome is written back only while the
//! job is still `InProgress`, so a cancel always wins over a late result.

use std::any::Any;
use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::errors::{JobExecutionError, WaitInterrupted};
use super::types::{Job, JobId, JobStatus, ResearchOutcome};

// ─── Constants ───────────────────────────────────────────────────────────────

/// How often a bounded wait re-checks the job.
pub const DEFAULT_WAIT_INTERVAL: Duration = Duration::from_secs(2);

// ─── Outcomes ────────────────────────────────────────────────────────────────

/// Result of [`JobStore::cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    NotFound,
    AlreadyTerminal(JobStatus),
    Cancelled,
}

/// Result of a bounded [`JobStore::wait`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The job reached a terminal state within the deadline.
    Finished(Job),
    /// The deadline passed; the job keeps running.
    StillRunning(Job),
    NotFound,
}

// ─── Registry ────────────────────────────────────────────────────────────────

struct JobEntry {
    job: Job,
    cancel: CancellationToken,
}

struct JobRegistry {
    jobs: BTreeMap<JobId, JobEntry>,
    next_id: u64,
}

impl JobRegistry {
    /// Apply a finished strategy's outcome, unless the job already ended.
    fn finish(&mut self, id: JobId, outcome: Result<ResearchOutcome, JobExecutionError>) {
        let Some(entry) = self.jobs.get_mut(&id) else {
            return;
        };
        let job = &mut entry.job;
        if job.status.is_terminal() {
            tracing::debug!(job_id = %id, status = %job.status, "discarding outcome of ended job");
            return;
        }

        match outcome {
            Ok(outcome) => {
                job.status = JobStatus::Completed;
                job.result = Some(outcome.report);
                job.citations = outcome.citations;
            }
            Err(JobExecutionError::Cancelled) => {
                job.status = JobStatus::Cancelled;
            }
            Err(e) => {
                job.status = JobStatus::Failed;
                job.error = Some(e.to_string());
            }
        }
        job.ended_at = Some(Utc::now());

        match job.status {
            JobStatus::Failed => tracing::warn!(
                job_id = %id,
                model = %job.model,
                error = job.error.as_deref().unwrap_or_default(),
                "research job failed"
            ),
            status => tracing::info!(job_id = %id, model = %job.model, status = %status, "research job finished"),
        }
    }
}

// ─── JobStore ────────────────────────────────────────────────────────────────

/// Process-wide research job store. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct JobStore {
    registry: Arc<Mutex<JobRegistry>>,
    wait_interval: Duration,
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl JobStore {
    pub fn new() -> Self {
        Self::with_wait_interval(DEFAULT_WAIT_INTERVAL)
    }

    /// Store whose bounded waits poll at `wait_interval`.
    pub fn with_wait_interval(wait_interval: Duration) -> Self {
        Self {
            registry: Arc::new(Mutex::new(JobRegistry {
                jobs: BTreeMap::new(),
                next_id: 1,
            })),
            wait_interval,
        }
    }

    fn registry(&self) -> MutexGuard<'_, JobRegistry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a new in-progress job.
    pub fn create_job(&self, model: impl Into<String>, query: impl Into<String>) -> Job {
        let mut registry = self.registry();
        let id = JobId(registry.next_id);
        registry.next_id += 1;

        let job = Job {
            id,
            model: model.into(),
            query: query.into(),
            status: JobStatus::InProgress,
            started_at: Utc::now(),
            ended_at: None,
            result: None,
            citations: Vec::new(),
            error: None,
        };
        registry.jobs.insert(
            id,
            JobEntry {
                job: job.clone(),
                cancel: CancellationToken::new(),
            },
        );
        tracing::info!(job_id = %id, model = %job.model, "research job created");
        job
    }

    /// Run `work` for job `id` on a new task.
    ///
    /// `work` receives the job's cancellation token for cooperative checks;
    /// the task also races the token itself. Errors and panics become a
    /// `Failed` job. Returns `None` if the job does not exist.
    pub fn schedule<F, Fut>(&self, id: JobId, work: F) -> Option<JoinHandle<()>>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<ResearchOutcome, JobExecutionError>> + Send + 'static,
    {
        let token = self.registry().jobs.get(&id)?.cancel.clone();
        let fut = AssertUnwindSafe(work(token.clone())).catch_unwind();
        let registry = Arc::clone(&self.registry);

        Some(tokio::spawn(async move {
            let outcome = tokio::select! {
                _ = token.cancelled() => Err(JobExecutionError::Cancelled),
                result = fut => match result {
                    Ok(result) => result,
                    Err(panic) => Err(JobExecutionError::Panicked(panic_message(panic.as_ref()))),
                },
            };
            registry
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .finish(id, outcome);
        }))
    }

    pub fn get(&self, id: JobId) -> Option<Job> {
        self.registry().jobs.get(&id).map(|entry| entry.job.clone())
    }

    /// All jobs in creation order.
    pub fn list(&self) -> Vec<Job> {
        self.registry()
            .jobs
            .values()
            .map(|entry| entry.job.clone())
            .collect()
    }

    /// Cancel an in-progress job. Idempotent.
    ///
    /// Cooperative: remote work that was already submitted may keep running
    /// on the provider's side.
    pub fn cancel(&self, id: JobId) -> CancelOutcome {
        let mut registry = self.registry();
        let Some(entry) = registry.jobs.get_mut(&id) else {
            return CancelOutcome::NotFound;
        };
        if entry.job.status.is_terminal() {
            return CancelOutcome::AlreadyTerminal(entry.job.status);
        }

        entry.cancel.cancel();
        entry.job.status = JobStatus::Cancelled;
        entry.job.ended_at = Some(Utc::now());
        tracing::info!(job_id = %id, "research job cancelled");
        CancelOutcome::Cancelled
    }

    /// Wait up to `timeout` for job `id` to end.
    ///
    /// Never cancels the job. If `interrupt` fires first the wait is
    /// abandoned with [`WaitInterrupted`] and the job carries on. A
    /// `timeout` too large to represent as a deadline waits indefinitely.
    pub async fn wait(
        &self,
        id: JobId,
        timeout: Duration,
        interrupt: &CancellationToken,
    ) -> Result<WaitOutcome, WaitInterrupted> {
        let deadline = Instant::now().checked_add(timeout);
        loop {
            let Some(job) = self.get(id) else {
                return Ok(WaitOutcome::NotFound);
            };
            if job.status.is_terminal() {
                return Ok(WaitOutcome::Finished(job));
            }

            let nap = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(WaitOutcome::StillRunning(job));
                    }
                    self.wait_interval.min(deadline - now)
                }
                None => self.wait_interval,
            };
            tokio::select! {
                _ = interrupt.cancelled() => {
                    tracing::debug!(job_id = %id, "wait interrupted by caller");
                    return Err(WaitInterrupted);
                }
                _ = tokio::time::sleep(nap) => {}
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> JobStore {
        JobStore::with_wait_interval(Duration::from_millis(10))
    }

    fn never() -> impl Future<Output = Result<ResearchOutcome, JobExecutionError>> + Send + 'static {
        std::future::pending()
    }

    fn exploding() -> Result<ResearchOutcome, JobExecutionError> {
        panic!("strategy blew up")
    }

    fn report(text: &str) -> ResearchOutcome {
        ResearchOutcome {
            report: text.to_string(),
            citations: vec!["https://a.test".into()],
        }
    }

    #[test]
    fn test_ids_start_at_one_and_increase() {
        let store = store();
        let a = store.create_job("m", "q1");
        let b = store.create_job("m", "q2");
        assert_eq!(a.id, JobId(1));
        assert_eq!(b.id, JobId(2));
        assert_eq!(a.status, JobStatus::InProgress);
        assert!(a.ended_at.is_none());

        let ids: Vec<JobId> = store.list().iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![JobId(1), JobId(2)]);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let store = store();
        let job = store.create_job("m", "q");

        assert_eq!(store.cancel(job.id), CancelOutcome::Cancelled);
        let cancelled = store.get(job.id).unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);
        let ended = cancelled.ended_at.expect("ended_at set");

        assert_eq!(
            store.cancel(job.id),
            CancelOutcome::AlreadyTerminal(JobStatus::Cancelled)
        );
        assert_eq!(store.get(job.id).unwrap().ended_at, Some(ended));
        assert_eq!(store.cancel(JobId(99)), CancelOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_scheduled_success_completes() {
        let store = store();
        let job = store.create_job("m", "q");
        store
            .schedule(job.id, |_| async { Ok(report("done")) })
            .unwrap()
            .await
            .unwrap();

        let job = store.get(job.id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result.as_deref(), Some("done"));
        assert_eq!(job.citations, vec!["https://a.test"]);
        assert!(job.ended_at.is_some());
        assert!(job.error.is_none());
    }

    #[tokio::test]
    async fn test_scheduled_error_fails() {
        let store = store();
        let job = store.create_job("m", "q");
        store
            .schedule(job.id, |_| async {
                Err::<ResearchOutcome, _>(JobExecutionError::Remote("quota exceeded".into()))
            })
            .unwrap()
            .await
            .unwrap();

        let job = store.get(job.id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("quota exceeded"));
        assert!(job.result.is_none());
    }

    #[tokio::test]
    async fn test_panic_fails_only_that_job() {
        let store = store();
        let bad = store.create_job("m", "bad");
        let good = store.create_job("m", "good");

        let h1 = store
            .schedule(bad.id, |_| async { exploding() })
            .unwrap();
        let h2 = store
            .schedule(good.id, |_| async { Ok(report("fine")) })
            .unwrap();
        h1.await.unwrap();
        h2.await.unwrap();

        let bad = store.get(bad.id).unwrap();
        assert_eq!(bad.status, JobStatus::Failed);
        assert!(bad.error.unwrap().contains("strategy blew up"));
        assert_eq!(store.get(good.id).unwrap().status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_cancel_stops_pending_work_and_wins() {
        let store = store();
        let job = store.create_job("m", "q");
        let other = store.create_job("m", "other");

        let handle = store
            .schedule(job.id, |_| never())
            .unwrap();
        let other_handle = store
            .schedule(other.id, |token| async move {
                token.cancelled().await;
                Err::<ResearchOutcome, _>(JobExecutionError::Cancelled)
            })
            .unwrap();

        assert_eq!(store.cancel(job.id), CancelOutcome::Cancelled);
        handle.await.unwrap();

        assert_eq!(store.get(job.id).unwrap().status, JobStatus::Cancelled);
        assert_eq!(store.get(other.id).unwrap().status, JobStatus::InProgress);

        store.cancel(other.id);
        other_handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_with_unrepresentable_timeout() {
        let store = store();
        let job = store.create_job("m", "q");
        store
            .schedule(job.id, |_| async {
                tokio::time::sleep(Duration::from_millis(30)).await;
                Ok(report("late"))
            })
            .unwrap();

        let outcome = store
            .wait(job.id, Duration::from_secs(u64::MAX), &CancellationToken::new())
            .await
            .unwrap();
        match outcome {
            WaitOutcome::Finished(job) => assert_eq!(job.status, JobStatus::Completed),
            other => panic!("expected a finished job, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_wait_zero_timeout_reports_still_running() {
        let store = store();
        let job = store.create_job("m", "q");
        store.schedule(job.id, |_| never());

        let outcome = store
            .wait(job.id, Duration::ZERO, &CancellationToken::new())
            .await
            .unwrap();
        match outcome {
            WaitOutcome::StillRunning(j) => assert_eq!(j.status, JobStatus::InProgress),
            other => panic!("expected StillRunning, got {other:?}"),
        }
        assert_eq!(store.get(job.id).unwrap().status, JobStatus::InProgress);
    }

    #[tokio::test]
    async fn test_wait_returns_finished_job() {
        let store = store();
        let job = store.create_job("m", "q");
        store.schedule(job.id, |_| async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok(report("late"))
        });

        let outcome = store
            .wait(job.id, Duration::from_secs(5), &CancellationToken::new())
            .await
            .unwrap();
        match outcome {
            WaitOutcome::Finished(j) => assert_eq!(j.result.as_deref(), Some("late")),
            other => panic!("expected Finished, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_wait_interrupt_leaves_job_running() {
        let store = store();
        let job = store.create_job("m", "q");
        store.schedule(job.id, |_| never());

        let interrupt = CancellationToken::new();
        let trigger = interrupt.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(25)).await;
            trigger.cancel();
        });

        let result = store.wait(job.id, Duration::from_secs(30), &interrupt).await;
        assert_eq!(result, Err(WaitInterrupted));
        assert_eq!(store.get(job.id).unwrap().status, JobStatus::InProgress);
    }

    #[tokio::test]
    async fn test_wait_unknown_job() {
        let store = store();
        let outcome = store
            .wait(JobId(7), Duration::from_secs(1), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, WaitOutcome::NotFound);
    }
}
