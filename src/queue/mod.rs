pub mod memory;
pub mod postgres;
pub mod storage;

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};
use tokio::{sync::Notify, time::Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    error::StorageError,
    models::{
        job::{Job, JobRelease, QueueStats},
        retry::RetryConfig,
    },
};

pub use memory::MemoryStorage;
pub use postgres::PostgresStorage;
pub use storage::{Storage, Transaction};

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub queue_name: String,
    pub lease_timeout: Duration,
    pub poll_interval: Duration,
    pub retry: RetryConfig,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queue_name: "notifications".to_string(),
            lease_timeout: Duration::from_secs(120),
            poll_interval: Duration::from_millis(250),
            retry: RetryConfig::default(),
        }
    }
}

/// What `fail` did with the job.
#[derive(Debug, Clone, PartialEq)]
pub enum FailOutcome {
    /// Back to pending; leasable again from `active_at`.
    Retrying {
        attempts: u32,
        active_at: DateTime<Utc>,
    },
    Exhausted {
        attempts: u32,
    },
    /// The caller no longer held the lease, so nothing was written.
    LeaseLost,
}

/// Durable work queue with exclusive, time-bounded leases.
///
/// All state lives in [`Storage`]; the queue itself only adds the lease polling
/// loop, backoff computation and a local wake-up signal for freshly enqueued work.
#[derive(Clone)]
pub struct Queue {
    storage: Arc<dyn Storage>,
    config: QueueConfig,
    notify: Arc<Notify>,
}

impl Queue {
    pub fn new(storage: Arc<dyn Storage>, config: QueueConfig) -> Self {
        Self {
            storage,
            config,
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.queue_name
    }

    /// Wakes every worker blocked in [`Queue::lease`].
    pub fn wake(&self) {
        self.notify.notify_waiters();
    }

    /// Claims the next eligible job for `worker_id`, waiting up to `max_wait` for one
    /// to become available. `Ok(None)` means the wait ceiling passed with nothing to do.
    pub async fn lease(
        &self,
        worker_id: &str,
        max_wait: Duration,
    ) -> Result<Option<Job>, StorageError> {
        let deadline = Instant::now() + max_wait;

        loop {
            // Register before claiming so an enqueue landing between the claim and
            // the wait is not missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let now = Utc::now();
            let lease_expires_at = offset(now, self.config.lease_timeout);

            if let Some(job) = self
                .storage
                .claim_job(&self.config.queue_name, worker_id, now, lease_expires_at)
                .await?
            {
                debug!(
                    job_id = %job.id,
                    worker_id,
                    attempts = job.attempts,
                    "Job leased"
                );
                return Ok(Some(job));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }

            let pause = remaining.min(self.config.poll_interval);
            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }

    /// Marks a pending or leased job completed. Returns `false` if the job is
    /// already terminal, so a late ack never overwrites a failure.
    pub async fn ack(&self, job_id: Uuid) -> Result<bool, StorageError> {
        let acked = self.storage.complete_job(job_id).await?;

        if acked {
            debug!(job_id = %job_id, "Job acknowledged");
        } else {
            debug!(job_id = %job_id, "Job already terminal, ack ignored");
        }

        Ok(acked)
    }

    /// Records a failed attempt and either reschedules the job with backoff or
    /// marks it failed once `max_attempts` is reached.
    pub async fn fail(&self, job: &Job, reason: &str) -> Result<FailOutcome, StorageError> {
        let attempts = job.attempts.saturating_add(1);
        let retry = &self.config.retry;

        if !retry.should_retry(attempts) {
            return self.exhaust(job, attempts, reason).await;
        }

        let delay = retry.jittered_delay(attempts);
        let active_at = offset(Utc::now(), delay);

        let release = JobRelease::Retry {
            attempts,
            active_at,
            error: reason.to_string(),
        };

        if !self.release(job, release).await? {
            return Ok(FailOutcome::LeaseLost);
        }

        info!(
            job_id = %job.id,
            attempts,
            delay_ms = delay.as_millis() as u64,
            error = reason,
            "Job failed, retry scheduled"
        );

        Ok(FailOutcome::Retrying {
            attempts,
            active_at,
        })
    }

    /// Marks the job failed without consuming any further retries.
    pub async fn fail_permanently(
        &self,
        job: &Job,
        reason: &str,
    ) -> Result<FailOutcome, StorageError> {
        let attempts = job.attempts.saturating_add(1);
        self.exhaust(job, attempts, reason).await
    }

    pub async fn stats(&self) -> Result<QueueStats, StorageError> {
        self.storage.queue_stats(&self.config.queue_name).await
    }

    pub async fn find(&self, job_id: Uuid) -> Result<Option<Job>, StorageError> {
        self.storage.find_job(job_id).await
    }

    async fn exhaust(
        &self,
        job: &Job,
        attempts: u32,
        reason: &str,
    ) -> Result<FailOutcome, StorageError> {
        let release = JobRelease::Exhausted {
            attempts,
            error: reason.to_string(),
        };

        if !self.release(job, release).await? {
            return Ok(FailOutcome::LeaseLost);
        }

        warn!(
            job_id = %job.id,
            attempts,
            error = reason,
            "Job failed permanently"
        );

        Ok(FailOutcome::Exhausted { attempts })
    }

    async fn release(&self, job: &Job, release: JobRelease) -> Result<bool, StorageError> {
        let Some(owner) = job.lease_owner.as_deref() else {
            warn!(job_id = %job.id, "Cannot release a job that was never leased");
            return Ok(false);
        };

        let released = self.storage.release_job(job.id, owner, release).await?;

        if !released {
            warn!(
                job_id = %job.id,
                owner,
                "Lease no longer held, release skipped"
            );
        }

        Ok(released)
    }
}

fn offset(from: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(by)
        .ok()
        .and_then(|delta| from.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
