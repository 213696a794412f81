use std::{sync::Arc, time::Duration};

use futures_util::future::join_all;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    error::DeliveryError,
    models::{
        job::Job,
        message::JobPayload,
        receipt::Receipt,
        status::MessageStatus,
    },
    queue::{FailOutcome, Queue},
    services::delivery::{Delivered, DeliveryHandler},
};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub concurrency: usize,
    /// Ceiling on a single lease wait.
    pub wait_max: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            wait_max: Duration::from_secs(5),
        }
    }
}

/// Fixed-size set of workers draining one queue.
pub struct WorkerPool {
    queue: Queue,
    handler: Arc<dyn DeliveryHandler>,
    config: WorkerConfig,
}

/// Running pool. Dropping the handle also stops the workers, without waiting for them.
pub struct PoolHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl PoolHandle {
    pub fn size(&self) -> usize {
        self.tasks.len()
    }

    /// Stops leasing new jobs and waits for in-flight deliveries to finish.
    pub async fn shutdown(self) {
        info!(workers = self.tasks.len(), "Shutting down worker pool");

        let _ = self.shutdown.send(true);

        for result in join_all(self.tasks).await {
            if let Err(e) = result {
                error!(error = %e, "Worker task panicked");
            }
        }

        info!("Worker pool stopped");
    }
}

impl WorkerPool {
    pub fn new(queue: Queue, handler: Arc<dyn DeliveryHandler>, config: WorkerConfig) -> Self {
        Self {
            queue,
            handler,
            config,
        }
    }

    pub fn start(self) -> PoolHandle {
        let (shutdown, signal) = watch::channel(false);
        let instance = Uuid::new_v4().simple().to_string();

        let tasks = (0..self.config.concurrency.max(1))
            .map(|index| {
                let worker = Worker {
                    id: format!("worker-{}-{}", &instance[..8], index),
                    queue: self.queue.clone(),
                    handler: Arc::clone(&self.handler),
                    wait_max: self.config.wait_max,
                };

                tokio::spawn(worker.run(signal.clone()))
            })
            .collect::<Vec<_>>();

        info!(
            workers = tasks.len(),
            queue = self.queue.name(),
            "Worker pool started"
        );

        PoolHandle { shutdown, tasks }
    }
}

struct Worker {
    id: String,
    queue: Queue,
    handler: Arc<dyn DeliveryHandler>,
    wait_max: Duration,
}

impl Worker {
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        debug!(worker_id = %self.id, "Worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let leased = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                leased = self.queue.lease(&self.id, self.wait_max) => leased,
            };

            match leased {
                Ok(Some(job)) => self.process(job).await,
                Ok(None) => {}
                Err(e) => {
                    error!(worker_id = %self.id, error = %e, "Failed to lease job");
                    tokio::time::sleep(self.queue.config().poll_interval).await;
                }
            }
        }

        debug!(worker_id = %self.id, "Worker stopped");
    }

    async fn process(&self, job: Job) {
        match self.handler.deliver(&job).await {
            Ok(delivered) => self.complete(&job, delivered).await,
            Err(e) => self.handle_failure(&job, e).await,
        }
    }

    async fn complete(&self, job: &Job, delivered: Delivered) {
        if let Err(e) = self.queue.ack(job.id).await {
            error!(job_id = %job.id, error = %e, "Failed to acknowledge job");
            return;
        }

        if let Delivered::Message { email, .. } = delivered {
            self.write_receipt(job, MessageStatus::Delivered, Some(email), None)
                .await;
        }
    }

    async fn handle_failure(&self, job: &Job, failure: DeliveryError) {
        let reason = failure.reason();

        let outcome = if failure.is_transient() {
            self.queue.fail(job, reason).await
        } else {
            self.queue.fail_permanently(job, reason).await
        };

        match outcome {
            Ok(FailOutcome::Exhausted { attempts }) => {
                warn!(
                    worker_id = %self.id,
                    job_id = %job.id,
                    attempts,
                    error = reason,
                    "Delivery abandoned"
                );
                self.write_receipt(job, MessageStatus::Failed, None, Some(reason.to_string()))
                    .await;
            }
            Ok(FailOutcome::Retrying { attempts, .. }) => {
                debug!(job_id = %job.id, attempts, "Delivery will be retried");
            }
            Ok(FailOutcome::LeaseLost) => {}
            Err(e) => {
                error!(job_id = %job.id, error = %e, "Failed to record delivery failure");
            }
        }
    }

    /// Receipts are only kept for per-recipient deliveries.
    async fn write_receipt(
        &self,
        job: &Job,
        status: MessageStatus,
        email: Option<String>,
        error: Option<String>,
    ) {
        let Ok(JobPayload::Delivery(payload)) = job.decode() else {
            return;
        };

        let mut receipt = Receipt::for_payload(&payload, status);
        if let Some(email) = email {
            receipt = receipt.with_email(email);
        }
        if let Some(error) = error {
            receipt = receipt.with_error(error);
        }

        if let Err(e) = self.queue.storage().upsert_receipt(&receipt).await {
            error!(
                job_id = %job.id,
                notification_id = %receipt.notification_id,
                error = %e,
                "Failed to write receipt"
            );
        }
    }
}
