use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    error::StorageError,
    models::{
        campaign::{Campaign, CampaignType},
        job::{Job, JobRelease, JobStatus, NewJob, QueueStats},
        receipt::Receipt,
    },
    queue::storage::{Storage, Transaction},
};

#[derive(Default)]
struct State {
    jobs: Vec<Job>,
    receipts: HashMap<(Uuid, String), Receipt>,
    campaigns: HashMap<Uuid, Campaign>,
    campaign_types: HashMap<String, CampaignType>,
}

/// In-process storage backend for tests. Every operation runs under one lock, which
/// makes claims trivially atomic. Terminal jobs are kept so their final state can be
/// inspected, and claims scan the whole job list, so it is not meant for long runs.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    state: Arc<Mutex<State>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_campaign_type(&self, campaign_type: CampaignType) {
        let mut state = self.state.lock().await;
        state
            .campaign_types
            .insert(campaign_type.id.clone(), campaign_type);
    }

    pub async fn jobs(&self) -> Vec<Job> {
        self.state.lock().await.jobs.clone()
    }

    pub async fn receipts(&self) -> Vec<Receipt> {
        self.state.lock().await.receipts.values().cloned().collect()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn begin(&self) -> Result<Box<dyn Transaction>, StorageError> {
        Ok(Box::new(MemoryTransaction {
            state: Arc::clone(&self.state),
            jobs: Vec::new(),
            campaigns: Vec::new(),
        }))
    }

    async fn claim_job(
        &self,
        queue_name: &str,
        owner: &str,
        now: DateTime<Utc>,
        lease_expires_at: DateTime<Utc>,
    ) -> Result<Option<Job>, StorageError> {
        let mut state = self.state.lock().await;

        let next = state
            .jobs
            .iter_mut()
            .filter(|job| job.queue_name == queue_name && job.is_leasable(now))
            .min_by_key(|job| (job.active_at, job.created_at));

        Ok(next.map(|job| {
            job.status = JobStatus::Leased;
            job.lease_owner = Some(owner.to_string());
            job.lease_expires_at = Some(lease_expires_at);
            job.clone()
        }))
    }

    async fn complete_job(&self, id: Uuid) -> Result<bool, StorageError> {
        let mut state = self.state.lock().await;

        match state.jobs.iter_mut().find(|job| job.id == id) {
            Some(job) if matches!(job.status, JobStatus::Pending | JobStatus::Leased) => {
                job.status = JobStatus::Completed;
                job.lease_owner = None;
                job.lease_expires_at = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_job(
        &self,
        id: Uuid,
        owner: &str,
        release: JobRelease,
    ) -> Result<bool, StorageError> {
        let mut state = self.state.lock().await;

        let Some(job) = state.jobs.iter_mut().find(|job| {
            job.id == id
                && job.status == JobStatus::Leased
                && job.lease_owner.as_deref() == Some(owner)
        }) else {
            return Ok(false);
        };

        match release {
            JobRelease::Retry {
                attempts,
                active_at,
                error,
            } => {
                job.status = JobStatus::Pending;
                job.attempts = attempts;
                job.active_at = active_at;
                job.last_error = Some(error);
            }
            JobRelease::Exhausted { attempts, error } => {
                job.status = JobStatus::Failed;
                job.attempts = attempts;
                job.last_error = Some(error);
            }
        }

        job.lease_owner = None;
        job.lease_expires_at = None;

        Ok(true)
    }

    async fn find_job(&self, id: Uuid) -> Result<Option<Job>, StorageError> {
        let state = self.state.lock().await;
        Ok(state.jobs.iter().find(|job| job.id == id).cloned())
    }

    async fn queue_stats(&self, queue_name: &str) -> Result<QueueStats, StorageError> {
        let state = self.state.lock().await;

        let stats = state
            .jobs
            .iter()
            .filter(|job| job.queue_name == queue_name)
            .fold(QueueStats::default(), |mut stats, job| {
                match job.status {
                    JobStatus::Pending => stats.pending += 1,
                    JobStatus::Leased => stats.leased += 1,
                    JobStatus::Completed => stats.completed += 1,
                    JobStatus::Failed => stats.failed += 1,
                }
                stats
            });

        Ok(stats)
    }

    async fn upsert_receipt(&self, receipt: &Receipt) -> Result<(), StorageError> {
        let mut state = self.state.lock().await;
        state.receipts.insert(
            (receipt.notification_id, receipt.recipient.clone()),
            receipt.clone(),
        );
        Ok(())
    }

    async fn find_receipt(&self, notification_id: Uuid) -> Result<Option<Receipt>, StorageError> {
        let state = self.state.lock().await;
        Ok(state
            .receipts
            .values()
            .find(|receipt| receipt.notification_id == notification_id)
            .cloned())
    }

    async fn find_campaign(&self, id: Uuid) -> Result<Option<Campaign>, StorageError> {
        Ok(self.state.lock().await.campaigns.get(&id).cloned())
    }

    async fn find_campaign_type(&self, id: &str) -> Result<Option<CampaignType>, StorageError> {
        Ok(self.state.lock().await.campaign_types.get(id).cloned())
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

struct MemoryTransaction {
    state: Arc<Mutex<State>>,
    jobs: Vec<NewJob>,
    campaigns: Vec<Campaign>,
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn insert_job(&mut self, job: &NewJob) -> Result<(), StorageError> {
        self.jobs.push(job.clone());
        Ok(())
    }

    async fn insert_campaign(&mut self, campaign: &Campaign) -> Result<(), StorageError> {
        self.campaigns.push(campaign.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        let MemoryTransaction {
            state: shared,
            jobs,
            campaigns,
        } = *self;

        let mut state = shared.lock().await;

        if let Some(duplicate) = jobs
            .iter()
            .find(|new| state.jobs.iter().any(|job| job.id == new.id))
        {
            return Err(StorageError::Corrupt(format!(
                "job {} already exists",
                duplicate.id
            )));
        }

        let now = Utc::now();
        state
            .jobs
            .extend(jobs.into_iter().map(|job| job.into_job(now)));

        for campaign in campaigns {
            state.campaigns.insert(campaign.id, campaign);
        }

        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StorageError> {
        Ok(())
    }
}
