use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::StorageError,
    models::{
        campaign::{Campaign, CampaignType},
        job::{Job, JobRelease, NewJob, QueueStats},
        receipt::Receipt,
    },
};

/// Relational store behind the queue, receipts and campaigns.
///
/// Every claim and release must be atomic with respect to concurrent callers:
/// two overlapping `claim_job` calls never return the same job.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn Transaction>, StorageError>;

    /// Atomically leases the oldest eligible job on `queue_name` to `owner`.
    async fn claim_job(
        &self,
        queue_name: &str,
        owner: &str,
        now: DateTime<Utc>,
        lease_expires_at: DateTime<Utc>,
    ) -> Result<Option<Job>, StorageError>;

    /// Marks a pending or leased job completed. Returns `false` when it is terminal or unknown.
    async fn complete_job(&self, id: Uuid) -> Result<bool, StorageError>;

    /// Hands a leased job back. Returns `false` when `owner` no longer holds the lease.
    async fn release_job(
        &self,
        id: Uuid,
        owner: &str,
        release: JobRelease,
    ) -> Result<bool, StorageError>;

    async fn find_job(&self, id: Uuid) -> Result<Option<Job>, StorageError>;

    async fn queue_stats(&self, queue_name: &str) -> Result<QueueStats, StorageError>;

    async fn upsert_receipt(&self, receipt: &Receipt) -> Result<(), StorageError>;

    async fn find_receipt(&self, notification_id: Uuid) -> Result<Option<Receipt>, StorageError>;

    async fn find_campaign(&self, id: Uuid) -> Result<Option<Campaign>, StorageError>;

    async fn find_campaign_type(&self, id: &str) -> Result<Option<CampaignType>, StorageError>;

    async fn health_check(&self) -> Result<(), StorageError>;
}

/// Writes staged inside one storage transaction; nothing is visible until `commit`.
#[async_trait]
pub trait Transaction: Send {
    async fn insert_job(&mut self, job: &NewJob) -> Result<(), StorageError>;

    async fn insert_campaign(&mut self, campaign: &Campaign) -> Result<(), StorageError>;

    async fn commit(self: Box<Self>) -> Result<(), StorageError>;

    async fn rollback(self: Box<Self>) -> Result<(), StorageError>;
}
