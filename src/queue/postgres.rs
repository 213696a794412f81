use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool, Postgres};
use tracing::{debug, error};
use uuid::Uuid;

use crate::{
    error::StorageError,
    models::{
        campaign::{Campaign, CampaignAudience, CampaignType, SendTo},
        job::{Job, JobRelease, JobStatus, NewJob, QueueStats},
        receipt::Receipt,
        status::MessageStatus,
    },
    queue::storage::{Storage, Transaction},
};

const JOB_COLUMNS: &str = "id, queue_name, payload, status, attempts, active_at, lease_owner, lease_expires_at, last_error, created_at";

/// Postgres-backed storage. Claims use `FOR UPDATE SKIP LOCKED`, so concurrent
/// workers never block on, or double-lease, the same row.
#[derive(Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn begin(&self) -> Result<Box<dyn Transaction>, StorageError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresTransaction { tx }))
    }

    async fn claim_job(
        &self,
        queue_name: &str,
        owner: &str,
        now: DateTime<Utc>,
        lease_expires_at: DateTime<Utc>,
    ) -> Result<Option<Job>, StorageError> {
        let query = format!(
            r#"
            UPDATE jobs
            SET status = 'leased',
                lease_owner = $2,
                lease_expires_at = $4,
                updated_at = $3
            WHERE id = (
                SELECT id FROM jobs
                WHERE queue_name = $1
                  AND ((status = 'pending' AND active_at <= $3)
                    OR (status = 'leased' AND lease_expires_at <= $3))
                ORDER BY active_at, created_at
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {JOB_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, JobRow>(&query)
            .bind(queue_name)
            .bind(owner)
            .bind(now)
            .bind(lease_expires_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!(error = %e, queue = queue_name, "Failed to claim job");
                e
            })?;

        row.map(Job::try_from).transpose()
    }

    async fn complete_job(&self, id: Uuid) -> Result<bool, StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'completed',
                lease_owner = NULL,
                lease_expires_at = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status IN ('pending', 'leased')
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn release_job(
        &self,
        id: Uuid,
        owner: &str,
        release: JobRelease,
    ) -> Result<bool, StorageError> {
        let result = match release {
            JobRelease::Retry {
                attempts,
                active_at,
                error,
            } => {
                sqlx::query(
                    r#"
                    UPDATE jobs
                    SET status = 'pending',
                        attempts = $3,
                        active_at = $4,
                        last_error = $5,
                        lease_owner = NULL,
                        lease_expires_at = NULL,
                        updated_at = NOW()
                    WHERE id = $1 AND status = 'leased' AND lease_owner = $2
                    "#,
                )
                .bind(id)
                .bind(owner)
                .bind(attempts_to_db(attempts))
                .bind(active_at)
                .bind(error)
                .execute(&self.pool)
                .await?
            }
            JobRelease::Exhausted { attempts, error } => {
                sqlx::query(
                    r#"
                    UPDATE jobs
                    SET status = 'failed',
                        attempts = $3,
                        last_error = $4,
                        lease_owner = NULL,
                        lease_expires_at = NULL,
                        updated_at = NOW()
                    WHERE id = $1 AND status = 'leased' AND lease_owner = $2
                    "#,
                )
                .bind(id)
                .bind(owner)
                .bind(attempts_to_db(attempts))
                .bind(error)
                .execute(&self.pool)
                .await?
            }
        };

        Ok(result.rows_affected() == 1)
    }

    async fn find_job(&self, id: Uuid) -> Result<Option<Job>, StorageError> {
        let query = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1");

        let row = sqlx::query_as::<_, JobRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Job::try_from).transpose()
    }

    async fn queue_stats(&self, queue_name: &str) -> Result<QueueStats, StorageError> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT status, COUNT(*)
            FROM jobs
            WHERE queue_name = $1
            GROUP BY status
            "#,
        )
        .bind(queue_name)
        .fetch_all(&self.pool)
        .await?;

        let mut stats = QueueStats::default();
        for (status, count) in rows {
            let count = u64::try_from(count).unwrap_or_default();
            match JobStatus::from_string(&status) {
                Some(JobStatus::Pending) => stats.pending = count,
                Some(JobStatus::Leased) => stats.leased = count,
                Some(JobStatus::Completed) => stats.completed = count,
                Some(JobStatus::Failed) => stats.failed = count,
                None => return Err(StorageError::Corrupt(format!("unknown job status {status:?}"))),
            }
        }

        Ok(stats)
    }

    async fn upsert_receipt(&self, receipt: &Receipt) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO receipts (
                notification_id,
                recipient,
                email,
                client_id,
                kind_id,
                vcap_request_id,
                status,
                error_message,
                updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (notification_id, recipient)
            DO UPDATE SET
                email = EXCLUDED.email,
                status = EXCLUDED.status,
                error_message = EXCLUDED.error_message,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(receipt.notification_id)
        .bind(&receipt.recipient)
        .bind(&receipt.email)
        .bind(&receipt.client_id)
        .bind(&receipt.kind_id)
        .bind(&receipt.vcap_request_id)
        .bind(receipt.status.to_string())
        .bind(&receipt.error_message)
        .bind(receipt.updated_at)
        .execute(&self.pool)
        .await?;

        debug!(
            notification_id = %receipt.notification_id,
            status = %receipt.status,
            "Receipt written to database"
        );

        Ok(())
    }

    async fn find_receipt(&self, notification_id: Uuid) -> Result<Option<Receipt>, StorageError> {
        let row = sqlx::query_as::<_, ReceiptRow>(
            r#"
            SELECT notification_id, recipient, email, client_id, kind_id,
                   vcap_request_id, status, error_message, updated_at
            FROM receipts
            WHERE notification_id = $1
            LIMIT 1
            "#,
        )
        .bind(notification_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Receipt::try_from).transpose()
    }

    async fn find_campaign(&self, id: Uuid) -> Result<Option<Campaign>, StorageError> {
        let row = sqlx::query_as::<_, CampaignRow>(
            r#"
            SELECT id, send_to_audience, send_to_target, campaign_type_id, text, html,
                   subject, template_id, reply_to, sender_id, client_id, created_at
            FROM campaigns
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Campaign::try_from).transpose()
    }

    async fn find_campaign_type(&self, id: &str) -> Result<Option<CampaignType>, StorageError> {
        let row = sqlx::query_as::<_, (String, String, String, bool, Option<String>)>(
            r#"
            SELECT id, name, description, critical, template_id
            FROM campaign_types
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(
            |(id, name, description, critical, template_id)| CampaignType {
                id,
                name,
                description,
                critical,
                template_id,
            },
        ))
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

struct PostgresTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl Transaction for PostgresTransaction {
    async fn insert_job(&mut self, job: &NewJob) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO jobs (id, queue_name, payload, status, attempts, active_at, created_at, updated_at)
            VALUES ($1, $2, $3, 'pending', 0, $4, NOW(), NOW())
            "#,
        )
        .bind(job.id)
        .bind(&job.queue_name)
        .bind(&job.payload)
        .bind(job.active_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn insert_campaign(&mut self, campaign: &Campaign) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO campaigns (
                id, send_to_audience, send_to_target, campaign_type_id, text, html,
                subject, template_id, reply_to, sender_id, client_id, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(campaign.id)
        .bind(campaign.send_to.audience.as_str())
        .bind(&campaign.send_to.target)
        .bind(&campaign.campaign_type_id)
        .bind(&campaign.text)
        .bind(&campaign.html)
        .bind(&campaign.subject)
        .bind(&campaign.template_id)
        .bind(&campaign.reply_to)
        .bind(&campaign.sender_id)
        .bind(&campaign.client_id)
        .bind(campaign.created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StorageError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

fn attempts_to_db(attempts: u32) -> i32 {
    i32::try_from(attempts).unwrap_or(i32::MAX)
}

#[derive(FromRow)]
struct JobRow {
    id: Uuid,
    queue_name: String,
    payload: JsonValue,
    status: String,
    attempts: i32,
    active_at: DateTime<Utc>,
    lease_owner: Option<String>,
    lease_expires_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for Job {
    type Error = StorageError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let status = JobStatus::from_string(&row.status)
            .ok_or_else(|| StorageError::Corrupt(format!("unknown job status {:?}", row.status)))?;

        let attempts = u32::try_from(row.attempts)
            .map_err(|_| StorageError::Corrupt(format!("negative attempts on job {}", row.id)))?;

        Ok(Job {
            id: row.id,
            queue_name: row.queue_name,
            payload: row.payload,
            status,
            attempts,
            active_at: row.active_at,
            lease_owner: row.lease_owner,
            lease_expires_at: row.lease_expires_at,
            last_error: row.last_error,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct ReceiptRow {
    notification_id: Uuid,
    recipient: String,
    email: Option<String>,
    client_id: String,
    kind_id: String,
    vcap_request_id: String,
    status: String,
    error_message: Option<String>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ReceiptRow> for Receipt {
    type Error = StorageError;

    fn try_from(row: ReceiptRow) -> Result<Self, Self::Error> {
        let status = MessageStatus::from_string(&row.status).ok_or_else(|| {
            StorageError::Corrupt(format!("unknown receipt status {:?}", row.status))
        })?;

        Ok(Receipt {
            notification_id: row.notification_id,
            recipient: row.recipient,
            email: row.email,
            client_id: row.client_id,
            kind_id: row.kind_id,
            vcap_request_id: row.vcap_request_id,
            status,
            error_message: row.error_message,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct CampaignRow {
    id: Uuid,
    send_to_audience: String,
    send_to_target: String,
    campaign_type_id: String,
    text: String,
    html: String,
    subject: String,
    template_id: String,
    reply_to: String,
    sender_id: String,
    client_id: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<CampaignRow> for Campaign {
    type Error = StorageError;

    fn try_from(row: CampaignRow) -> Result<Self, Self::Error> {
        let audience = CampaignAudience::from_string(&row.send_to_audience).ok_or_else(|| {
            StorageError::Corrupt(format!(
                "unknown campaign audience {:?}",
                row.send_to_audience
            ))
        })?;

        Ok(Campaign {
            id: row.id,
            send_to: SendTo {
                audience,
                target: row.send_to_target,
            },
            campaign_type_id: row.campaign_type_id,
            text: row.text,
            html: row.html,
            subject: row.subject,
            template_id: row.template_id,
            reply_to: row.reply_to,
            sender_id: row.sender_id,
            client_id: row.client_id,
            created_at: row.created_at,
        })
    }
}
