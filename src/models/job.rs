use std::fmt::{Display, Formatter, Result as FmtResult};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::models::message::JobPayload;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Leased,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "leased" => Some(JobStatus::Leased),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Leased => "leased",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// A durable, individually leasable unit of delivery work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub queue_name: String,
    pub payload: JsonValue,
    pub status: JobStatus,
    pub attempts: u32,
    pub active_at: DateTime<Utc>,
    pub lease_owner: Option<String>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn decode(&self) -> Result<JobPayload, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }

    /// True when a lease call at `now` may hand this job out.
    pub fn is_leasable(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            JobStatus::Pending => self.active_at <= now,
            JobStatus::Leased => self.lease_expires_at.is_some_and(|expiry| expiry <= now),
            JobStatus::Completed | JobStatus::Failed => false,
        }
    }
}

/// A job row that has not been written yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub id: Uuid,
    pub queue_name: String,
    pub payload: JsonValue,
    pub active_at: DateTime<Utc>,
}

impl NewJob {
    pub fn new(
        id: Uuid,
        queue_name: impl Into<String>,
        payload: &JobPayload,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id,
            queue_name: queue_name.into(),
            payload: serde_json::to_value(payload)?,
            active_at: Utc::now(),
        })
    }

    pub fn into_job(self, created_at: DateTime<Utc>) -> Job {
        Job {
            id: self.id,
            queue_name: self.queue_name,
            payload: self.payload,
            status: JobStatus::Pending,
            attempts: 0,
            active_at: self.active_at,
            lease_owner: None,
            lease_expires_at: None,
            last_error: None,
            created_at,
        }
    }
}

/// State written back when a leased job is handed back after a failure.
#[derive(Debug, Clone, PartialEq)]
pub enum JobRelease {
    Retry {
        attempts: u32,
        active_at: DateTime<Utc>,
        error: String,
    },
    Exhausted {
        attempts: u32,
        error: String,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: u64,
    pub leased: u64,
    pub completed: u64,
    pub failed: u64,
}
