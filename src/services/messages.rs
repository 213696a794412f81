use serde::Serialize;
use uuid::Uuid;

use crate::{
    error::StorageError,
    models::{job::JobStatus, status::MessageStatus},
    queue::Queue,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageRecord {
    pub notification_id: Uuid,
    pub status: MessageStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Answers "what happened to notification X". A receipt is authoritative; before
/// one exists the job row stands in for it.
#[derive(Clone)]
pub struct MessageFinder {
    queue: Queue,
}

impl MessageFinder {
    pub fn new(queue: Queue) -> Self {
        Self { queue }
    }

    pub async fn find(&self, notification_id: Uuid) -> Result<Option<MessageRecord>, StorageError> {
        let storage = self.queue.storage();

        if let Some(receipt) = storage.find_receipt(notification_id).await? {
            return Ok(Some(MessageRecord {
                notification_id,
                status: receipt.status,
                recipient: Some(receipt.recipient),
                error: receipt.error_message,
            }));
        }

        let Some(job) = storage.find_job(notification_id).await? else {
            return Ok(None);
        };

        let status = match job.status {
            JobStatus::Pending | JobStatus::Leased => MessageStatus::Queued,
            JobStatus::Completed => MessageStatus::Delivered,
            JobStatus::Failed => MessageStatus::Failed,
        };

        Ok(Some(MessageRecord {
            notification_id,
            status,
            recipient: None,
            error: job.last_error,
        }))
    }
}
