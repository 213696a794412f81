use chrono::{DateTime, Utc};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{
    error::{DispatchError, StorageError},
    models::{
        dispatch::{Dispatch, DispatchResponse, Recipient},
        job::NewJob,
        message::{DeliveryPayload, JobPayload, OrganizationContext, SpaceContext},
        options::Options,
        status::MessageStatus,
    },
    queue::{Queue, Transaction},
};

/// Request-level data copied into every job of one dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct EnqueueContext {
    pub client_id: String,
    pub scope: Option<String>,
    pub space: SpaceContext,
    pub organization: OrganizationContext,
    pub vcap_request_id: String,
    pub uaa_host: String,
    pub received_at: DateTime<Utc>,
    pub template_id: Option<String>,
}

impl EnqueueContext {
    pub fn from_dispatch(dispatch: &Dispatch) -> Self {
        Self {
            client_id: dispatch.client.id.clone(),
            scope: None,
            space: SpaceContext::default(),
            organization: OrganizationContext::default(),
            vcap_request_id: dispatch.vcap_request.id.clone(),
            uaa_host: dispatch.uaa_host.clone(),
            received_at: dispatch.vcap_request.receipt_time,
            template_id: dispatch.template_id.clone(),
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn with_space(mut self, space: SpaceContext) -> Self {
        self.space = space;
        self
    }

    pub fn with_organization(mut self, organization: OrganizationContext) -> Self {
        self.organization = organization;
        self
    }
}

/// Turns resolved recipients into durable delivery jobs, all or nothing.
#[derive(Clone)]
pub struct Enqueuer {
    queue: Queue,
}

impl Enqueuer {
    pub fn new(queue: Queue) -> Self {
        Self { queue }
    }

    /// Writes one job per recipient inside a single transaction and wakes local
    /// workers once it commits. On any failure nothing is persisted.
    pub async fn enqueue(
        &self,
        recipients: Vec<Recipient>,
        options: &Options,
        context: &EnqueueContext,
    ) -> Result<Vec<DispatchResponse>, DispatchError> {
        let mut tx = self.queue.storage().begin().await?;

        let responses = match self.stage(tx.as_mut(), recipients, options, context).await {
            Ok(responses) => responses,
            Err(e) => {
                if let Err(rollback_error) = tx.rollback().await {
                    error!(error = %rollback_error, "Failed to roll back enqueue transaction");
                }
                return Err(e);
            }
        };

        tx.commit().await?;
        self.queue.wake();

        info!(
            vcap_request_id = %context.vcap_request_id,
            client_id = %context.client_id,
            kind_id = %options.kind_id,
            jobs = responses.len(),
            "Notification jobs enqueued"
        );

        Ok(responses)
    }

    /// Inserts the delivery jobs into a transaction owned by the caller.
    pub async fn stage(
        &self,
        tx: &mut dyn Transaction,
        recipients: Vec<Recipient>,
        options: &Options,
        context: &EnqueueContext,
    ) -> Result<Vec<DispatchResponse>, DispatchError> {
        let mut responses = Vec::with_capacity(recipients.len());

        for recipient in recipients {
            let notification_id = Uuid::new_v4();

            let response = DispatchResponse {
                status: MessageStatus::Queued.to_string(),
                recipient: recipient.guid.clone(),
                email: recipient.email.clone(),
                notification_id,
                vcap_request_id: context.vcap_request_id.clone(),
            };

            let payload = JobPayload::Delivery(DeliveryPayload {
                notification_id,
                recipient,
                options: options.clone(),
                client_id: context.client_id.clone(),
                scope: context.scope.clone(),
                space: context.space.clone(),
                organization: context.organization.clone(),
                vcap_request_id: context.vcap_request_id.clone(),
                uaa_host: context.uaa_host.clone(),
                received_at: context.received_at,
                template_id: context.template_id.clone(),
            });

            let job = NewJob::new(notification_id, self.queue.name(), &payload)
                .map_err(StorageError::from)?;

            tx.insert_job(&job).await?;

            debug!(
                notification_id = %notification_id,
                recipient = %response.recipient,
                "Delivery job staged"
            );

            responses.push(response);
        }

        Ok(responses)
    }
}
