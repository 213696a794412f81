use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::{
    clients::{directory::DirectoryAdapter, template::TemplateResolver},
    error::{DispatchError, StorageError, TemplateError, ValidationError},
    models::{
        campaign::{Campaign, CampaignAudience, CampaignRequest, CampaignType},
        directory::EntityKind,
        job::NewJob,
        message::{CampaignPayload, JobPayload},
    },
    queue::Queue,
};

pub const CRITICAL_SCOPE: &str = "critical_notifications.write";

/// Caller identity and correlation data for a campaign submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignContext {
    pub uaa_host: String,
    pub vcap_request_id: String,
    pub received_at: DateTime<Utc>,
}

/// Validates and persists campaigns. Per-recipient fan-out happens later, when
/// the campaign job is delivered.
pub struct CampaignsCollection {
    directory: Arc<dyn DirectoryAdapter>,
    templates: Arc<dyn TemplateResolver>,
    queue: Queue,
    default_template_id: String,
}

impl CampaignsCollection {
    pub fn new(
        directory: Arc<dyn DirectoryAdapter>,
        templates: Arc<dyn TemplateResolver>,
        queue: Queue,
        default_template_id: String,
    ) -> Self {
        Self {
            directory,
            templates,
            queue,
            default_template_id,
        }
    }

    pub async fn create(
        &self,
        request: CampaignRequest,
        can_send_critical: bool,
        context: &CampaignContext,
    ) -> Result<Campaign, DispatchError> {
        self.check_audience(&request, &context.uaa_host).await?;

        let campaign_type = self.load_campaign_type(&request.campaign_type_id).await?;

        if campaign_type.critical && !can_send_critical {
            return Err(ValidationError::Permission(format!(
                "Scope {CRITICAL_SCOPE} is required"
            ))
            .into());
        }

        let template_id = request
            .template_id
            .clone()
            .or_else(|| campaign_type.template_id.clone())
            .unwrap_or_else(|| self.default_template_id.clone());

        match self.templates.resolve(&template_id).await {
            Ok(_) => {}
            Err(TemplateError::NotFound(_)) => {
                return Err(ValidationError::NotFound(format!(
                    "Template with id {template_id:?} could not be found"
                ))
                .into());
            }
            Err(e) => return Err(e.into()),
        }

        let campaign = Campaign::from_request(request, template_id);
        self.persist(&campaign, context).await?;

        info!(
            campaign_id = %campaign.id,
            campaign_type_id = %campaign.campaign_type_id,
            audience = campaign.send_to.audience.as_str(),
            vcap_request_id = %context.vcap_request_id,
            "Campaign created"
        );

        Ok(campaign)
    }

    async fn check_audience(
        &self,
        request: &CampaignRequest,
        uaa_host: &str,
    ) -> Result<(), DispatchError> {
        let kind = match request.send_to.audience {
            CampaignAudience::Email => return Ok(()),
            CampaignAudience::User => EntityKind::User,
            CampaignAudience::Space => EntityKind::Space,
            CampaignAudience::Org => EntityKind::Organization,
        };

        let token = self.directory.load_token(uaa_host).await?;
        let target = &request.send_to.target;

        if !self.directory.exists(&token, kind, target).await? {
            return Err(ValidationError::NotFound(format!(
                "The {} {:?} cannot be found",
                kind.as_str(),
                target
            ))
            .into());
        }

        Ok(())
    }

    async fn load_campaign_type(&self, id: &str) -> Result<CampaignType, DispatchError> {
        self.queue
            .storage()
            .find_campaign_type(id)
            .await?
            .ok_or_else(|| {
                ValidationError::NotFound(format!(
                    "Campaign type with id {id:?} could not be found"
                ))
                .into()
            })
    }

    async fn persist(
        &self,
        campaign: &Campaign,
        context: &CampaignContext,
    ) -> Result<(), DispatchError> {
        let payload = JobPayload::Campaign(CampaignPayload {
            campaign_id: campaign.id,
            client_id: campaign.client_id.clone(),
            vcap_request_id: context.vcap_request_id.clone(),
            uaa_host: context.uaa_host.clone(),
            received_at: context.received_at,
        });

        let job =
            NewJob::new(campaign.id, self.queue.name(), &payload).map_err(StorageError::from)?;

        let mut tx = self.queue.storage().begin().await?;

        let staged = async {
            tx.insert_campaign(campaign).await?;
            tx.insert_job(&job).await
        }
        .await;

        if let Err(e) = staged {
            if let Err(rollback_error) = tx.rollback().await {
                error!(error = %rollback_error, "Failed to roll back campaign transaction");
            }
            return Err(e.into());
        }

        tx.commit().await?;
        self.queue.wake();

        Ok(())
    }
}
