use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    clients::{directory::DirectoryAdapter, mail::MailTransport, template::TemplateResolver},
    error::DeliveryError,
    models::{
        campaign::{Campaign, CampaignAudience},
        dispatch::{
            Audience, Dispatch, DispatchClient, DispatchKind, DispatchMessage, Html, VcapRequest,
        },
        job::Job,
        mail::MailMessage,
        message::{CampaignPayload, DeliveryPayload, JobPayload},
    },
    queue::Queue,
    services::strategy::{Dispatcher, Strategy},
    utils::{render, render_template},
};

/// Successful result of handling one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivered {
    Message {
        notification_id: Uuid,
        email: String,
        message_id: String,
    },
    Campaign {
        campaign_id: Uuid,
        enqueued: usize,
    },
}

#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    async fn deliver(&self, job: &Job) -> Result<Delivered, DeliveryError>;
}

/// Renders and mails one delivery payload.
pub struct MailDeliveryHandler {
    directory: Arc<dyn DirectoryAdapter>,
    templates: Arc<dyn TemplateResolver>,
    transport: Arc<dyn MailTransport>,
    default_template_id: String,
    sender: String,
}

impl MailDeliveryHandler {
    pub fn new(
        directory: Arc<dyn DirectoryAdapter>,
        templates: Arc<dyn TemplateResolver>,
        transport: Arc<dyn MailTransport>,
        default_template_id: String,
        sender: String,
    ) -> Self {
        Self {
            directory,
            templates,
            transport,
            default_template_id,
            sender,
        }
    }

    pub async fn deliver_payload(
        &self,
        payload: &DeliveryPayload,
    ) -> Result<Delivered, DeliveryError> {
        let email = self.resolve_email(payload).await?;

        let template_id = payload
            .template_id
            .as_deref()
            .unwrap_or(&self.default_template_id);

        let template = self.templates.resolve(template_id).await?;
        let variables = variables_for(payload, &email)?;
        let content = render_template(&template, &variables)?;

        let message = MailMessage {
            from: self.sender.clone(),
            to: email.clone(),
            reply_to: Some(payload.options.reply_to.clone()).filter(|r| !r.is_empty()),
            subject: content.subject,
            text: content.text,
            html: content.html,
            headers: headers_for(payload),
        };

        let message_id = self.transport.send(&message).await?;

        info!(
            notification_id = %payload.notification_id,
            recipient = %payload.recipient.guid,
            message_id = %message_id,
            "Notification delivered"
        );

        Ok(Delivered::Message {
            notification_id: payload.notification_id,
            email,
            message_id,
        })
    }

    async fn resolve_email(&self, payload: &DeliveryPayload) -> Result<String, DeliveryError> {
        if let Some(email) = &payload.recipient.email {
            return Ok(email.clone());
        }

        let guid = &payload.recipient.guid;
        let token = self.directory.load_token(&payload.uaa_host).await?;
        let mut emails = self
            .directory
            .user_emails(&token, std::slice::from_ref(guid))
            .await?;

        emails.remove(guid).ok_or_else(|| {
            warn!(recipient = %guid, "Recipient has no email address");
            DeliveryError::permanent(format!("User {guid:?} has no email address"))
        })
    }
}

/// Endorsement placeholders are filled first, then the rendered endorsement becomes
/// a variable of the main template.
fn variables_for(
    payload: &DeliveryPayload,
    email: &str,
) -> Result<HashMap<&'static str, String>, DeliveryError> {
    let options = &payload.options;

    let mut variables: HashMap<&'static str, String> = HashMap::from([
        ("space", payload.space.name.clone()),
        ("organization", payload.organization.name.clone()),
        (
            "organization_role",
            payload
                .organization
                .role
                .map(|role| role.label().to_string())
                .unwrap_or_default(),
        ),
        ("scope", payload.scope.clone().unwrap_or_default()),
    ]);

    let endorsement = render(&options.endorsement, &variables)?;

    variables.extend([
        ("endorsement", endorsement),
        ("subject", options.subject.clone()),
        ("text", options.text.clone()),
        ("html", options.html.body_content.clone()),
        ("html_head", options.html.head.clone()),
        ("kind_id", options.kind_id.clone()),
        ("kind_description", options.kind_description.clone()),
        ("source_description", options.source_description.clone()),
        ("client_id", payload.client_id.clone()),
        ("reply_to", options.reply_to.clone()),
        ("to", email.to_string()),
        ("user_guid", payload.recipient.guid.clone()),
        ("notification_id", payload.notification_id.to_string()),
        ("vcap_request_id", payload.vcap_request_id.clone()),
    ]);

    Ok(variables)
}

fn headers_for(payload: &DeliveryPayload) -> HashMap<String, String> {
    HashMap::from([
        ("X-CF-Client-ID".to_string(), payload.client_id.clone()),
        (
            "X-CF-Notification-ID".to_string(),
            payload.notification_id.to_string(),
        ),
        (
            "X-CF-Notification-Request".to_string(),
            payload.vcap_request_id.clone(),
        ),
        (
            "X-CF-Notification-Timestamp".to_string(),
            payload.received_at.to_rfc3339(),
        ),
    ])
}

/// Expands a campaign job into per-recipient delivery jobs.
pub struct CampaignDeliveryHandler {
    queue: Queue,
    dispatcher: Arc<Dispatcher>,
}

impl CampaignDeliveryHandler {
    pub fn new(queue: Queue, dispatcher: Arc<Dispatcher>) -> Self {
        Self { queue, dispatcher }
    }

    pub async fn deliver_campaign(
        &self,
        payload: &CampaignPayload,
    ) -> Result<Delivered, DeliveryError> {
        let campaign = self
            .queue
            .storage()
            .find_campaign(payload.campaign_id)
            .await?
            .ok_or_else(|| {
                DeliveryError::permanent(format!("Campaign {} not found", payload.campaign_id))
            })?;

        let dispatch = campaign_dispatch(&campaign, payload);
        let responses = self.dispatcher.dispatch(&dispatch).await?;

        info!(
            campaign_id = %campaign.id,
            enqueued = responses.len(),
            "Campaign fanned out"
        );

        Ok(Delivered::Campaign {
            campaign_id: campaign.id,
            enqueued: responses.len(),
        })
    }
}

fn campaign_dispatch(campaign: &Campaign, payload: &CampaignPayload) -> Dispatch {
    let target = campaign.send_to.target.clone();

    let audience = match campaign.send_to.audience {
        CampaignAudience::User => Audience::User(target),
        CampaignAudience::Space => Audience::Space(target),
        CampaignAudience::Org => Audience::Organization {
            guid: target,
            role: None,
        },
        CampaignAudience::Email => Audience::Email(target),
    };

    Dispatch {
        audience,
        kind: DispatchKind {
            id: campaign.campaign_type_id.clone(),
            description: String::new(),
        },
        client: DispatchClient {
            id: campaign.client_id.clone(),
            description: String::new(),
        },
        message: DispatchMessage {
            reply_to: campaign.reply_to.clone(),
            subject: campaign.subject.clone(),
            to: String::new(),
            text: campaign.text.clone(),
            html: Html {
                body_content: campaign.html.clone(),
                ..Html::default()
            },
        },
        uaa_host: payload.uaa_host.clone(),
        vcap_request: VcapRequest {
            id: payload.vcap_request_id.clone(),
            receipt_time: payload.received_at,
        },
        template_id: Some(campaign.template_id.clone()),
    }
}

/// Decodes a job and hands it to the handler for its payload kind.
pub struct JobRouter {
    mail: MailDeliveryHandler,
    campaigns: CampaignDeliveryHandler,
}

impl JobRouter {
    pub fn new(mail: MailDeliveryHandler, campaigns: CampaignDeliveryHandler) -> Self {
        Self { mail, campaigns }
    }
}

#[async_trait]
impl DeliveryHandler for JobRouter {
    async fn deliver(&self, job: &Job) -> Result<Delivered, DeliveryError> {
        let payload = job.decode().map_err(|e| {
            DeliveryError::permanent(format!("Malformed payload on job {}: {e}", job.id))
        })?;

        debug!(job_id = %job.id, kind = payload.kind(), "Delivering job");

        match payload {
            JobPayload::Delivery(payload) => self.mail.deliver_payload(&payload).await,
            JobPayload::Campaign(payload) => self.campaigns.deliver_campaign(&payload).await,
        }
    }
}
