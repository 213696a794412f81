use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    dispatch::{OrganizationRole, Recipient},
    options::Options,
};

/// Body of a job row, tagged by the kind of work it describes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    Delivery(DeliveryPayload),
    Campaign(CampaignPayload),
}

impl JobPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            JobPayload::Delivery(_) => "delivery",
            JobPayload::Campaign(_) => "campaign",
        }
    }
}

/// Everything a worker needs to deliver one message to one recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryPayload {
    pub notification_id: Uuid,
    pub recipient: Recipient,
    pub options: Options,
    pub client_id: String,

    #[serde(default)]
    pub scope: Option<String>,

    #[serde(default)]
    pub space: SpaceContext,

    #[serde(default)]
    pub organization: OrganizationContext,

    pub vcap_request_id: String,
    pub uaa_host: String,
    pub received_at: DateTime<Utc>,

    #[serde(default)]
    pub template_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceContext {
    pub guid: String,
    pub name: String,
    pub organization_guid: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationContext {
    pub guid: String,
    pub name: String,

    #[serde(default)]
    pub role: Option<OrganizationRole>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignPayload {
    pub campaign_id: Uuid,
    pub client_id: String,
    pub vcap_request_id: String,
    pub uaa_host: String,
    pub received_at: DateTime<Utc>,
}
