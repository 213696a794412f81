use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignAudience {
    User,
    Space,
    Org,
    Email,
}

impl CampaignAudience {
    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "user" => Some(CampaignAudience::User),
            "space" => Some(CampaignAudience::Space),
            "org" => Some(CampaignAudience::Org),
            "email" => Some(CampaignAudience::Email),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignAudience::User => "user",
            CampaignAudience::Space => "space",
            CampaignAudience::Org => "org",
            CampaignAudience::Email => "email",
        }
    }
}

/// The single audience a campaign is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendTo {
    pub audience: CampaignAudience,
    pub target: String,
}

impl SendTo {
    /// Parses the `{"<audience>": "<target>"}` shape clients send.
    pub fn from_map(send_to: &HashMap<String, String>) -> Result<Self, ValidationError> {
        let mut entries = send_to.iter();

        let (Some((audience, target)), None) = (entries.next(), entries.next()) else {
            return Err(ValidationError::Invalid(
                "send_to must name exactly one audience".to_string(),
            ));
        };

        let audience = CampaignAudience::from_string(audience).ok_or_else(|| {
            ValidationError::Invalid(format!("The {:?} audience is not valid", audience))
        })?;

        Ok(Self {
            audience,
            target: target.clone(),
        })
    }
}

/// Campaign as submitted by a client, before validation and persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignRequest {
    pub send_to: SendTo,
    pub campaign_type_id: String,
    pub text: String,
    pub html: String,
    pub subject: String,
    pub template_id: Option<String>,
    pub reply_to: String,
    pub sender_id: String,
    pub client_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub send_to: SendTo,
    pub campaign_type_id: String,
    pub text: String,
    pub html: String,
    pub subject: String,
    pub template_id: String,
    pub reply_to: String,
    pub sender_id: String,
    pub client_id: String,
    pub created_at: DateTime<Utc>,
}

impl Campaign {
    pub fn from_request(request: CampaignRequest, template_id: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            send_to: request.send_to,
            campaign_type_id: request.campaign_type_id,
            text: request.text,
            html: request.html,
            subject: request.subject,
            template_id,
            reply_to: request.reply_to,
            sender_id: request.sender_id,
            client_id: request.client_id,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignType {
    pub id: String,
    pub name: String,
    pub description: String,
    pub critical: bool,
    pub template_id: Option<String>,
}
