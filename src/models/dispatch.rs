use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One logical request to notify an audience.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub audience: Audience,
    pub kind: DispatchKind,
    pub client: DispatchClient,
    pub message: DispatchMessage,
    pub uaa_host: String,
    pub vcap_request: VcapRequest,
    pub template_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    User(String),
    Space(String),
    Organization {
        guid: String,
        role: Option<OrganizationRole>,
    },
    Everyone,
    UaaScope(String),
    Email(String),
}

impl Audience {
    pub fn kind(&self) -> &'static str {
        match self {
            Audience::User(_) => "user",
            Audience::Space(_) => "space",
            Audience::Organization { .. } => "organization",
            Audience::Everyone => "everyone",
            Audience::UaaScope(_) => "uaa_scope",
            Audience::Email(_) => "email",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrganizationRole {
    OrgManager,
    OrgAuditor,
    BillingManager,
}

impl OrganizationRole {
    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "OrgManager" | "org_manager" => Some(OrganizationRole::OrgManager),
            "OrgAuditor" | "org_auditor" => Some(OrganizationRole::OrgAuditor),
            "BillingManager" | "billing_manager" => Some(OrganizationRole::BillingManager),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            OrganizationRole::OrgManager => "Organization Manager",
            OrganizationRole::OrgAuditor => "Organization Auditor",
            OrganizationRole::BillingManager => "Billing Manager",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchKind {
    pub id: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchClient {
    pub id: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Html {
    pub body_content: String,
    pub body_attributes: String,
    pub head: String,
    pub doctype: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchMessage {
    pub reply_to: String,
    pub subject: String,
    pub to: String,
    pub text: String,
    pub html: Html,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VcapRequest {
    pub id: String,
    pub receipt_time: DateTime<Utc>,
}

/// A resolved delivery target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub guid: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Recipient {
    pub fn user(guid: impl Into<String>) -> Self {
        Self {
            guid: guid.into(),
            email: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Per-recipient acknowledgement returned synchronously from a dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchResponse {
    pub status: String,
    pub recipient: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    pub notification_id: Uuid,
    pub vcap_request_id: String,
}
