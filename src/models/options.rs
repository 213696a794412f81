use serde::{Deserialize, Serialize};

use crate::models::dispatch::{Dispatch, Html};

pub const USER_ENDORSEMENT: &str = "This message was sent directly to you.";
pub const EMAIL_ENDORSEMENT: &str = "This message was sent directly to your email address.";
pub const EVERYONE_ENDORSEMENT: &str = "This message was sent to everyone.";
pub const SPACE_ENDORSEMENT: &str = "You received this message because you belong to the {{space}} space in the {{organization}} organization.";
pub const ORGANIZATION_ENDORSEMENT: &str =
    "You received this message because you belong to the {{organization}} organization.";
pub const ORGANIZATION_ROLE_ENDORSEMENT: &str = "You received this message because you are an {{organization_role}} in the {{organization}} organization.";
pub const SCOPE_ENDORSEMENT: &str =
    "You received this message because you have the {{scope}} scope.";

/// Audience-agnostic message payload copied into every job of a dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Options {
    pub reply_to: String,
    pub subject: String,
    pub to: String,
    pub kind_id: String,
    pub kind_description: String,
    pub source_description: String,
    pub text: String,
    pub html: Html,
    pub endorsement: String,
}

impl Options {
    pub fn from_dispatch(dispatch: &Dispatch, endorsement: &str) -> Self {
        Self {
            reply_to: dispatch.message.reply_to.clone(),
            subject: dispatch.message.subject.clone(),
            to: dispatch.message.to.clone(),
            kind_id: dispatch.kind.id.clone(),
            kind_description: dispatch.kind.description.clone(),
            source_description: dispatch.client.description.clone(),
            text: dispatch.message.text.clone(),
            html: dispatch.message.html.clone(),
            endorsement: endorsement.to_string(),
        }
    }
}
