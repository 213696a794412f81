use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailMessage {
    pub from: String,
    pub to: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,

    pub subject: String,
    pub text: String,
    pub html: String,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MailRelayRequest<'a> {
    pub message: &'a MailMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailRelayResponse {
    pub message_id: Option<String>,
    pub error: Option<String>,
}
