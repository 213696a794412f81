use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub subject: String,

    #[serde(default)]
    pub text: String,

    #[serde(default)]
    pub html: String,
}

/// Template output for one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateContent {
    pub subject: String,
    pub text: String,
    pub html: String,
}
