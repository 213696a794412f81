use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{message::DeliveryPayload, status::MessageStatus};

/// Terminal delivery outcome for one recipient of one notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub notification_id: Uuid,
    pub recipient: String,
    pub email: Option<String>,
    pub client_id: String,
    pub kind_id: String,
    pub vcap_request_id: String,
    pub status: MessageStatus,
    pub error_message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Receipt {
    pub fn new(
        notification_id: Uuid,
        recipient: String,
        client_id: String,
        kind_id: String,
        status: MessageStatus,
    ) -> Self {
        Self {
            notification_id,
            recipient,
            email: None,
            client_id,
            kind_id,
            vcap_request_id: String::new(),
            status,
            error_message: None,
            updated_at: Utc::now(),
        }
    }

    pub fn for_payload(payload: &DeliveryPayload, status: MessageStatus) -> Self {
        let receipt = Self::new(
            payload.notification_id,
            payload.recipient.guid.clone(),
            payload.client_id.clone(),
            payload.options.kind_id.clone(),
            status,
        )
        .with_request_id(payload.vcap_request_id.clone());

        match &payload.recipient.email {
            Some(email) => receipt.with_email(email.clone()),
            None => receipt,
        }
    }

    pub fn with_email(mut self, email: String) -> Self {
        self.email = Some(email);
        self
    }

    pub fn with_error(mut self, error: String) -> Self {
        self.error_message = Some(error);
        self
    }

    pub fn with_request_id(mut self, vcap_request_id: String) -> Self {
        self.vcap_request_id = vcap_request_id;
        self
    }
}
