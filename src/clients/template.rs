use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};

use crate::{config::Config, error::TemplateError, models::template::Template};

#[async_trait]
pub trait TemplateResolver: Send + Sync {
    async fn resolve(&self, template_id: &str) -> Result<Template, TemplateError>;
}

pub struct HttpTemplateResolver {
    http_client: Client,
    base_url: String,
}

impl HttpTemplateResolver {
    pub fn new(config: &Config) -> Result<Self, TemplateError> {
        Self::with_base_url(&config.template_service_url, config.http_timeout())
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self, TemplateError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TemplateError::Unavailable(format!("Failed to create HTTP client: {e}")))?;

        info!(base_url, "Template service client initialized");

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl TemplateResolver for HttpTemplateResolver {
    async fn resolve(&self, template_id: &str) -> Result<Template, TemplateError> {
        let url = format!("{}/templates/{}", self.base_url, template_id);

        debug!(template_id, "Fetching template from service");

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| TemplateError::Unavailable(e.to_string()))?;

        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(TemplateError::NotFound(template_id.to_string()));
        }

        if !status.is_success() {
            warn!(template_id, status = %status, "Template service returned an error");
            return Err(TemplateError::Unavailable(format!(
                "Template service returned status {status}"
            )));
        }

        let mut template: Template = response
            .json()
            .await
            .map_err(|e| TemplateError::Render(format!("Failed to parse template JSON: {e}")))?;

        if template.id.is_empty() {
            template.id = template_id.to_string();
        }

        Ok(template)
    }
}
