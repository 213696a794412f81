use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use dotenvy::dotenv;
use serde::Deserialize;

use crate::{models::retry::RetryConfig, queue::QueueConfig, worker::WorkerConfig};

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    pub database_url: String,
    #[serde(default = "defaults::database_max_connections")]
    pub database_max_connections: u32,

    #[serde(default = "defaults::queue_name")]
    pub queue_name: String,
    #[serde(default = "defaults::lease_timeout_seconds")]
    pub lease_timeout_seconds: u64,
    #[serde(default = "defaults::queue_wait_max_ms")]
    pub queue_wait_max_ms: u64,
    #[serde(default = "defaults::queue_poll_interval_ms")]
    pub queue_poll_interval_ms: u64,

    #[serde(default = "defaults::max_retry_attempts")]
    pub max_retry_attempts: u32,
    #[serde(default = "defaults::initial_retry_delay_ms")]
    pub initial_retry_delay_ms: u64,
    #[serde(default = "defaults::max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
    #[serde(default = "defaults::retry_backoff_multiplier")]
    pub retry_backoff_multiplier: u64,
    #[serde(default = "defaults::retry_jitter_factor")]
    pub retry_jitter_factor: f64,

    #[serde(default = "defaults::worker_concurrency")]
    pub worker_concurrency: usize,

    pub uaa_host: String,
    pub uaa_client_id: String,
    pub uaa_client_secret: String,
    pub cc_host: String,
    #[serde(default)]
    pub default_uaa_scopes: Vec<String>,

    pub template_service_url: String,
    #[serde(default = "defaults::default_template_id")]
    pub default_template_id: String,

    pub mail_relay_url: String,
    pub sender: String,

    #[serde(default = "defaults::http_timeout_seconds")]
    pub http_timeout_seconds: u64,

    #[serde(default = "defaults::server_port")]
    pub server_port: u16,

    #[serde(default = "defaults::log_format")]
    pub log_format: String,
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        dotenv().ok();
        Self::from_vars(std::env::vars())
    }

    /// Builds a config from `KEY=value` pairs, using the same names as the environment.
    pub fn from_vars<I>(vars: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config = envy::from_iter::<_, Self>(vars)
            .map_err(|e| anyhow!("Invalid or missing environmental variable: {}", e))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.worker_concurrency == 0 {
            return Err(anyhow!("WORKER_CONCURRENCY must be at least 1"));
        }

        if self.lease_timeout_seconds == 0 {
            return Err(anyhow!("LEASE_TIMEOUT_SECONDS must be at least 1"));
        }

        if self.queue_poll_interval_ms == 0 {
            return Err(anyhow!("QUEUE_POLL_INTERVAL_MS must be at least 1"));
        }

        if self.max_retry_attempts == 0 {
            return Err(anyhow!("MAX_RETRY_ATTEMPTS must be at least 1"));
        }

        if self.initial_retry_delay_ms > self.max_retry_delay_ms {
            return Err(anyhow!(
                "INITIAL_RETRY_DELAY_MS must not exceed MAX_RETRY_DELAY_MS"
            ));
        }

        if !(0.0..1.0).contains(&self.retry_jitter_factor) {
            return Err(anyhow!("RETRY_JITTER_FACTOR must be within [0, 1)"));
        }

        Ok(())
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_retry_attempts,
            initial_delay_ms: self.initial_retry_delay_ms,
            max_delay_ms: self.max_retry_delay_ms,
            backoff_multiplier: self.retry_backoff_multiplier,
            jitter_factor: self.retry_jitter_factor,
        }
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            queue_name: self.queue_name.clone(),
            lease_timeout: Duration::from_secs(self.lease_timeout_seconds),
            poll_interval: Duration::from_millis(self.queue_poll_interval_ms),
            retry: self.retry_config(),
        }
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            concurrency: self.worker_concurrency,
            wait_max: Duration::from_millis(self.queue_wait_max_ms),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }
}

mod defaults {
    pub fn database_max_connections() -> u32 {
        10
    }

    pub fn queue_name() -> String {
        "notifications".to_string()
    }

    pub fn lease_timeout_seconds() -> u64 {
        120
    }

    pub fn queue_wait_max_ms() -> u64 {
        5_000
    }

    pub fn queue_poll_interval_ms() -> u64 {
        250
    }

    pub fn max_retry_attempts() -> u32 {
        5
    }

    pub fn initial_retry_delay_ms() -> u64 {
        1_000
    }

    pub fn max_retry_delay_ms() -> u64 {
        300_000
    }

    pub fn retry_backoff_multiplier() -> u64 {
        2
    }

    pub fn retry_jitter_factor() -> f64 {
        0.1
    }

    pub fn worker_concurrency() -> usize {
        4
    }

    pub fn default_template_id() -> String {
        "default".to_string()
    }

    pub fn http_timeout_seconds() -> u64 {
        10
    }

    pub fn server_port() -> u16 {
        8080
    }

    pub fn log_format() -> String {
        "json".to_string()
    }
}
