use std::{collections::HashMap, time::Instant};

use chrono::Utc;
use tracing::{debug, warn};

use crate::{
    models::{
        health::{HealthCheckResponse, HealthStatus, ServiceHealth},
        job::QueueStats,
    },
    queue::Queue,
};

pub struct HealthChecker {
    queue: Queue,
}

impl HealthChecker {
    pub fn new(queue: Queue) -> Self {
        Self { queue }
    }

    pub async fn check_all(&self) -> HealthCheckResponse {
        let mut checks = HashMap::new();

        let db_health = self.check_database().await;
        checks.insert("database".to_string(), db_health);

        let (queue_health, stats) = self.check_queue().await;
        checks.insert("queue".to_string(), queue_health);

        let overall_status = self.determine_overall_status(&checks);

        HealthCheckResponse {
            status: overall_status,
            timestamp: Utc::now(),
            checks,
            queue: stats,
        }
    }

    async fn check_database(&self) -> ServiceHealth {
        let start = Instant::now();

        match self.queue.storage().health_check().await {
            Ok(()) => {
                let elapsed = start.elapsed().as_millis() as u64;
                debug!(response_time_ms = elapsed, "Database health check passed");
                ServiceHealth::healthy(elapsed)
            }
            Err(e) => {
                warn!(error = %e, "Database health check failed");
                ServiceHealth::unhealthy(format!("Health check query failed: {}", e))
            }
        }
    }

    async fn check_queue(&self) -> (ServiceHealth, Option<QueueStats>) {
        let start = Instant::now();

        match self.queue.stats().await {
            Ok(stats) => {
                let elapsed = start.elapsed().as_millis() as u64;
                debug!(
                    queue = self.queue.name(),
                    pending = stats.pending,
                    leased = stats.leased,
                    failed = stats.failed,
                    "Queue stats collected"
                );
                (ServiceHealth::healthy(elapsed), Some(stats))
            }
            Err(e) => {
                warn!(error = %e, "Queue stats unavailable");
                (
                    ServiceHealth::degraded(format!("Queue stats unavailable: {}", e)),
                    None,
                )
            }
        }
    }

    fn determine_overall_status(&self, checks: &HashMap<String, ServiceHealth>) -> HealthStatus {
        let has_unhealthy = checks
            .values()
            .any(|health| health.status == HealthStatus::Unhealthy);

        let has_degraded = checks
            .values()
            .any(|health| health.status == HealthStatus::Degraded);

        if has_unhealthy {
            HealthStatus::Unhealthy
        } else if has_degraded {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}
