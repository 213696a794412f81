use std::{collections::HashSet, sync::Arc, time::Duration};

use anyhow::{Result, anyhow};
use notification_service::{
    clients::database::DatabaseClient,
    models::{
        campaign::{Campaign, CampaignAudience, CampaignRequest, SendTo},
        dispatch::{Audience, Recipient},
        job::JobStatus,
        options::Options,
        receipt::Receipt,
        status::MessageStatus,
    },
    queue::{FailOutcome, PostgresStorage, Queue},
    services::enqueuer::{EnqueueContext, Enqueuer},
};
use sqlx::PgPool;
use testcontainers::{
    ContainerAsync, GenericImage, ImageExt,
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
};

use crate::support::{dispatch, fast_queue};

struct Database {
    pool: PgPool,
    _container: ContainerAsync<GenericImage>,
}

async fn database() -> Result<Database> {
    let container = GenericImage::new("postgres", "16-alpine")
        .with_exposed_port(5432.tcp())
        .with_wait_for(WaitFor::message_on_stderr(
            "database system is ready to accept connections",
        ))
        .with_wait_for(WaitFor::message_on_stdout(
            "database system is ready to accept connections",
        ))
        .with_env_var("POSTGRES_PASSWORD", "postgres")
        .with_env_var("POSTGRES_DB", "notifications")
        .start()
        .await?;

    let host = container.get_host().await?;
    let port = container.get_host_port_ipv4(5432.tcp()).await?;
    let url = format!("postgres://postgres:postgres@{host}:{port}/notifications");

    let mut last_error = None;
    for _ in 0..20 {
        match DatabaseClient::connect_url(&url, 10).await {
            Ok(client) => {
                client.migrate().await?;
                return Ok(Database {
                    pool: client.pool(),
                    _container: container,
                });
            }
            Err(e) => {
                last_error = Some(e);
                tokio::time::sleep(Duration::from_millis(250)).await;
            }
        }
    }

    Err(last_error.unwrap_or_else(|| anyhow!("database never became reachable")))
}

async fn seed(queue: &Queue, count: usize) -> Result<()> {
    let recipients = (0..count)
        .map(|i| Recipient::user(format!("user-{i}")))
        .collect();

    Enqueuer::new(queue.clone())
        .enqueue(
            recipients,
            &Options::default(),
            &EnqueueContext::from_dispatch(&dispatch(Audience::Everyone)),
        )
        .await?;

    Ok(())
}

/// Test: Jobs round-trip through lease, fail and ack against Postgres
#[tokio::test]
#[ignore = "requires docker"]
async fn test_postgres_job_lifecycle() -> Result<()> {
    let db = database().await?;
    let queue = fast_queue(Arc::new(PostgresStorage::new(db.pool.clone())), 3);
    seed(&queue, 1).await?;

    let job = queue
        .lease("worker-1", Duration::ZERO)
        .await?
        .expect("seeded job is leasable");
    assert_eq!(job.status, JobStatus::Leased);
    assert_eq!(job.lease_owner.as_deref(), Some("worker-1"));

    assert!(queue.lease("worker-2", Duration::ZERO).await?.is_none());

    let outcome = queue.fail(&job, "relay 503").await?;
    assert!(matches!(outcome, FailOutcome::Retrying { attempts: 1, .. }));

    let retried = queue
        .lease("worker-2", Duration::from_secs(2))
        .await?
        .expect("job returns after backoff");
    assert_eq!(retried.id, job.id);
    assert_eq!(retried.attempts, 1);
    assert_eq!(retried.last_error.as_deref(), Some("relay 503"));

    assert_eq!(queue.fail(&job, "stale owner").await?, FailOutcome::LeaseLost);

    assert!(queue.ack(retried.id).await?);
    assert!(!queue.ack(retried.id).await?);

    let stats = queue.stats().await?;
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.pending, 0);

    Ok(())
}

/// Test: SKIP LOCKED keeps concurrent leases exclusive
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires docker"]
async fn test_postgres_concurrent_leases_are_exclusive() -> Result<()> {
    let db = database().await?;
    let queue = fast_queue(Arc::new(PostgresStorage::new(db.pool.clone())), 3);
    seed(&queue, 30).await?;

    let handles = (0..6)
        .map(|worker| {
            let queue = queue.clone();
            tokio::spawn(async move {
                let owner = format!("worker-{worker}");
                let mut leased = Vec::new();
                while let Ok(Some(job)) = queue.lease(&owner, Duration::ZERO).await {
                    leased.push(job.id);
                }
                leased
            })
        })
        .collect::<Vec<_>>();

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.await?);
    }

    assert_eq!(all.len(), 30);
    assert_eq!(all.iter().collect::<HashSet<_>>().len(), 30);

    Ok(())
}

/// Test: Receipts upsert on (notification, recipient)
#[tokio::test]
#[ignore = "requires docker"]
async fn test_postgres_receipt_upsert() -> Result<()> {
    let db = database().await?;
    let storage = PostgresStorage::new(db.pool.clone());
    let queue = fast_queue(Arc::new(storage), 3);
    let id = uuid::Uuid::new_v4();

    let queued = Receipt::new(
        id,
        "user-1".to_string(),
        "billing-app".to_string(),
        "welcome".to_string(),
        MessageStatus::Failed,
    )
    .with_error("relay 503".to_string());
    queue.storage().upsert_receipt(&queued).await?;

    let delivered = Receipt::new(
        id,
        "user-1".to_string(),
        "billing-app".to_string(),
        "welcome".to_string(),
        MessageStatus::Delivered,
    )
    .with_email("one@example.com".to_string());
    queue.storage().upsert_receipt(&delivered).await?;

    let stored = queue
        .storage()
        .find_receipt(id)
        .await?
        .expect("receipt stored");
    assert_eq!(stored.status, MessageStatus::Delivered);
    assert_eq!(stored.email.as_deref(), Some("one@example.com"));
    assert!(stored.error_message.is_none());

    Ok(())
}

/// Test: Campaigns and their types are readable after a committed insert
#[tokio::test]
#[ignore = "requires docker"]
async fn test_postgres_campaign_persistence() -> Result<()> {
    let db = database().await?;

    sqlx::query(
        "INSERT INTO campaign_types (id, name, critical, template_id) VALUES ($1, $2, $3, $4)",
    )
    .bind("maintenance")
    .bind("Maintenance")
    .bind(true)
    .bind("ops-template")
    .execute(&db.pool)
    .await?;

    let queue = fast_queue(Arc::new(PostgresStorage::new(db.pool.clone())), 3);

    let campaign_type = queue
        .storage()
        .find_campaign_type("maintenance")
        .await?
        .expect("campaign type stored");
    assert!(campaign_type.critical);
    assert_eq!(campaign_type.template_id.as_deref(), Some("ops-template"));

    let campaign = Campaign::from_request(
        CampaignRequest {
            send_to: SendTo {
                audience: CampaignAudience::Org,
                target: "org-1".to_string(),
            },
            campaign_type_id: "maintenance".to_string(),
            text: "Tonight".to_string(),
            html: String::new(),
            subject: "Maintenance".to_string(),
            template_id: None,
            reply_to: String::new(),
            sender_id: "ops".to_string(),
            client_id: "ops-app".to_string(),
        },
        "ops-template".to_string(),
    );

    let mut tx = queue.storage().begin().await?;
    tx.insert_campaign(&campaign).await?;
    tx.commit().await?;

    let stored = queue
        .storage()
        .find_campaign(campaign.id)
        .await?
        .expect("campaign stored");
    assert_eq!(stored.send_to, campaign.send_to);
    assert_eq!(stored.template_id, "ops-template");
    assert_eq!(stored.client_id, "ops-app");

    Ok(())
}
