use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use notification_service::{
    clients::{directory::DirectoryAdapter, mail::MailTransport, template::TemplateResolver},
    config::Config,
    error::{DeliveryError, DirectoryError, StorageError, TemplateError},
    models::{
        campaign::{Campaign, CampaignType},
        directory::{DirectoryToken, EntityKind, MemberKind, Organization, Space},
        dispatch::{
            Audience, Dispatch, DispatchClient, DispatchKind, DispatchMessage, Html,
            OrganizationRole, VcapRequest,
        },
        job::{Job, JobRelease, NewJob, QueueStats},
        mail::MailMessage,
        receipt::Receipt,
        retry::RetryConfig,
        template::Template,
    },
    queue::{MemoryStorage, Queue, QueueConfig, Storage, Transaction},
};
use uuid::Uuid;

pub const UAA_HOST: &str = "https://uaa.example.com";

pub fn test_config(overrides: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = [
        ("DATABASE_URL", "postgres://localhost/notifications"),
        ("UAA_HOST", UAA_HOST),
        ("UAA_CLIENT_ID", "notifications"),
        ("UAA_CLIENT_SECRET", "secret"),
        ("CC_HOST", "https://api.example.com"),
        ("TEMPLATE_SERVICE_URL", "http://templates.local"),
        ("MAIL_RELAY_URL", "http://relay.local"),
        ("SENDER", "no-reply@example.com"),
        ("DEFAULT_UAA_SCOPES", "openid,cloud_controller.read"),
        ("QUEUE_POLL_INTERVAL_MS", "10"),
        ("QUEUE_WAIT_MAX_MS", "50"),
        ("INITIAL_RETRY_DELAY_MS", "5"),
        ("MAX_RETRY_DELAY_MS", "40"),
        ("RETRY_JITTER_FACTOR", "0"),
        ("WORKER_CONCURRENCY", "2"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    for (key, value) in overrides {
        vars.insert(key.to_string(), value.to_string());
    }

    Config::from_vars(vars).expect("test config should be valid")
}

/// Queue with fast, un-jittered backoff for tests.
pub fn fast_queue(storage: Arc<dyn Storage>, max_attempts: u32) -> Queue {
    Queue::new(
        storage,
        QueueConfig {
            queue_name: "notifications".to_string(),
            lease_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(10),
            retry: RetryConfig {
                max_attempts,
                initial_delay_ms: 5,
                max_delay_ms: 40,
                backoff_multiplier: 2,
                jitter_factor: 0.0,
            },
        },
    )
}

pub fn dispatch(audience: Audience) -> Dispatch {
    Dispatch {
        audience,
        kind: DispatchKind {
            id: "welcome".to_string(),
            description: "Welcome email".to_string(),
        },
        client: DispatchClient {
            id: "billing-app".to_string(),
            description: "Billing".to_string(),
        },
        message: DispatchMessage {
            reply_to: "support@example.com".to_string(),
            subject: "Hello".to_string(),
            to: String::new(),
            text: "Welcome aboard".to_string(),
            html: Html {
                body_content: "<p>Welcome aboard</p>".to_string(),
                ..Html::default()
            },
        },
        uaa_host: UAA_HOST.to_string(),
        vcap_request: VcapRequest {
            id: "vcap-request-1".to_string(),
            receipt_time: received_at(),
        },
        template_id: None,
    }
}

pub fn received_at() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
        .expect("valid timestamp")
        .with_timezone(&Utc)
}

/// Polls `check` until it returns true or two seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[derive(Default)]
pub struct FakeDirectory {
    spaces: HashMap<String, Space>,
    organizations: HashMap<String, Organization>,
    members: HashMap<String, Vec<String>>,
    users: Vec<String>,
    emails: HashMap<String, String>,
    failure: Option<String>,
    calls: AtomicUsize,
}

impl FakeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            failure: Some(reason.to_string()),
            ..Self::default()
        }
    }

    pub fn with_space(mut self, guid: &str, name: &str, organization_guid: &str) -> Self {
        self.spaces.insert(
            guid.to_string(),
            Space {
                guid: guid.to_string(),
                name: name.to_string(),
                organization_guid: organization_guid.to_string(),
            },
        );
        self
    }

    pub fn with_organization(mut self, guid: &str, name: &str) -> Self {
        self.organizations.insert(
            guid.to_string(),
            Organization {
                guid: guid.to_string(),
                name: name.to_string(),
            },
        );
        self
    }

    pub fn with_members(mut self, kind: MemberKind, id: &str, guids: &[&str]) -> Self {
        self.members
            .insert(member_key(kind, id), guids.iter().map(|g| g.to_string()).collect());
        self
    }

    pub fn with_user(mut self, guid: &str, email: Option<&str>) -> Self {
        self.users.push(guid.to_string());
        if let Some(email) = email {
            self.emails.insert(guid.to_string(), email.to_string());
        }
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn call(&self) -> Result<(), DirectoryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(reason) => Err(DirectoryError::Unavailable(reason.clone())),
            None => Ok(()),
        }
    }
}

fn member_key(kind: MemberKind, id: &str) -> String {
    match kind {
        MemberKind::Space => format!("space:{id}"),
        MemberKind::Organization(None) => format!("org:{id}"),
        MemberKind::Organization(Some(OrganizationRole::OrgManager)) => format!("org:{id}:managers"),
        MemberKind::Organization(Some(OrganizationRole::OrgAuditor)) => format!("org:{id}:auditors"),
        MemberKind::Organization(Some(OrganizationRole::BillingManager)) => {
            format!("org:{id}:billing_managers")
        }
        MemberKind::Scope => format!("scope:{id}"),
    }
}

#[async_trait]
impl DirectoryAdapter for FakeDirectory {
    async fn load_token(&self, uaa_host: &str) -> Result<DirectoryToken, DirectoryError> {
        self.call()?;
        Ok(DirectoryToken {
            access_token: "token".to_string(),
            uaa_host: uaa_host.to_string(),
        })
    }

    async fn load_space(
        &self,
        _token: &DirectoryToken,
        space_guid: &str,
    ) -> Result<Space, DirectoryError> {
        self.call()?;
        self.spaces
            .get(space_guid)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound {
                kind: "space",
                id: space_guid.to_string(),
            })
    }

    async fn load_organization(
        &self,
        _token: &DirectoryToken,
        organization_guid: &str,
    ) -> Result<Organization, DirectoryError> {
        self.call()?;
        self.organizations
            .get(organization_guid)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound {
                kind: "organization",
                id: organization_guid.to_string(),
            })
    }

    async fn members_of(
        &self,
        _token: &DirectoryToken,
        kind: MemberKind,
        id: &str,
    ) -> Result<Vec<String>, DirectoryError> {
        self.call()?;
        Ok(self
            .members
            .get(&member_key(kind, id))
            .cloned()
            .unwrap_or_default())
    }

    async fn exists(
        &self,
        _token: &DirectoryToken,
        kind: EntityKind,
        guid: &str,
    ) -> Result<bool, DirectoryError> {
        self.call()?;
        Ok(match kind {
            EntityKind::User => self.users.iter().any(|user| user == guid),
            EntityKind::Space => self.spaces.contains_key(guid),
            EntityKind::Organization => self.organizations.contains_key(guid),
        })
    }

    async fn all_guids(&self, _token: &DirectoryToken) -> Result<Vec<String>, DirectoryError> {
        self.call()?;
        Ok(self.users.clone())
    }

    async fn user_emails(
        &self,
        _token: &DirectoryToken,
        guids: &[String],
    ) -> Result<HashMap<String, String>, DirectoryError> {
        self.call()?;
        Ok(guids
            .iter()
            .filter_map(|guid| {
                self.emails
                    .get(guid)
                    .map(|email| (guid.clone(), email.clone()))
            })
            .collect())
    }
}

#[derive(Default)]
pub struct FakeTemplates {
    templates: HashMap<String, Template>,
    unavailable: bool,
}

impl FakeTemplates {
    /// A `default` template that echoes the message fields.
    pub fn new() -> Self {
        Self::default().with_template(
            "default",
            "{{subject}}",
            "{{text}}\n\n{{endorsement}}",
            "{{html}}<p>{{endorsement}}</p>",
        )
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn with_template(mut self, id: &str, subject: &str, text: &str, html: &str) -> Self {
        self.templates.insert(
            id.to_string(),
            Template {
                id: id.to_string(),
                subject: subject.to_string(),
                text: text.to_string(),
                html: html.to_string(),
            },
        );
        self
    }
}

#[async_trait]
impl TemplateResolver for FakeTemplates {
    async fn resolve(&self, template_id: &str) -> Result<Template, TemplateError> {
        if self.unavailable {
            return Err(TemplateError::Unavailable("template service down".to_string()));
        }

        self.templates
            .get(template_id)
            .cloned()
            .ok_or_else(|| TemplateError::NotFound(template_id.to_string()))
    }
}

/// Records sent mail; scripted outcomes are consumed first, then every send succeeds.
#[derive(Default)]
pub struct FakeTransport {
    sent: Mutex<Vec<MailMessage>>,
    script: Mutex<VecDeque<DeliveryError>>,
    attempts: AtomicUsize,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_with(errors: Vec<DeliveryError>) -> Self {
        Self {
            script: Mutex::new(errors.into()),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<MailMessage> {
        self.sent.lock().expect("sent lock").clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MailTransport for FakeTransport {
    async fn send(&self, message: &MailMessage) -> Result<String, DeliveryError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = self.script.lock().expect("script lock").pop_front() {
            return Err(error);
        }

        self.sent.lock().expect("sent lock").push(message.clone());
        Ok(format!("message-{attempt}"))
    }
}

/// Memory storage whose transactions fail on the `fail_on`-th job insert (1-based).
#[derive(Clone)]
pub struct FlakyStorage {
    inner: MemoryStorage,
    fail_on: usize,
}

impl FlakyStorage {
    pub fn new(inner: MemoryStorage, fail_on: usize) -> Self {
        Self { inner, fail_on }
    }
}

#[async_trait]
impl Storage for FlakyStorage {
    async fn begin(&self) -> Result<Box<dyn Transaction>, StorageError> {
        Ok(Box::new(FlakyTransaction {
            inner: self.inner.begin().await?,
            inserted: 0,
            fail_on: self.fail_on,
        }))
    }

    async fn claim_job(
        &self,
        queue_name: &str,
        owner: &str,
        now: DateTime<Utc>,
        lease_expires_at: DateTime<Utc>,
    ) -> Result<Option<Job>, StorageError> {
        self.inner
            .claim_job(queue_name, owner, now, lease_expires_at)
            .await
    }

    async fn complete_job(&self, id: Uuid) -> Result<bool, StorageError> {
        self.inner.complete_job(id).await
    }

    async fn release_job(
        &self,
        id: Uuid,
        owner: &str,
        release: JobRelease,
    ) -> Result<bool, StorageError> {
        self.inner.release_job(id, owner, release).await
    }

    async fn find_job(&self, id: Uuid) -> Result<Option<Job>, StorageError> {
        self.inner.find_job(id).await
    }

    async fn queue_stats(&self, queue_name: &str) -> Result<QueueStats, StorageError> {
        self.inner.queue_stats(queue_name).await
    }

    async fn upsert_receipt(&self, receipt: &Receipt) -> Result<(), StorageError> {
        self.inner.upsert_receipt(receipt).await
    }

    async fn find_receipt(&self, notification_id: Uuid) -> Result<Option<Receipt>, StorageError> {
        self.inner.find_receipt(notification_id).await
    }

    async fn find_campaign(&self, id: Uuid) -> Result<Option<Campaign>, StorageError> {
        self.inner.find_campaign(id).await
    }

    async fn find_campaign_type(&self, id: &str) -> Result<Option<CampaignType>, StorageError> {
        self.inner.find_campaign_type(id).await
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        self.inner.health_check().await
    }
}

struct FlakyTransaction {
    inner: Box<dyn Transaction>,
    inserted: usize,
    fail_on: usize,
}

#[async_trait]
impl Transaction for FlakyTransaction {
    async fn insert_job(&mut self, job: &NewJob) -> Result<(), StorageError> {
        self.inserted += 1;
        if self.inserted == self.fail_on {
            return Err(StorageError::Unavailable("connection reset".to_string()));
        }
        self.inner.insert_job(job).await
    }

    async fn insert_campaign(&mut self, campaign: &Campaign) -> Result<(), StorageError> {
        self.inner.insert_campaign(campaign).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<(), StorageError> {
        self.inner.rollback().await
    }
}
