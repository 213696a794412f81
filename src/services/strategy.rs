//! Audience resolution.
//!
//! One strategy per audience kind turns a [`Dispatch`] into concrete recipients and
//! hands them to the [`Enqueuer`]. Strategies never retry: a directory failure aborts
//! the dispatch and is returned as-is, before any job exists.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::{
    clients::directory::DirectoryAdapter,
    error::{DispatchError, ValidationError},
    models::{
        directory::{DirectoryToken, MemberKind},
        dispatch::{Audience, Dispatch, DispatchResponse, Recipient},
        message::{OrganizationContext, SpaceContext},
        options::{
            EMAIL_ENDORSEMENT, EVERYONE_ENDORSEMENT, ORGANIZATION_ENDORSEMENT,
            ORGANIZATION_ROLE_ENDORSEMENT, Options, SCOPE_ENDORSEMENT, SPACE_ENDORSEMENT,
            USER_ENDORSEMENT,
        },
        validation::validate_email,
    },
    services::enqueuer::{EnqueueContext, Enqueuer},
};

#[async_trait]
pub trait Strategy: Send + Sync {
    async fn dispatch(&self, dispatch: &Dispatch) -> Result<Vec<DispatchResponse>, DispatchError>;
}

fn mismatch(strategy: &str, audience: &Audience) -> DispatchError {
    ValidationError::Invalid(format!(
        "{strategy} strategy cannot dispatch to a {} audience",
        audience.kind()
    ))
    .into()
}

/// Pairs each GUID with its email when the directory knows one.
async fn with_emails(
    directory: &dyn DirectoryAdapter,
    token: &DirectoryToken,
    guids: Vec<String>,
) -> Result<Vec<Recipient>, DispatchError> {
    if guids.is_empty() {
        return Ok(Vec::new());
    }

    let mut emails = directory.user_emails(token, &guids).await?;

    Ok(guids
        .into_iter()
        .map(|guid| match emails.remove(&guid) {
            Some(email) => Recipient::user(guid).with_email(email),
            None => Recipient::user(guid),
        })
        .collect())
}

pub struct UserStrategy {
    enqueuer: Enqueuer,
}

impl UserStrategy {
    pub fn new(enqueuer: Enqueuer) -> Self {
        Self { enqueuer }
    }
}

#[async_trait]
impl Strategy for UserStrategy {
    async fn dispatch(&self, dispatch: &Dispatch) -> Result<Vec<DispatchResponse>, DispatchError> {
        let Audience::User(guid) = &dispatch.audience else {
            return Err(mismatch("user", &dispatch.audience));
        };

        let options = Options::from_dispatch(dispatch, USER_ENDORSEMENT);
        let context = EnqueueContext::from_dispatch(dispatch);

        self.enqueuer
            .enqueue(vec![Recipient::user(guid.clone())], &options, &context)
            .await
    }
}

pub struct SpaceStrategy {
    directory: Arc<dyn DirectoryAdapter>,
    enqueuer: Enqueuer,
}

impl SpaceStrategy {
    pub fn new(directory: Arc<dyn DirectoryAdapter>, enqueuer: Enqueuer) -> Self {
        Self {
            directory,
            enqueuer,
        }
    }
}

#[async_trait]
impl Strategy for SpaceStrategy {
    async fn dispatch(&self, dispatch: &Dispatch) -> Result<Vec<DispatchResponse>, DispatchError> {
        let Audience::Space(space_guid) = &dispatch.audience else {
            return Err(mismatch("space", &dispatch.audience));
        };

        let token = self.directory.load_token(&dispatch.uaa_host).await?;
        let space = self.directory.load_space(&token, space_guid).await?;
        let organization = self
            .directory
            .load_organization(&token, &space.organization_guid)
            .await?;

        let guids = self
            .directory
            .members_of(&token, MemberKind::Space, space_guid)
            .await?;

        debug!(space_guid = %space_guid, members = guids.len(), "Space members loaded");

        let recipients = with_emails(self.directory.as_ref(), &token, guids).await?;

        let options = Options::from_dispatch(dispatch, SPACE_ENDORSEMENT);
        let context = EnqueueContext::from_dispatch(dispatch)
            .with_space(SpaceContext {
                guid: space.guid,
                name: space.name,
                organization_guid: space.organization_guid,
            })
            .with_organization(OrganizationContext {
                guid: organization.guid,
                name: organization.name,
                role: None,
            });

        self.enqueuer.enqueue(recipients, &options, &context).await
    }
}

pub struct OrganizationStrategy {
    directory: Arc<dyn DirectoryAdapter>,
    enqueuer: Enqueuer,
}

impl OrganizationStrategy {
    pub fn new(directory: Arc<dyn DirectoryAdapter>, enqueuer: Enqueuer) -> Self {
        Self {
            directory,
            enqueuer,
        }
    }
}

#[async_trait]
impl Strategy for OrganizationStrategy {
    async fn dispatch(&self, dispatch: &Dispatch) -> Result<Vec<DispatchResponse>, DispatchError> {
        let Audience::Organization { guid, role } = &dispatch.audience else {
            return Err(mismatch("organization", &dispatch.audience));
        };

        let token = self.directory.load_token(&dispatch.uaa_host).await?;
        let organization = self.directory.load_organization(&token, guid).await?;

        let guids = self
            .directory
            .members_of(&token, MemberKind::Organization(*role), guid)
            .await?;

        debug!(
            organization_guid = %guid,
            role = role.map(|r| r.label()),
            members = guids.len(),
            "Organization members loaded"
        );

        let recipients = with_emails(self.directory.as_ref(), &token, guids).await?;

        let endorsement = match role {
            Some(_) => ORGANIZATION_ROLE_ENDORSEMENT,
            None => ORGANIZATION_ENDORSEMENT,
        };

        let options = Options::from_dispatch(dispatch, endorsement);
        let context = EnqueueContext::from_dispatch(dispatch).with_organization(
            OrganizationContext {
                guid: organization.guid,
                name: organization.name,
                role: *role,
            },
        );

        self.enqueuer.enqueue(recipients, &options, &context).await
    }
}

pub struct EveryoneStrategy {
    directory: Arc<dyn DirectoryAdapter>,
    enqueuer: Enqueuer,
}

impl EveryoneStrategy {
    pub fn new(directory: Arc<dyn DirectoryAdapter>, enqueuer: Enqueuer) -> Self {
        Self {
            directory,
            enqueuer,
        }
    }
}

#[async_trait]
impl Strategy for EveryoneStrategy {
    async fn dispatch(&self, dispatch: &Dispatch) -> Result<Vec<DispatchResponse>, DispatchError> {
        if dispatch.audience != Audience::Everyone {
            return Err(mismatch("everyone", &dispatch.audience));
        }

        let token = self.directory.load_token(&dispatch.uaa_host).await?;
        let guids = self.directory.all_guids(&token).await?;

        let recipients = guids.into_iter().map(Recipient::user).collect();

        let options = Options::from_dispatch(dispatch, EVERYONE_ENDORSEMENT);
        let context = EnqueueContext::from_dispatch(dispatch);

        self.enqueuer.enqueue(recipients, &options, &context).await
    }
}

/// Sends to every user holding a scope. Scopes granted to all users by default
/// are refused, since that would silently reach everyone.
pub struct UaaScopeStrategy {
    directory: Arc<dyn DirectoryAdapter>,
    enqueuer: Enqueuer,
    default_scopes: Vec<String>,
}

impl UaaScopeStrategy {
    pub fn new(
        directory: Arc<dyn DirectoryAdapter>,
        enqueuer: Enqueuer,
        default_scopes: Vec<String>,
    ) -> Self {
        Self {
            directory,
            enqueuer,
            default_scopes,
        }
    }
}

#[async_trait]
impl Strategy for UaaScopeStrategy {
    async fn dispatch(&self, dispatch: &Dispatch) -> Result<Vec<DispatchResponse>, DispatchError> {
        let Audience::UaaScope(scope) = &dispatch.audience else {
            return Err(mismatch("uaa scope", &dispatch.audience));
        };

        if self.default_scopes.iter().any(|default| default == scope) {
            return Err(ValidationError::Invalid(format!(
                "You cannot send a notification to a default scope: {scope:?}"
            ))
            .into());
        }

        let token = self.directory.load_token(&dispatch.uaa_host).await?;
        let guids = self
            .directory
            .members_of(&token, MemberKind::Scope, scope)
            .await?;

        let recipients = guids.into_iter().map(Recipient::user).collect();

        let options = Options::from_dispatch(dispatch, SCOPE_ENDORSEMENT);
        let context = EnqueueContext::from_dispatch(dispatch).with_scope(scope.clone());

        self.enqueuer.enqueue(recipients, &options, &context).await
    }
}

pub struct EmailStrategy {
    enqueuer: Enqueuer,
}

impl EmailStrategy {
    pub fn new(enqueuer: Enqueuer) -> Self {
        Self { enqueuer }
    }
}

#[async_trait]
impl Strategy for EmailStrategy {
    async fn dispatch(&self, dispatch: &Dispatch) -> Result<Vec<DispatchResponse>, DispatchError> {
        let Audience::Email(address) = &dispatch.audience else {
            return Err(mismatch("email", &dispatch.audience));
        };

        validate_email(address)?;

        let recipient = Recipient::user(address.clone()).with_email(address.clone());

        let mut options = Options::from_dispatch(dispatch, EMAIL_ENDORSEMENT);
        options.to = address.clone();

        let context = EnqueueContext::from_dispatch(dispatch);

        self.enqueuer.enqueue(vec![recipient], &options, &context).await
    }
}

/// Routes a dispatch to the strategy matching its audience.
pub struct Dispatcher {
    user: UserStrategy,
    space: SpaceStrategy,
    organization: OrganizationStrategy,
    everyone: EveryoneStrategy,
    uaa_scope: UaaScopeStrategy,
    email: EmailStrategy,
}

impl Dispatcher {
    pub fn new(
        directory: Arc<dyn DirectoryAdapter>,
        enqueuer: Enqueuer,
        default_scopes: Vec<String>,
    ) -> Self {
        Self {
            user: UserStrategy::new(enqueuer.clone()),
            space: SpaceStrategy::new(Arc::clone(&directory), enqueuer.clone()),
            organization: OrganizationStrategy::new(Arc::clone(&directory), enqueuer.clone()),
            everyone: EveryoneStrategy::new(Arc::clone(&directory), enqueuer.clone()),
            uaa_scope: UaaScopeStrategy::new(directory, enqueuer.clone(), default_scopes),
            email: EmailStrategy::new(enqueuer),
        }
    }

    pub fn strategy_for(&self, audience: &Audience) -> &dyn Strategy {
        match audience {
            Audience::User(_) => &self.user,
            Audience::Space(_) => &self.space,
            Audience::Organization { .. } => &self.organization,
            Audience::Everyone => &self.everyone,
            Audience::UaaScope(_) => &self.uaa_scope,
            Audience::Email(_) => &self.email,
        }
    }
}

#[async_trait]
impl Strategy for Dispatcher {
    async fn dispatch(&self, dispatch: &Dispatch) -> Result<Vec<DispatchResponse>, DispatchError> {
        let audience = dispatch.audience.kind();

        info!(
            audience,
            vcap_request_id = %dispatch.vcap_request.id,
            client_id = %dispatch.client.id,
            kind_id = %dispatch.kind.id,
            "Dispatching notification"
        );

        self.strategy_for(&dispatch.audience)
            .dispatch(dispatch)
            .await
    }
}
