use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    error::DirectoryError,
    models::{
        directory::{
            CcPage, CcResource, DirectoryToken, EntityKind, MemberKind, NamedEntity,
            Organization, Space, SpaceEntity, TokenResponse, UaaGroupPage, UaaUserPage,
        },
        dispatch::OrganizationRole,
    },
};

const UAA_PAGE_SIZE: usize = 100;
const CC_PAGE_SIZE: usize = 100;

/// Read-only view of the users, spaces and organizations notifications can target.
#[async_trait]
pub trait DirectoryAdapter: Send + Sync {
    async fn load_token(&self, uaa_host: &str) -> Result<DirectoryToken, DirectoryError>;

    async fn load_space(
        &self,
        token: &DirectoryToken,
        space_guid: &str,
    ) -> Result<Space, DirectoryError>;

    async fn load_organization(
        &self,
        token: &DirectoryToken,
        organization_guid: &str,
    ) -> Result<Organization, DirectoryError>;

    async fn members_of(
        &self,
        token: &DirectoryToken,
        kind: MemberKind,
        id: &str,
    ) -> Result<Vec<String>, DirectoryError>;

    async fn exists(
        &self,
        token: &DirectoryToken,
        kind: EntityKind,
        guid: &str,
    ) -> Result<bool, DirectoryError>;

    async fn all_guids(&self, token: &DirectoryToken) -> Result<Vec<String>, DirectoryError>;

    /// Maps user GUIDs to their primary email. Users without one are omitted.
    async fn user_emails(
        &self,
        token: &DirectoryToken,
        guids: &[String],
    ) -> Result<HashMap<String, String>, DirectoryError>;
}

/// Directory backed by UAA (users, scopes) and the Cloud Controller v2 API
/// (spaces, organizations, memberships).
pub struct CloudDirectory {
    http_client: Client,
    cc_host: String,
    client_id: String,
    client_secret: String,
}

impl CloudDirectory {
    pub fn new(config: &Config) -> Result<Self, DirectoryError> {
        Self::with_hosts(
            &config.cc_host,
            &config.uaa_client_id,
            &config.uaa_client_secret,
            config.http_timeout(),
        )
    }

    pub fn with_hosts(
        cc_host: &str,
        client_id: &str,
        client_secret: &str,
        timeout: Duration,
    ) -> Result<Self, DirectoryError> {
        let http_client = Client::builder().timeout(timeout).build()?;

        info!(cc_host, "Directory client initialized");

        Ok(Self {
            http_client,
            cc_host: cc_host.trim_end_matches('/').to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
        })
    }

    async fn cc_get<T: DeserializeOwned>(
        &self,
        token: &DirectoryToken,
        path: &str,
        kind: &'static str,
        id: &str,
    ) -> Result<T, DirectoryError> {
        let url = format!("{}{}", self.cc_host, path);

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&token.access_token)
            .send()
            .await?;

        let response = check_status(response, kind, id).await?;
        Ok(response.json().await?)
    }

    async fn cc_member_guids(
        &self,
        token: &DirectoryToken,
        path: String,
        kind: &'static str,
        id: &str,
    ) -> Result<Vec<String>, DirectoryError> {
        let mut guids = Vec::new();
        let mut next = Some(format!("{path}?results-per-page={CC_PAGE_SIZE}"));

        while let Some(path) = next {
            let page: CcPage<serde_json::Value> = self.cc_get(token, &path, kind, id).await?;

            guids.extend(page.resources.into_iter().map(|r| r.metadata.guid));
            next = page.next_url;
        }

        Ok(guids)
    }

    async fn uaa_users(
        &self,
        token: &DirectoryToken,
        query: &[(&str, String)],
    ) -> Result<UaaUserPage, DirectoryError> {
        let url = format!("{}/Users", token.uaa_host.trim_end_matches('/'));

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&token.access_token)
            .query(query)
            .send()
            .await?;

        let response = check_status(response, "users", "").await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl DirectoryAdapter for CloudDirectory {
    async fn load_token(&self, uaa_host: &str) -> Result<DirectoryToken, DirectoryError> {
        let uaa_host = uaa_host.trim_end_matches('/');
        let url = format!("{uaa_host}/oauth/token");

        debug!(uaa_host, "Requesting client credentials token");

        let response = self
            .http_client
            .post(&url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let response = check_status(response, "token", &self.client_id).await?;
        let token: TokenResponse = response.json().await?;

        Ok(DirectoryToken {
            access_token: token.access_token,
            uaa_host: uaa_host.to_string(),
        })
    }

    async fn load_space(
        &self,
        token: &DirectoryToken,
        space_guid: &str,
    ) -> Result<Space, DirectoryError> {
        let resource: CcResource<SpaceEntity> = self
            .cc_get(token, &format!("/v2/spaces/{space_guid}"), "space", space_guid)
            .await?;

        Ok(Space {
            guid: resource.metadata.guid,
            name: resource.entity.name,
            organization_guid: resource.entity.organization_guid,
        })
    }

    async fn load_organization(
        &self,
        token: &DirectoryToken,
        organization_guid: &str,
    ) -> Result<Organization, DirectoryError> {
        let resource: CcResource<NamedEntity> = self
            .cc_get(
                token,
                &format!("/v2/organizations/{organization_guid}"),
                "organization",
                organization_guid,
            )
            .await?;

        Ok(Organization {
            guid: resource.metadata.guid,
            name: resource.entity.name,
        })
    }

    async fn members_of(
        &self,
        token: &DirectoryToken,
        kind: MemberKind,
        id: &str,
    ) -> Result<Vec<String>, DirectoryError> {
        let path = match kind {
            MemberKind::Space => format!("/v2/spaces/{id}/users"),
            MemberKind::Organization(role) => {
                let members = match role {
                    None => "users",
                    Some(OrganizationRole::OrgManager) => "managers",
                    Some(OrganizationRole::OrgAuditor) => "auditors",
                    Some(OrganizationRole::BillingManager) => "billing_managers",
                };
                format!("/v2/organizations/{id}/{members}")
            }
            MemberKind::Scope => {
                let url = format!("{}/Groups", token.uaa_host.trim_end_matches('/'));

                let response = self
                    .http_client
                    .get(&url)
                    .bearer_auth(&token.access_token)
                    .query(&[
                        ("filter", format!("displayName eq \"{id}\"")),
                        ("attributes", "members".to_string()),
                    ])
                    .send()
                    .await?;

                let response = check_status(response, "scope", id).await?;
                let page: UaaGroupPage = response.json().await?;

                let guids = page
                    .resources
                    .into_iter()
                    .flat_map(|group| group.members)
                    .filter(|member| member.r#type.as_deref().is_none_or(|t| t == "USER"))
                    .map(|member| member.value)
                    .collect();

                return Ok(guids);
            }
        };

        let kind_label = match kind {
            MemberKind::Space => "space",
            _ => "organization",
        };

        self.cc_member_guids(token, path, kind_label, id).await
    }

    async fn exists(
        &self,
        token: &DirectoryToken,
        kind: EntityKind,
        guid: &str,
    ) -> Result<bool, DirectoryError> {
        let result = match kind {
            EntityKind::User => {
                let url = format!("{}/Users/{guid}", token.uaa_host.trim_end_matches('/'));

                let response = self
                    .http_client
                    .get(&url)
                    .bearer_auth(&token.access_token)
                    .send()
                    .await?;

                check_status(response, "user", guid).await.map(|_| ())
            }
            EntityKind::Space => self.load_space(token, guid).await.map(|_| ()),
            EntityKind::Organization => self.load_organization(token, guid).await.map(|_| ()),
        };

        match result {
            Ok(()) => Ok(true),
            Err(DirectoryError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn all_guids(&self, token: &DirectoryToken) -> Result<Vec<String>, DirectoryError> {
        let mut guids = Vec::new();
        let mut start_index = 1;

        loop {
            let page = self
                .uaa_users(
                    token,
                    &[
                        ("attributes", "id".to_string()),
                        ("startIndex", start_index.to_string()),
                        ("count", UAA_PAGE_SIZE.to_string()),
                    ],
                )
                .await?;

            let fetched = page.resources.len();
            guids.extend(page.resources.into_iter().map(|user| user.id));

            if fetched == 0 || guids.len() >= page.total_results {
                break;
            }

            start_index += fetched;
        }

        debug!(count = guids.len(), "Loaded every user guid");

        Ok(guids)
    }

    async fn user_emails(
        &self,
        token: &DirectoryToken,
        guids: &[String],
    ) -> Result<HashMap<String, String>, DirectoryError> {
        let mut emails = HashMap::with_capacity(guids.len());

        for chunk in guids.chunks(UAA_PAGE_SIZE) {
            let filter = chunk
                .iter()
                .map(|guid| format!("id eq \"{guid}\""))
                .collect::<Vec<_>>()
                .join(" or ");

            let page = self
                .uaa_users(
                    token,
                    &[
                        ("filter", filter),
                        ("attributes", "id,emails".to_string()),
                        ("count", UAA_PAGE_SIZE.to_string()),
                    ],
                )
                .await?;

            for user in page.resources {
                let primary = user
                    .emails
                    .iter()
                    .find(|email| email.primary)
                    .or_else(|| user.emails.first());

                if let Some(email) = primary {
                    emails.insert(user.id.clone(), email.value.clone());
                }
            }
        }

        Ok(emails)
    }
}

async fn check_status(
    response: Response,
    kind: &'static str,
    id: &str,
) -> Result<Response, DirectoryError> {
    let status = response.status();

    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();

    match status {
        StatusCode::NOT_FOUND => Err(DirectoryError::NotFound {
            kind,
            id: id.to_string(),
        }),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            warn!(kind, status = %status, "Directory rejected credentials");
            Err(DirectoryError::Unauthorized(format!("{status}: {body}")))
        }
        _ => {
            warn!(kind, id, status = %status, "Directory request failed");
            Err(DirectoryError::Unavailable(format!(
                "directory returned {status} for {kind} {id:?}"
            )))
        }
    }
}
