use serde::Deserialize;

use crate::models::dispatch::OrganizationRole;

/// Client-credentials token scoped to one UAA host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryToken {
    pub access_token: String,
    pub uaa_host: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Space {
    pub guid: String,
    pub name: String,
    pub organization_guid: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Organization {
    pub guid: String,
    pub name: String,
}

/// Which membership list to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Space,
    Organization(Option<OrganizationRole>),
    Scope,
}

/// Entities whose existence can be checked before a campaign is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    User,
    Space,
    Organization,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Space => "space",
            EntityKind::Organization => "organization",
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CcMetadata {
    pub guid: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CcResource<E> {
    pub metadata: CcMetadata,
    pub entity: E,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CcPage<E> {
    #[serde(default)]
    pub next_url: Option<String>,
    pub resources: Vec<CcResource<E>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SpaceEntity {
    pub name: String,
    pub organization_guid: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NamedEntity {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UaaUserPage {
    #[serde(default)]
    pub resources: Vec<UaaUser>,

    #[serde(rename = "totalResults", default)]
    pub total_results: usize,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UaaUser {
    pub id: String,

    #[serde(default)]
    pub emails: Vec<UaaEmail>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UaaEmail {
    pub value: String,

    #[serde(default)]
    pub primary: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UaaGroupPage {
    #[serde(default)]
    pub resources: Vec<UaaGroup>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UaaGroup {
    #[serde(default)]
    pub members: Vec<UaaGroupMember>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UaaGroupMember {
    pub value: String,

    #[serde(default)]
    pub r#type: Option<String>,
}
