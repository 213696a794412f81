//! Error taxonomy for the dispatch and delivery pipeline.
//!
//! Dispatch-time failures (`DispatchError`) return synchronously to the caller and
//! never reach the queue. Delivery-time failures (`DeliveryError`) are classified as
//! transient (retried with backoff) or permanent (recorded, never retried).

use thiserror::Error;

/// Failure talking to the directory service (UAA / Cloud Controller).
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("{0}")]
    Unavailable(String),

    #[error("{kind} {id:?} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("directory rejected credentials: {0}")]
    Unauthorized(String),

    #[error("directory request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Failure in the relational store backing jobs, receipts and campaigns.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("{0}")]
    Unavailable(String),
}

/// Request-level problems surfaced to the caller as a 4xx equivalent.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Permission(String),

    #[error("{0}")]
    Invalid(String),
}

/// Everything that can abort a dispatch or campaign creation before any job exists.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Directory lookup failed; the underlying error is surfaced unmodified.
    #[error(transparent)]
    Resolution(#[from] DirectoryError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("failed to persist jobs: {0}")]
    Persistence(#[from] StorageError),

    #[error(transparent)]
    Template(#[from] TemplateError),
}

impl DispatchError {
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Failure fetching or rendering a template.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template {0:?} not found")]
    NotFound(String),

    #[error("template render failed: {0}")]
    Render(String),

    #[error("template service unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of a failed delivery attempt.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("transient delivery failure: {0}")]
    Transient(String),

    #[error("permanent delivery failure: {0}")]
    Permanent(String),
}

impl DeliveryError {
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient(reason.into())
    }

    pub fn permanent(reason: impl Into<String>) -> Self {
        Self::Permanent(reason.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn reason(&self) -> &str {
        match self {
            Self::Transient(reason) | Self::Permanent(reason) => reason,
        }
    }
}

impl From<TemplateError> for DeliveryError {
    fn from(error: TemplateError) -> Self {
        match error {
            TemplateError::Unavailable(_) => Self::Transient(error.to_string()),
            TemplateError::NotFound(_) | TemplateError::Render(_) => {
                Self::Permanent(error.to_string())
            }
        }
    }
}

impl From<DirectoryError> for DeliveryError {
    fn from(error: DirectoryError) -> Self {
        match error {
            DirectoryError::NotFound { .. } => Self::Permanent(error.to_string()),
            _ => Self::Transient(error.to_string()),
        }
    }
}

impl From<StorageError> for DeliveryError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::Serialization(_) | StorageError::Corrupt(_) => {
                Self::Permanent(error.to_string())
            }
            _ => Self::Transient(error.to_string()),
        }
    }
}

impl From<DispatchError> for DeliveryError {
    fn from(error: DispatchError) -> Self {
        match error {
            DispatchError::Resolution(inner) => inner.into(),
            DispatchError::Validation(inner) => Self::Permanent(inner.to_string()),
            DispatchError::Persistence(inner) => inner.into(),
            DispatchError::Template(inner) => inner.into(),
        }
    }
}
