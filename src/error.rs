use serde::Serialize;
use thiserror::Error;

/// Failure kinds surfaced by every HR operation.
#[derive(Debug, Clone, Error, PartialEq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum HrmError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("permission denied: {0}")]
    Permission(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("upstream failure: {0}")]
    Upstream(String),
}

impl HrmError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn permission(msg: impl Into<String>) -> Self {
        Self::Permission(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::Upstream(msg.into())
    }
}

/// Errors raised by a document store backend.
#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    #[error("unique index violated in {collection}: {key}")]
    UniqueViolation { collection: &'static str, key: String },
    #[error("document {id} not found in {collection}")]
    Missing { collection: &'static str, id: u64 },
    #[error("store backend failure: {0}")]
    Backend(String),
}

impl From<StoreError> for HrmError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation { .. } => HrmError::Conflict(err.to_string()),
            StoreError::Missing { .. } => HrmError::NotFound(err.to_string()),
            StoreError::Backend(msg) => HrmError::Upstream(msg),
        }
    }
}

pub type Result<T, E = HrmError> = std::result::Result<T, E>;
