use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::contract::error::AssetError;
use crate::contract::model::{Asset, UserId};

/// Postgres `unique_violation` SQLSTATE.
pub const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Profiles,
    Projects,
}

impl Table {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Profiles => "profiles",
            Self::Projects => "projects",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetBucket {
    Avatars,
    ProjectIcons,
}

impl AssetBucket {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Avatars => "avatars",
            Self::ProjectIcons => "project-icons",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListFilter {
    OwnedBy(UserId),
    Published,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// Case-insensitive; the `except` user's own row does not count.
    UsernameTaken {
        username: String,
        except: Option<UserId>,
    },
    EmailRegistered(String),
}

#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    #[error("constraint {code} violated: {message}")]
    Constraint {
        code: String,
        field: Option<String>,
        message: String,
    },

    #[error("asset rejected by storage: {0}")]
    AssetRejected(AssetError),

    #[error("transport: {0}")]
    Transport(String),
}

impl RemoteError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn unique_violation(field: impl Into<String>) -> Self {
        let field = field.into();
        Self::Constraint {
            code: UNIQUE_VIOLATION.to_string(),
            message: format!("duplicate value for {field}"),
            field: Some(field),
        }
    }

    /// The only remote failure that must not fall back to the cache.
    pub fn uniqueness_field(&self) -> Option<&str> {
        match self {
            Self::Constraint { code, field, .. } if code == UNIQUE_VIOLATION => {
                Some(field.as_deref().unwrap_or("record"))
            }
            _ => None,
        }
    }
}

/// Port to the hosted backend. Records travel as JSON objects keyed by `id`.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// `Ok(None)` when no row has this key.
    async fn get(&self, table: Table, key: &str) -> Result<Option<Value>, RemoteError>;

    /// Insert-or-update by primary key; returns the stored row.
    async fn upsert(&self, table: Table, key: &str, fields: &Value) -> Result<Value, RemoteError>;

    /// Returns true if a row was deleted.
    async fn delete(&self, table: Table, key: &str) -> Result<bool, RemoteError>;

    async fn list(&self, table: Table, filter: &ListFilter) -> Result<Vec<Value>, RemoteError>;

    async fn lookup(&self, lookup: &Lookup) -> Result<bool, RemoteError>;

    /// Upload (overwriting) `asset` at `path` inside `bucket`; returns its public URL.
    async fn upload_asset(
        &self,
        bucket: AssetBucket,
        path: &str,
        asset: &Asset,
    ) -> Result<String, RemoteError>;
}
