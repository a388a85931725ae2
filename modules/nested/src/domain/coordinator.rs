//! Dual-write policy between the hosted backend and the local cache.
//!
//! The remote store is the source of truth whenever it answers. The cache is
//! always written *after* the remote attempt resolves, and only holds records
//! the remote confirmed, except entries explicitly tagged `unsynced`.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::contract::model::{Asset, AssetKind, AssetUrl, LoadOutcome, SaveOutcome, UserId};
use crate::domain::error::DomainError;
use crate::domain::ports::{AssetBucket, ListFilter, LocalCache, RemoteError, RemoteStore, Table};
use crate::domain::validation::validate_asset;

pub fn profile_cache_key(user: &UserId) -> String {
    format!("nested:profile:{user}")
}

pub fn projects_cache_key(user: &UserId) -> String {
    format!("nested:projects:{user}")
}

/// Envelope stored in the local cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cached<T> {
    pub record: T,
    #[serde(default)]
    pub unsynced: bool,
    pub cached_at: DateTime<Utc>,
}

impl<T> Cached<T> {
    pub fn new(record: T, unsynced: bool) -> Self {
        Self {
            record,
            unsynced,
            cached_at: Utc::now(),
        }
    }
}

/// Why the remote store could not serve a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unavailable {
    /// No usable connection parameters; the app runs cache-only.
    NotConfigured,
    Failed(String),
}

impl std::fmt::Display for Unavailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotConfigured => f.write_str("remote store not configured"),
            Self::Failed(reason) => f.write_str(reason),
        }
    }
}

pub enum RemoteWrite<T> {
    Accepted(T),
    Conflict(String),
    Unavailable(Unavailable),
}

pub enum RemoteRead<T> {
    Found(T),
    NotFound,
    Unavailable(Unavailable),
}

#[derive(Clone)]
pub struct Coordinator {
    remote: Option<Arc<dyn RemoteStore>>,
    cache: Arc<dyn LocalCache>,
}

impl Coordinator {
    /// `remote = None` puts every operation in cache-only mode.
    pub fn new(remote: Option<Arc<dyn RemoteStore>>, cache: Arc<dyn LocalCache>) -> Self {
        Self { remote, cache }
    }

    pub fn is_remote_configured(&self) -> bool {
        self.remote.is_some()
    }

    pub fn remote(&self) -> Option<&Arc<dyn RemoteStore>> {
        self.remote.as_ref()
    }

    // --- remote primitives ---

    pub async fn upsert<T: DeserializeOwned>(
        &self,
        table: Table,
        key: &str,
        body: &Value,
    ) -> RemoteWrite<T> {
        let Some(remote) = &self.remote else {
            return RemoteWrite::Unavailable(Unavailable::NotConfigured);
        };
        match remote.upsert(table, key, body).await {
            Ok(row) => match serde_json::from_value(row) {
                Ok(record) => RemoteWrite::Accepted(record),
                Err(e) => RemoteWrite::Unavailable(Unavailable::Failed(format!(
                    "unreadable {} row: {e}",
                    table.as_str()
                ))),
            },
            Err(e) => match e.uniqueness_field() {
                Some(field) => RemoteWrite::Conflict(field.to_string()),
                None => RemoteWrite::Unavailable(Unavailable::Failed(e.to_string())),
            },
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, table: Table, key: &str) -> RemoteRead<T> {
        let Some(remote) = &self.remote else {
            return RemoteRead::Unavailable(Unavailable::NotConfigured);
        };
        match remote.get(table, key).await {
            Ok(Some(row)) => match serde_json::from_value(row) {
                Ok(record) => RemoteRead::Found(record),
                Err(e) => RemoteRead::Unavailable(Unavailable::Failed(format!(
                    "unreadable {} row: {e}",
                    table.as_str()
                ))),
            },
            Ok(None) => RemoteRead::NotFound,
            Err(e) => RemoteRead::Unavailable(Unavailable::Failed(e.to_string())),
        }
    }

    /// Rows that fail to decode are skipped.
    pub async fn list<T: DeserializeOwned>(
        &self,
        table: Table,
        filter: &ListFilter,
    ) -> Result<Vec<T>, Unavailable> {
        let Some(remote) = &self.remote else {
            return Err(Unavailable::NotConfigured);
        };
        let rows = remote
            .list(table, filter)
            .await
            .map_err(|e| Unavailable::Failed(e.to_string()))?;
        Ok(rows
            .into_iter()
            .filter_map(|row| match serde_json::from_value(row) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(table = table.as_str(), error = %e, "Skipping unreadable row");
                    None
                }
            })
            .collect())
    }

    pub async fn delete(&self, table: Table, key: &str) -> Result<bool, Unavailable> {
        let Some(remote) = &self.remote else {
            return Err(Unavailable::NotConfigured);
        };
        remote
            .delete(table, key)
            .await
            .map_err(|e| Unavailable::Failed(e.to_string()))
    }

    // --- cache primitives ---

    /// Malformed cache content reads as absent.
    pub fn read_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.cache.read(key)?;
        match serde_json::from_str(&raw) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(cache_key = key, error = %e, "Ignoring malformed cache entry");
                None
            }
        }
    }

    pub fn write_json<T: Serialize>(&self, key: &str, value: &T) {
        match serde_json::to_string(value) {
            Ok(raw) => self.cache.write(key, &raw),
            Err(e) => warn!(cache_key = key, error = %e, "Failed to encode cache entry"),
        }
    }

    pub fn remove(&self, key: &str) {
        self.cache.remove(key);
    }

    pub fn read_cached<T: DeserializeOwned>(&self, key: &str) -> Option<Cached<T>> {
        self.read_json(key)
    }

    pub fn write_cached<T: Serialize>(&self, key: &str, record: &T, unsynced: bool) {
        self.write_json(key, &Cached::new(record, unsynced));
    }

    // --- single-record slots ---

    /// Write path: remote upsert, then mirror; on remote failure fold the
    /// edit into the cached record via `apply_locally` and tag it unsynced.
    pub async fn save_single<R, F>(
        &self,
        table: Table,
        key: &str,
        cache_key: &str,
        body: &Value,
        apply_locally: F,
    ) -> Result<SaveOutcome<R>, DomainError>
    where
        R: Serialize + DeserializeOwned,
        F: FnOnce(Option<R>) -> R,
    {
        match self.upsert::<R>(table, key, body).await {
            RemoteWrite::Accepted(record) => {
                self.write_cached(cache_key, &record, false);
                debug!(table = table.as_str(), key, "Saved remotely");
                Ok(SaveOutcome::Saved(record))
            }
            RemoteWrite::Conflict(field) => {
                debug!(table = table.as_str(), key, field = %field, "Remote rejected duplicate");
                Err(DomainError::conflict(field))
            }
            RemoteWrite::Unavailable(Unavailable::NotConfigured) => {
                debug!(table = table.as_str(), key, "Remote not configured, saving locally");
                Ok(self.save_locally(cache_key, apply_locally))
            }
            RemoteWrite::Unavailable(Unavailable::Failed(reason)) => {
                warn!(table = table.as_str(), key, reason = %reason, "Remote write failed, saving locally");
                Ok(self.save_locally(cache_key, apply_locally))
            }
        }
    }

    fn save_locally<R, F>(&self, cache_key: &str, apply_locally: F) -> SaveOutcome<R>
    where
        R: Serialize + DeserializeOwned,
        F: FnOnce(Option<R>) -> R,
    {
        let current = self.read_cached::<R>(cache_key).map(|c| c.record);
        let record = apply_locally(current);
        self.write_cached(cache_key, &record, true);
        SaveOutcome::SavedLocallyOnly(record)
    }

    /// Read path: remote first (overwriting the cache), cache on absence or failure.
    pub async fn load_single<R>(&self, table: Table, key: &str, cache_key: &str) -> LoadOutcome<R>
    where
        R: Serialize + DeserializeOwned,
    {
        match self.get::<R>(table, key).await {
            RemoteRead::Found(record) => {
                self.write_cached(cache_key, &record, false);
                LoadOutcome::Remote { record }
            }
            RemoteRead::NotFound => self.cached_outcome(cache_key),
            RemoteRead::Unavailable(reason) => {
                debug!(table = table.as_str(), key, reason = %reason, "Remote read failed, using cache");
                self.cached_outcome(cache_key)
            }
        }
    }

    fn cached_outcome<R: DeserializeOwned>(&self, cache_key: &str) -> LoadOutcome<R> {
        match self.read_cached::<R>(cache_key) {
            Some(c) => LoadOutcome::Cached {
                record: c.record,
                unsynced: c.unsynced,
            },
            None => LoadOutcome::Absent,
        }
    }

    // --- assets ---

    /// Validate, upload, and fall back to an inline data URI when the upload fails.
    pub async fn save_asset(
        &self,
        kind: AssetKind,
        bucket: AssetBucket,
        path: &str,
        asset: &Asset,
    ) -> Result<AssetUrl, DomainError> {
        validate_asset(kind, asset).map_err(DomainError::AssetRejected)?;

        let Some(remote) = &self.remote else {
            return Ok(AssetUrl::Inline(data_uri(asset)));
        };
        match remote.upload_asset(bucket, path, asset).await {
            Ok(url) => Ok(AssetUrl::Hosted(url)),
            Err(RemoteError::AssetRejected(kind)) => Err(DomainError::AssetRejected(kind)),
            Err(e) => {
                warn!(bucket = bucket.as_str(), path, error = %e, "Upload failed, inlining asset");
                Ok(AssetUrl::Inline(data_uri(asset)))
            }
        }
    }
}

fn data_uri(asset: &Asset) -> String {
    format!(
        "data:{};base64,{}",
        asset.mime_type.to_ascii_lowercase(),
        STANDARD.encode(&asset.bytes)
    )
}
