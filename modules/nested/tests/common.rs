#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use nested::config::MailConfig;
use nested::contract::error::AssetError;
use nested::contract::model::{
    Asset, Category, Commitment, ProjectDraft, Role, Session, Stage, UserId,
};
use nested::domain::coordinator::{profile_cache_key, projects_cache_key};
use nested::domain::mail_policy::{MailPolicy, MailPolicyConfig};
use nested::domain::ports::{
    AssetBucket, ListFilter, LocalCache, Lookup, RemoteError, RemoteStore, Table,
};
use nested::domain::service::Service;
use nested::infra::cache::MemoryCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadMode {
    Accept,
    /// Storage answers with a policy rejection.
    Reject,
    /// Storage unreachable.
    Fail,
}

/// In-memory stand-in for the hosted backend.
pub struct FakeRemote {
    tables: Mutex<HashMap<Table, BTreeMap<String, Value>>>,
    emails: Mutex<HashSet<String>>,
    online: AtomicBool,
    upload_mode: Mutex<UploadMode>,
    latency: Mutex<Option<Duration>>,
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            tables: Mutex::new(HashMap::new()),
            emails: Mutex::new(HashSet::new()),
            online: AtomicBool::new(true),
            upload_mode: Mutex::new(UploadMode::Accept),
            latency: Mutex::new(None),
            calls: Mutex::new(HashMap::new()),
        })
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn set_upload_mode(&self, mode: UploadMode) {
        *self.upload_mode.lock() = mode;
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    pub fn register_email(&self, email: &str) {
        self.emails.lock().insert(email.to_ascii_lowercase());
    }

    pub fn seed(&self, table: Table, row: Value) {
        let key = row["id"].as_str().unwrap_or_default().to_string();
        self.tables.lock().entry(table).or_default().insert(key, row);
    }

    pub fn row(&self, table: Table, key: &str) -> Option<Value> {
        self.tables.lock().get(&table)?.get(key).cloned()
    }

    pub fn row_count(&self, table: Table) -> usize {
        self.tables.lock().get(&table).map_or(0, |t| t.len())
    }

    pub fn calls(&self, op: &str) -> usize {
        self.calls.lock().get(op).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }

    async fn enter(&self, op: &'static str) -> Result<(), RemoteError> {
        *self.calls.lock().entry(op).or_default() += 1;
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RemoteError::transport("connection refused"))
        }
    }
}

#[async_trait]
impl RemoteStore for FakeRemote {
    async fn get(&self, table: Table, key: &str) -> Result<Option<Value>, RemoteError> {
        self.enter("get").await?;
        Ok(self.row(table, key))
    }

    async fn upsert(&self, table: Table, key: &str, row: &Value) -> Result<Value, RemoteError> {
        self.enter("upsert").await?;
        let mut tables = self.tables.lock();
        let rows = tables.entry(table).or_default();

        if table == Table::Profiles {
            if let Some(name) = row.get("username").and_then(Value::as_str) {
                let taken = rows.iter().any(|(id, other)| {
                    id != key
                        && other["username"]
                            .as_str()
                            .is_some_and(|n| n.eq_ignore_ascii_case(name))
                });
                if taken {
                    return Err(RemoteError::unique_violation("username"));
                }
            }
        }

        let mut merged = rows
            .get(key)
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default()));
        if let (Value::Object(target), Value::Object(fields)) = (&mut merged, row) {
            for (k, v) in fields {
                target.insert(k.clone(), v.clone());
            }
            target.insert("id".to_string(), Value::String(key.to_string()));
        }
        rows.insert(key.to_string(), merged.clone());
        Ok(merged)
    }

    async fn delete(&self, table: Table, key: &str) -> Result<bool, RemoteError> {
        self.enter("delete").await?;
        Ok(self
            .tables
            .lock()
            .get_mut(&table)
            .and_then(|t| t.remove(key))
            .is_some())
    }

    async fn list(&self, table: Table, filter: &ListFilter) -> Result<Vec<Value>, RemoteError> {
        self.enter("list").await?;
        let tables = self.tables.lock();
        let Some(rows) = tables.get(&table) else {
            return Ok(Vec::new());
        };
        Ok(rows
            .values()
            .filter(|row| match filter {
                ListFilter::OwnedBy(user) => row["owner_id"].as_str() == Some(user.as_str()),
                ListFilter::Published => row["published"].as_bool() == Some(true),
            })
            .cloned()
            .collect())
    }

    async fn lookup(&self, lookup: &Lookup) -> Result<bool, RemoteError> {
        self.enter("lookup").await?;
        match lookup {
            Lookup::UsernameTaken { username, except } => {
                let tables = self.tables.lock();
                Ok(tables.get(&Table::Profiles).is_some_and(|rows| {
                    rows.iter().any(|(id, row)| {
                        except.as_ref().map(UserId::as_str) != Some(id.as_str())
                            && row["username"]
                                .as_str()
                                .is_some_and(|n| n.eq_ignore_ascii_case(username))
                    })
                }))
            }
            Lookup::EmailRegistered(email) => Ok(self.emails.lock().contains(email)),
        }
    }

    async fn upload_asset(
        &self,
        bucket: AssetBucket,
        path: &str,
        _asset: &Asset,
    ) -> Result<String, RemoteError> {
        self.enter("upload").await?;
        let mode = *self.upload_mode.lock();
        match mode {
            UploadMode::Accept => Ok(format!("https://cdn.test/{}/{path}", bucket.as_str())),
            UploadMode::Reject => Err(RemoteError::AssetRejected(AssetError::Rejected {
                reason: "bucket policy".to_string(),
            })),
            UploadMode::Fail => Err(RemoteError::transport("storage unreachable")),
        }
    }
}

/// Policy built from the shipped mail defaults.
pub fn mail_policy() -> MailPolicy {
    MailPolicy::new(&MailPolicyConfig::from(&MailConfig::default())).unwrap()
}

/// Service backed by `remote` (or no remote at all) and a fresh memory cache.
pub fn service(remote: Option<Arc<FakeRemote>>) -> (Service, Arc<MemoryCache>) {
    let cache = Arc::new(MemoryCache::new());
    let remote = remote.map(|r| r as Arc<dyn RemoteStore>);
    let service = Service::new(remote, cache.clone(), mail_policy());
    (service, cache)
}

pub fn user(id: &str) -> UserId {
    UserId::new(id)
}

pub fn session(id: &str) -> Session {
    Session::authenticated(user(id))
}

pub fn draft(name: &str) -> ProjectDraft {
    ProjectDraft {
        name: name.to_string(),
        tagline: "Find your people".to_string(),
        description: String::new(),
        category: Category::SideProject,
        stage: Stage::Idea,
        icon: None,
        roles_needed: vec![Role::Developer, Role::Designer],
        skills: vec!["rust".to_string()],
        commitment: Commitment::PartTime,
        communication_link: None,
        published: true,
    }
}

pub fn png(len: usize) -> Asset {
    Asset {
        file_name: "pic.png".to_string(),
        mime_type: "image/png".to_string(),
        bytes: vec![0x89; len],
    }
}

/// Raw cache envelope for the user's profile slot.
pub fn cached_profile(cache: &MemoryCache, id: &str) -> Option<Value> {
    cache
        .read(&profile_cache_key(&user(id)))
        .map(|raw| serde_json::from_str(&raw).unwrap())
}

pub fn cached_projects(cache: &MemoryCache, id: &str) -> Option<Vec<Value>> {
    cache
        .read(&projects_cache_key(&user(id)))
        .map(|raw| serde_json::from_str(&raw).unwrap())
}
