use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn, Span};
use uuid::Uuid;

use crate::contract::model::{
    Asset, AssetKind, AssetUrl, Availability, LoadOutcome, Profile, ProfileFields, Project,
    ProjectDraft, ProjectIcon, ProjectPatch, SaveOutcome, Session, UserId,
};
use crate::domain::coordinator::{
    profile_cache_key, projects_cache_key, Cached, Coordinator, RemoteRead, RemoteWrite,
    Unavailable,
};
use crate::domain::error::DomainError;
use crate::domain::mail_policy::MailPolicy;
use crate::domain::ports::{AssetBucket, ListFilter, LocalCache, Lookup, RemoteStore, Table};
use crate::domain::validation::{
    validate_asset, validate_edu_email, validate_profile_fields, validate_profile_limits,
    validate_project_draft, validate_project_patch, validate_username_format,
};

/// Domain service: validation, dual-write and ownership rules.
/// Depends only on the ports, not on infra types.
#[derive(Clone)]
pub struct Service {
    store: Coordinator,
    mail: Arc<MailPolicy>,
}

impl Service {
    pub fn new(
        remote: Option<Arc<dyn RemoteStore>>,
        cache: Arc<dyn LocalCache>,
        mail: MailPolicy,
    ) -> Self {
        Self {
            store: Coordinator::new(remote, cache),
            mail: Arc::new(mail),
        }
    }

    pub fn is_remote_configured(&self) -> bool {
        self.store.is_remote_configured()
    }

    // --- profiles ---

    #[instrument(
        name = "nested.service.save_profile",
        skip_all,
        fields(user_id = tracing::field::Empty)
    )]
    pub async fn save_profile(
        &self,
        session: &Session,
        fields: ProfileFields,
    ) -> Result<SaveOutcome<Profile>, DomainError> {
        let user = require_user(session)?;
        Span::current().record("user_id", user.as_str());

        let cache_key = profile_cache_key(&user);
        validate_profile_limits(&fields).map_err(DomainError::validation)?;
        let mut current = self
            .store
            .read_cached::<Profile>(&cache_key)
            .map(|c| c.record);
        // The onboarding rule needs the stored record, not just the edit.
        if current.is_none() && fields.onboarding_completed == Some(true) {
            current = self.remote_profile(&user).await;
        }
        validate_profile_fields(&fields, current.as_ref()).map_err(DomainError::validation)?;

        let mut body = to_body(&fields)?;
        if let Value::Object(map) = &mut body {
            map.insert("id".to_string(), Value::String(user.to_string()));
        }

        let outcome = self
            .store
            .save_single(Table::Profiles, user.as_str(), &cache_key, &body, |cached| {
                let mut profile = cached
                    .or(current)
                    .unwrap_or_else(|| Profile::new(user.clone()));
                fields.apply_to(&mut profile);
                profile
            })
            .await?;
        debug!(synced = outcome.is_synced(), "Profile saved");
        Ok(outcome)
    }

    #[instrument(
        name = "nested.service.load_profile",
        skip_all,
        fields(user_id = tracing::field::Empty)
    )]
    pub async fn load_profile(&self, session: &Session) -> Result<LoadOutcome<Profile>, DomainError> {
        let user = require_user(session)?;
        Span::current().record("user_id", user.as_str());
        Ok(self
            .store
            .load_single(Table::Profiles, user.as_str(), &profile_cache_key(&user))
            .await)
    }

    /// Another user's profile. Never touches the caller's cache slot.
    #[instrument(name = "nested.service.load_profile_of", skip(self), fields(user_id = %user))]
    pub async fn load_profile_of(&self, user: &UserId) -> Result<LoadOutcome<Profile>, DomainError> {
        Ok(match self.store.get::<Profile>(Table::Profiles, user.as_str()).await {
            RemoteRead::Found(record) => LoadOutcome::Remote { record },
            RemoteRead::NotFound => LoadOutcome::Absent,
            RemoteRead::Unavailable(reason) => {
                debug!(reason = %reason, "Remote read failed");
                LoadOutcome::Absent
            }
        })
    }

    #[instrument(name = "nested.service.check_username_available", skip(self, session))]
    pub async fn check_username_available(
        &self,
        session: &Session,
        username: &str,
    ) -> Result<Availability, DomainError> {
        if let Some(e) = validate_username_format(username) {
            return Err(DomainError::validation(e));
        }
        let lookup = Lookup::UsernameTaken {
            username: username.to_string(),
            except: session.user_id().cloned(),
        };
        Ok(self.availability(&lookup).await)
    }

    #[instrument(name = "nested.service.check_email_available", skip(self))]
    pub async fn check_email_available(&self, email: &str) -> Result<Availability, DomainError> {
        validate_edu_email(email).map_err(DomainError::validation)?;
        let lookup = Lookup::EmailRegistered(email.trim().to_ascii_lowercase());
        Ok(self.availability(&lookup).await)
    }

    async fn availability(&self, lookup: &Lookup) -> Availability {
        let Some(remote) = self.store.remote() else {
            return Availability::Unknown;
        };
        match remote.lookup(lookup).await {
            Ok(true) => Availability::Taken,
            Ok(false) => Availability::Available,
            Err(e) => {
                warn!(error = %e, "Availability lookup failed");
                Availability::Unknown
            }
        }
    }

    #[instrument(
        name = "nested.service.upload_avatar",
        skip_all,
        fields(user_id = tracing::field::Empty, mime = %asset.mime_type, size = asset.bytes.len())
    )]
    pub async fn upload_avatar(
        &self,
        session: &Session,
        asset: Asset,
    ) -> Result<(AssetUrl, SaveOutcome<Profile>), DomainError> {
        let user = require_user(session)?;
        Span::current().record("user_id", user.as_str());

        let path = format!("{user}/avatar.{}", extension_for(&asset.mime_type));
        let url = self
            .store
            .save_asset(AssetKind::Avatar, AssetBucket::Avatars, &path, &asset)
            .await?;
        let fields = ProfileFields {
            avatar: Some(url.as_str().to_string()),
            ..ProfileFields::default()
        };
        let outcome = match &url {
            AssetUrl::Hosted(_) => self.save_profile(session, fields).await?,
            // Inline data never leaves the local cache.
            AssetUrl::Inline(_) => {
                let cache_key = profile_cache_key(&user);
                let known = match self.store.read_cached::<Profile>(&cache_key) {
                    Some(c) => Some(c.record),
                    None => self.remote_profile(&user).await,
                };
                let mut profile = known.unwrap_or_else(|| Profile::new(user.clone()));
                fields.apply_to(&mut profile);
                self.store.write_cached(&cache_key, &profile, true);
                debug!("Inline avatar kept locally");
                SaveOutcome::SavedLocallyOnly(profile)
            }
        };
        Ok((url, outcome))
    }

    // --- projects ---

    #[instrument(
        name = "nested.service.create_project",
        skip_all,
        fields(user_id = tracing::field::Empty, name = %draft.name)
    )]
    pub async fn create_project(
        &self,
        session: &Session,
        draft: ProjectDraft,
    ) -> Result<SaveOutcome<Project>, DomainError> {
        let owner = require_user(session)?;
        Span::current().record("user_id", owner.as_str());
        validate_project_draft(&draft).map_err(DomainError::validation)?;

        let project = Project::from_draft(Uuid::new_v4(), owner.clone(), draft, Utc::now());
        info!(project_id = %project.id, "Creating project");
        self.save_project_record(&owner, project).await
    }

    #[instrument(
        name = "nested.service.update_project",
        skip_all,
        fields(user_id = tracing::field::Empty, project_id = %id)
    )]
    pub async fn update_project(
        &self,
        session: &Session,
        id: Uuid,
        patch: ProjectPatch,
    ) -> Result<SaveOutcome<Project>, DomainError> {
        let owner = require_user(session)?;
        Span::current().record("user_id", owner.as_str());
        validate_project_patch(&patch).map_err(DomainError::validation)?;

        let project = self.owned_project(&owner, id).await?;
        self.apply_patch(&owner, project, &patch).await
    }

    #[instrument(
        name = "nested.service.upload_project_icon",
        skip_all,
        fields(user_id = tracing::field::Empty, project_id = %id)
    )]
    pub async fn upload_project_icon(
        &self,
        session: &Session,
        id: Uuid,
        asset: Asset,
    ) -> Result<(AssetUrl, SaveOutcome<Project>), DomainError> {
        let owner = require_user(session)?;
        Span::current().record("user_id", owner.as_str());
        validate_asset(AssetKind::ProjectIcon, &asset).map_err(DomainError::AssetRejected)?;

        let project = self.owned_project(&owner, id).await?;
        let path = format!("{owner}/{id}.{}", extension_for(&asset.mime_type));
        let url = self
            .store
            .save_asset(AssetKind::ProjectIcon, AssetBucket::ProjectIcons, &path, &asset)
            .await?;
        let patch = ProjectPatch {
            icon: Some(ProjectIcon::Image(url.as_str().to_string())),
            ..ProjectPatch::default()
        };
        let outcome = match &url {
            AssetUrl::Hosted(_) => self.apply_patch(&owner, project, &patch).await?,
            AssetUrl::Inline(_) => {
                let mut project = project;
                project.apply(&patch);
                project.updated_at = Utc::now();
                self.cache_project(&owner, &project, true);
                debug!("Inline project icon kept locally");
                SaveOutcome::SavedLocallyOnly(project)
            }
        };
        Ok((url, outcome))
    }

    #[instrument(name = "nested.service.load_project", skip(self, session), fields(project_id = %id))]
    pub async fn load_project(
        &self,
        session: &Session,
        id: Uuid,
    ) -> Result<LoadOutcome<Project>, DomainError> {
        match self.store.get::<Project>(Table::Projects, &id.to_string()).await {
            RemoteRead::Found(project) => {
                if session.user_id() == Some(&project.owner_id) {
                    self.cache_project(&project.owner_id, &project, false);
                }
                return Ok(LoadOutcome::Remote { record: project });
            }
            RemoteRead::NotFound => {}
            RemoteRead::Unavailable(reason) => {
                debug!(reason = %reason, "Remote read failed, using cache");
            }
        }
        let cached = session
            .user_id()
            .and_then(|user| self.cached_projects(user))
            .and_then(|entries| entries.into_iter().find(|c| c.record.id == id));
        Ok(match cached {
            Some(c) => LoadOutcome::Cached {
                record: c.record,
                unsynced: c.unsynced,
            },
            None => LoadOutcome::Absent,
        })
    }

    /// On remote success the cached list is replaced wholesale.
    #[instrument(
        name = "nested.service.list_my_projects",
        skip_all,
        fields(user_id = tracing::field::Empty)
    )]
    pub async fn list_my_projects(
        &self,
        session: &Session,
    ) -> Result<LoadOutcome<Vec<Project>>, DomainError> {
        let owner = require_user(session)?;
        Span::current().record("user_id", owner.as_str());

        match self
            .store
            .list::<Project>(Table::Projects, &ListFilter::OwnedBy(owner.clone()))
            .await
        {
            Ok(projects) => {
                let entries: Vec<Cached<&Project>> =
                    projects.iter().map(|p| Cached::new(p, false)).collect();
                self.store.write_json(&projects_cache_key(&owner), &entries);
                debug!(count = projects.len(), "Listed projects");
                Ok(LoadOutcome::Remote { record: projects })
            }
            Err(reason) => {
                debug!(reason = %reason, "Remote list failed, using cache");
                Ok(cached_list(self.cached_projects(&owner), |_| true))
            }
        }
    }

    /// Published projects from everyone. Offline, only the caller's own
    /// cached published projects are known.
    #[instrument(name = "nested.service.discover_projects", skip_all)]
    pub async fn discover_projects(
        &self,
        session: &Session,
    ) -> Result<LoadOutcome<Vec<Project>>, DomainError> {
        match self
            .store
            .list::<Project>(Table::Projects, &ListFilter::Published)
            .await
        {
            Ok(projects) => Ok(LoadOutcome::Remote { record: projects }),
            Err(reason) => {
                debug!(reason = %reason, "Remote list failed, using cache");
                let entries = session.user_id().and_then(|u| self.cached_projects(u));
                Ok(cached_list(entries, |p| p.published))
            }
        }
    }

    #[instrument(
        name = "nested.service.delete_project",
        skip_all,
        fields(user_id = tracing::field::Empty, project_id = %id)
    )]
    pub async fn delete_project(&self, session: &Session, id: Uuid) -> Result<(), DomainError> {
        let owner = require_user(session)?;
        Span::current().record("user_id", owner.as_str());

        match self.store.get::<Project>(Table::Projects, &id.to_string()).await {
            RemoteRead::Found(project) => {
                ensure_owner(&owner, &project)?;
                self.store
                    .delete(Table::Projects, &id.to_string())
                    .await
                    .map_err(|e| DomainError::transport(e.to_string()))?;
                self.forget_project(&owner, id);
                info!("Project deleted");
                Ok(())
            }
            // Never reached the backend; only the local copy exists.
            RemoteRead::NotFound | RemoteRead::Unavailable(Unavailable::NotConfigured) => {
                if self.forget_project(&owner, id) {
                    info!("Local-only project deleted");
                    Ok(())
                } else {
                    Err(DomainError::project_not_found(id))
                }
            }
            RemoteRead::Unavailable(Unavailable::Failed(reason)) => {
                Err(DomainError::transport(reason))
            }
        }
    }

    /// Removes the profile, every owned project and both cache slots.
    /// Requires the remote store when one is configured; never succeeds locally
    /// while the backend still holds the data.
    #[instrument(
        name = "nested.service.delete_account",
        skip_all,
        fields(user_id = tracing::field::Empty)
    )]
    pub async fn delete_account(&self, session: &Session) -> Result<(), DomainError> {
        let user = require_user(session)?;
        Span::current().record("user_id", user.as_str());

        if self.store.is_remote_configured() {
            let owned = self
                .store
                .list::<Project>(Table::Projects, &ListFilter::OwnedBy(user.clone()))
                .await
                .map_err(|e| DomainError::transport(e.to_string()))?;
            for project in &owned {
                self.store
                    .delete(Table::Projects, &project.id.to_string())
                    .await
                    .map_err(|e| DomainError::transport(e.to_string()))?;
            }
            self.store
                .delete(Table::Profiles, user.as_str())
                .await
                .map_err(|e| DomainError::transport(e.to_string()))?;
            info!(projects = owned.len(), "Account deleted remotely");
        }

        self.store.remove(&profile_cache_key(&user));
        self.store.remove(&projects_cache_key(&user));
        Ok(())
    }

    // --- auth email gate ---

    pub fn authorize_email(
        &self,
        recipient: &str,
        kind: &str,
        redirect_to: Option<&str>,
    ) -> Result<(), DomainError> {
        self.mail.authorize(recipient, kind, redirect_to, Utc::now())
    }

    // --- helpers ---

    /// Remote copy of the user's profile, if the backend answers with one.
    async fn remote_profile(&self, user: &UserId) -> Option<Profile> {
        match self.store.get::<Profile>(Table::Profiles, user.as_str()).await {
            RemoteRead::Found(profile) => Some(profile),
            RemoteRead::NotFound => None,
            RemoteRead::Unavailable(reason) => {
                debug!(reason = %reason, "Remote read failed");
                None
            }
        }
    }

    /// Best known copy of a project the caller owns: remote if reachable,
    /// else the cached entry.
    async fn owned_project(&self, owner: &UserId, id: Uuid) -> Result<Project, DomainError> {
        let cached = || {
            self.cached_projects(owner)
                .and_then(|entries| entries.into_iter().find(|c| c.record.id == id))
        };
        let project = match self.store.get::<Project>(Table::Projects, &id.to_string()).await {
            RemoteRead::Found(project) => project,
            // A synced cache entry that the backend no longer has is stale.
            RemoteRead::NotFound => match cached() {
                Some(c) if c.unsynced => c.record,
                Some(_) => {
                    self.forget_project(owner, id);
                    return Err(DomainError::project_not_found(id));
                }
                None => return Err(DomainError::project_not_found(id)),
            },
            RemoteRead::Unavailable(reason) => {
                debug!(reason = %reason, "Remote read failed, using cache");
                cached()
                    .map(|c| c.record)
                    .ok_or_else(|| DomainError::project_not_found(id))?
            }
        };
        ensure_owner(owner, &project)?;
        Ok(project)
    }

    async fn apply_patch(
        &self,
        owner: &UserId,
        mut project: Project,
        patch: &ProjectPatch,
    ) -> Result<SaveOutcome<Project>, DomainError> {
        project.apply(patch);
        project.updated_at = Utc::now();
        self.save_project_record(owner, project).await
    }

    async fn save_project_record(
        &self,
        owner: &UserId,
        project: Project,
    ) -> Result<SaveOutcome<Project>, DomainError> {
        let body = to_body(&project)?;
        match self
            .store
            .upsert::<Project>(Table::Projects, &project.id.to_string(), &body)
            .await
        {
            RemoteWrite::Accepted(saved) => {
                self.cache_project(owner, &saved, false);
                Ok(SaveOutcome::Saved(saved))
            }
            RemoteWrite::Conflict(field) => Err(DomainError::conflict(field)),
            RemoteWrite::Unavailable(reason) => {
                if reason == Unavailable::NotConfigured {
                    debug!(project_id = %project.id, "Remote not configured, saving locally");
                } else {
                    warn!(project_id = %project.id, reason = %reason, "Remote write failed, saving locally");
                }
                self.cache_project(owner, &project, true);
                Ok(SaveOutcome::SavedLocallyOnly(project))
            }
        }
    }

    fn cached_projects(&self, owner: &UserId) -> Option<Vec<Cached<Project>>> {
        self.store.read_json(&projects_cache_key(owner))
    }

    fn cache_project(&self, owner: &UserId, project: &Project, unsynced: bool) {
        let mut entries = self.cached_projects(owner).unwrap_or_default();
        let entry = Cached::new(project.clone(), unsynced);
        match entries.iter_mut().find(|c| c.record.id == project.id) {
            Some(slot) => *slot = entry,
            None => entries.push(entry),
        }
        self.store.write_json(&projects_cache_key(owner), &entries);
    }

    /// Returns whether an entry was removed.
    fn forget_project(&self, owner: &UserId, id: Uuid) -> bool {
        let Some(mut entries) = self.cached_projects(owner) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|c| c.record.id != id);
        if entries.len() == before {
            return false;
        }
        self.store.write_json(&projects_cache_key(owner), &entries);
        true
    }
}

fn require_user(session: &Session) -> Result<UserId, DomainError> {
    session.user_id().cloned().ok_or(DomainError::NotAuthenticated)
}

fn ensure_owner(user: &UserId, project: &Project) -> Result<(), DomainError> {
    if &project.owner_id == user {
        Ok(())
    } else {
        Err(DomainError::NotOwner {
            user: user.clone(),
            project: project.id,
        })
    }
}

fn to_body<T: Serialize>(value: &T) -> Result<Value, DomainError> {
    serde_json::to_value(value).map_err(|e| DomainError::transport(format!("encode: {e}")))
}

fn cached_list(
    entries: Option<Vec<Cached<Project>>>,
    keep: impl Fn(&Project) -> bool,
) -> LoadOutcome<Vec<Project>> {
    let Some(entries) = entries else {
        return LoadOutcome::Absent;
    };
    let mut unsynced = false;
    let record = entries
        .into_iter()
        .filter(|c| keep(&c.record))
        .map(|c| {
            unsynced |= c.unsynced;
            c.record
        })
        .collect();
    LoadOutcome::Cached { record, unsynced }
}

fn extension_for(mime: &str) -> &'static str {
    match mime.to_ascii_lowercase().as_str() {
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "jpg",
    }
}
