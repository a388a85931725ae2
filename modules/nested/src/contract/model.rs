use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Opaque user identifier issued by the authentication subsystem.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Explicit caller context. Operations on "the current user" read the id from here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    user: Option<UserId>,
}

impl Session {
    pub fn authenticated(user: UserId) -> Self {
        Self { user: Some(user) }
    }

    pub fn anonymous() -> Self {
        Self { user: None }
    }

    pub fn user_id(&self) -> Option<&UserId> {
        self.user.as_ref()
    }
}

// --- profile ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LookingFor {
    JoinProject,
    FindCofounder,
}

/// A project listed on a profile (free-form, not a [`Project`] listing).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectEntry {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileLinks {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portfolio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkedin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discord: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub university: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub looking_for: Vec<LookingFor>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub projects: Vec<ProjectEntry>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub links: ProfileLinks,
    #[serde(default)]
    pub onboarding_completed: bool,
}

impl Profile {
    /// Blank profile, the starting point of the first upsert.
    pub fn new(id: UserId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }
}

/// Partial profile update. Only `Some` fields are written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub university: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interests: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub looking_for: Option<Vec<LookingFor>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skills: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projects: Option<Vec<ProjectEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<ProfileLinks>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onboarding_completed: Option<bool>,
}

impl ProfileFields {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Overwrite `profile` with every field present in `self`.
    pub fn apply_to(&self, profile: &mut Profile) {
        if let Some(v) = &self.username {
            profile.username = Some(v.clone());
        }
        if let Some(v) = &self.first_name {
            profile.first_name = v.clone();
        }
        if let Some(v) = &self.last_name {
            profile.last_name = v.clone();
        }
        if let Some(v) = &self.university {
            profile.university = v.clone();
        }
        if let Some(v) = &self.bio {
            profile.bio = v.clone();
        }
        if let Some(v) = &self.interests {
            profile.interests = v.clone();
        }
        if let Some(v) = &self.looking_for {
            profile.looking_for = v.clone();
        }
        if let Some(v) = &self.skills {
            profile.skills = v.clone();
        }
        if let Some(v) = &self.projects {
            profile.projects = v.clone();
        }
        if let Some(v) = &self.avatar {
            profile.avatar = Some(v.clone());
        }
        if let Some(v) = &self.links {
            profile.links = v.clone();
        }
        if let Some(v) = self.onboarding_completed {
            profile.onboarding_completed = v;
        }
    }

    /// Fold a newer edit into this one; fields present in `newer` win.
    pub fn merge(&mut self, newer: ProfileFields) {
        macro_rules! take {
            ($($f:ident),*) => {
                $(if newer.$f.is_some() { self.$f = newer.$f; })*
            };
        }
        take!(
            username,
            first_name,
            last_name,
            university,
            bio,
            interests,
            looking_for,
            skills,
            projects,
            avatar,
            links,
            onboarding_completed
        );
    }
}

// --- project ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Startup,
    ClassProject,
    SideProject,
    Research,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Idea,
    Mvp,
    InProgress,
    LookingForTeam,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Commitment {
    Casual,
    PartTime,
    FullTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Developer,
    Designer,
    ProductManager,
    Marketing,
    Business,
    Researcher,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ProjectIcon {
    Emoji(String),
    /// Hosted URL or inline `data:` URI
    Image(String),
}

impl Default for ProjectIcon {
    fn default() -> Self {
        Self::Emoji("🚀".to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub owner_id: UserId,
    pub name: String,
    #[serde(default)]
    pub tagline: String,
    #[serde(default)]
    pub description: String,
    pub category: Category,
    pub stage: Stage,
    #[serde(default)]
    pub icon: ProjectIcon,
    #[serde(default)]
    pub roles_needed: Vec<Role>,
    #[serde(default)]
    pub skills: Vec<String>,
    pub commitment: Commitment,
    #[serde(default)]
    pub communication_link: Option<String>,
    #[serde(default)]
    pub published: bool,
    #[serde(default)]
    pub team: Vec<UserId>,
    /// Always `roles_needed.len()`; recomputed on every write.
    #[serde(default)]
    pub spots_left: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn from_draft(id: Uuid, owner_id: UserId, draft: ProjectDraft, now: DateTime<Utc>) -> Self {
        let mut project = Self {
            id,
            owner_id,
            name: draft.name,
            tagline: draft.tagline,
            description: draft.description,
            category: draft.category,
            stage: draft.stage,
            icon: draft.icon.unwrap_or_default(),
            roles_needed: draft.roles_needed,
            skills: draft.skills,
            commitment: draft.commitment,
            communication_link: draft.communication_link,
            published: draft.published,
            team: Vec::new(),
            spots_left: 0,
            created_at: now,
            updated_at: now,
        };
        project.refresh_derived();
        project
    }

    pub fn refresh_derived(&mut self) {
        self.spots_left = u32::try_from(self.roles_needed.len()).unwrap_or(u32::MAX);
    }

    pub fn apply(&mut self, patch: &ProjectPatch) {
        if let Some(v) = &patch.name {
            self.name = v.clone();
        }
        if let Some(v) = &patch.tagline {
            self.tagline = v.clone();
        }
        if let Some(v) = &patch.description {
            self.description = v.clone();
        }
        if let Some(v) = patch.category {
            self.category = v;
        }
        if let Some(v) = patch.stage {
            self.stage = v;
        }
        if let Some(v) = &patch.icon {
            self.icon = v.clone();
        }
        if let Some(v) = &patch.roles_needed {
            self.roles_needed = v.clone();
        }
        if let Some(v) = &patch.skills {
            self.skills = v.clone();
        }
        if let Some(v) = patch.commitment {
            self.commitment = v;
        }
        if let Some(v) = &patch.communication_link {
            self.communication_link = v.clone();
        }
        if let Some(v) = patch.published {
            self.published = v;
        }
        self.refresh_derived();
    }
}

/// Input for a new project; id, owner and timestamps are assigned by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDraft {
    pub name: String,
    #[serde(default)]
    pub tagline: String,
    #[serde(default)]
    pub description: String,
    pub category: Category,
    pub stage: Stage,
    #[serde(default)]
    pub icon: Option<ProjectIcon>,
    #[serde(default)]
    pub roles_needed: Vec<Role>,
    #[serde(default)]
    pub skills: Vec<String>,
    pub commitment: Commitment,
    #[serde(default)]
    pub communication_link: Option<String>,
    #[serde(default)]
    pub published: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tagline: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub stage: Option<Stage>,
    #[serde(default)]
    pub icon: Option<ProjectIcon>,
    #[serde(default)]
    pub roles_needed: Option<Vec<Role>>,
    #[serde(default)]
    pub skills: Option<Vec<String>>,
    #[serde(default)]
    pub commitment: Option<Commitment>,
    /// `None` leaves the link alone; `Some(None)` (a JSON `null`) clears it.
    #[serde(
        default,
        deserialize_with = "explicit_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub communication_link: Option<Option<String>>,
    #[serde(default)]
    pub published: Option<bool>,
}

/// Absent key stays `None`; a present key, `null` included, becomes `Some`.
fn explicit_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// --- assets ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Avatar,
    ProjectIcon,
}

impl AssetKind {
    pub const fn max_bytes(self) -> usize {
        match self {
            Self::Avatar => 5 * 1024 * 1024,
            Self::ProjectIcon => 2 * 1024 * 1024,
        }
    }
}

/// An uploaded file as received from the caller.
#[derive(Clone, PartialEq, Eq)]
pub struct Asset {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Asset")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Where an asset ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "storage", content = "url", rename_all = "lowercase")]
pub enum AssetUrl {
    Hosted(String),
    /// `data:` URI kept in the local cache only
    Inline(String),
}

impl AssetUrl {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Hosted(u) | Self::Inline(u) => u,
        }
    }
}

// --- outcomes ---

/// Result of a successful write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "record", rename_all = "snake_case")]
pub enum SaveOutcome<T> {
    /// Accepted by the remote store and mirrored into the cache.
    Saved(T),
    /// Remote unavailable; written to the cache and tagged unsynced.
    SavedLocallyOnly(T),
}

impl<T> SaveOutcome<T> {
    pub fn record(&self) -> &T {
        match self {
            Self::Saved(r) | Self::SavedLocallyOnly(r) => r,
        }
    }

    pub fn into_record(self) -> T {
        match self {
            Self::Saved(r) | Self::SavedLocallyOnly(r) => r,
        }
    }

    pub fn is_synced(&self) -> bool {
        matches!(self, Self::Saved(_))
    }
}

/// Result of a read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum LoadOutcome<T> {
    Remote { record: T },
    Cached { record: T, unsynced: bool },
    Absent,
}

impl<T> LoadOutcome<T> {
    pub fn record(&self) -> Option<&T> {
        match self {
            Self::Remote { record } | Self::Cached { record, .. } => Some(record),
            Self::Absent => None,
        }
    }

    pub fn into_record(self) -> Option<T> {
        match self {
            Self::Remote { record } | Self::Cached { record, .. } => Some(record),
            Self::Absent => None,
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Available,
    Taken,
    /// Remote store could not be asked.
    Unknown,
}
