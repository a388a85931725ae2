use async_trait::async_trait;
use uuid::Uuid;

use crate::contract::{
    error::NestedError,
    model::{
        Asset, AssetUrl, Availability, LoadOutcome, Profile, ProfileFields, Project,
        ProjectDraft, ProjectPatch, SaveOutcome, Session, UserId,
    },
};

/// Public API of the nested module.
#[async_trait]
pub trait NestedApi: Send + Sync {
    /// Whether writes will reach the hosted backend at all.
    fn is_remote_configured(&self) -> bool;

    async fn save_profile(
        &self,
        session: &Session,
        fields: ProfileFields,
    ) -> Result<SaveOutcome<Profile>, NestedError>;

    async fn load_profile(&self, session: &Session) -> Result<LoadOutcome<Profile>, NestedError>;

    async fn load_profile_of(&self, user: &UserId) -> Result<LoadOutcome<Profile>, NestedError>;

    async fn check_username_available(
        &self,
        session: &Session,
        username: &str,
    ) -> Result<Availability, NestedError>;

    async fn check_email_available(&self, email: &str) -> Result<Availability, NestedError>;

    async fn upload_avatar(
        &self,
        session: &Session,
        asset: Asset,
    ) -> Result<(AssetUrl, SaveOutcome<Profile>), NestedError>;

    async fn create_project(
        &self,
        session: &Session,
        draft: ProjectDraft,
    ) -> Result<SaveOutcome<Project>, NestedError>;

    async fn update_project(
        &self,
        session: &Session,
        id: Uuid,
        patch: ProjectPatch,
    ) -> Result<SaveOutcome<Project>, NestedError>;

    async fn upload_project_icon(
        &self,
        session: &Session,
        id: Uuid,
        asset: Asset,
    ) -> Result<(AssetUrl, SaveOutcome<Project>), NestedError>;

    async fn load_project(
        &self,
        session: &Session,
        id: Uuid,
    ) -> Result<LoadOutcome<Project>, NestedError>;

    async fn list_my_projects(
        &self,
        session: &Session,
    ) -> Result<LoadOutcome<Vec<Project>>, NestedError>;

    async fn discover_projects(
        &self,
        session: &Session,
    ) -> Result<LoadOutcome<Vec<Project>>, NestedError>;

    async fn delete_project(&self, session: &Session, id: Uuid) -> Result<(), NestedError>;

    async fn delete_account(&self, session: &Session) -> Result<(), NestedError>;

    /// Gate for the transactional email channel: rate limit and redirect allowlist.
    fn authorize_email(
        &self,
        recipient: &str,
        kind: &str,
        redirect_to: Option<&str>,
    ) -> Result<(), NestedError>;
}
