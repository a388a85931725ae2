use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::contract::{
    client::NestedApi,
    error::NestedError,
    model::{
        Asset, AssetUrl, Availability, LoadOutcome, Profile, ProfileFields, Project,
        ProjectDraft, ProjectPatch, SaveOutcome, Session, UserId,
    },
};
use crate::domain::service::Service;

/// Local implementation of the NestedApi trait that delegates to the domain service
pub struct NestedLocalClient {
    service: Arc<Service>,
}

impl NestedLocalClient {
    pub fn new(service: Arc<Service>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl NestedApi for NestedLocalClient {
    fn is_remote_configured(&self) -> bool {
        self.service.is_remote_configured()
    }

    async fn save_profile(
        &self,
        session: &Session,
        fields: ProfileFields,
    ) -> Result<SaveOutcome<Profile>, NestedError> {
        self.service
            .save_profile(session, fields)
            .await
            .map_err(Into::into)
    }

    async fn load_profile(&self, session: &Session) -> Result<LoadOutcome<Profile>, NestedError> {
        self.service.load_profile(session).await.map_err(Into::into)
    }

    async fn load_profile_of(&self, user: &UserId) -> Result<LoadOutcome<Profile>, NestedError> {
        self.service.load_profile_of(user).await.map_err(Into::into)
    }

    async fn check_username_available(
        &self,
        session: &Session,
        username: &str,
    ) -> Result<Availability, NestedError> {
        self.service
            .check_username_available(session, username)
            .await
            .map_err(Into::into)
    }

    async fn check_email_available(&self, email: &str) -> Result<Availability, NestedError> {
        self.service
            .check_email_available(email)
            .await
            .map_err(Into::into)
    }

    async fn upload_avatar(
        &self,
        session: &Session,
        asset: Asset,
    ) -> Result<(AssetUrl, SaveOutcome<Profile>), NestedError> {
        self.service
            .upload_avatar(session, asset)
            .await
            .map_err(Into::into)
    }

    async fn create_project(
        &self,
        session: &Session,
        draft: ProjectDraft,
    ) -> Result<SaveOutcome<Project>, NestedError> {
        self.service
            .create_project(session, draft)
            .await
            .map_err(Into::into)
    }

    async fn update_project(
        &self,
        session: &Session,
        id: Uuid,
        patch: ProjectPatch,
    ) -> Result<SaveOutcome<Project>, NestedError> {
        self.service
            .update_project(session, id, patch)
            .await
            .map_err(Into::into)
    }

    async fn upload_project_icon(
        &self,
        session: &Session,
        id: Uuid,
        asset: Asset,
    ) -> Result<(AssetUrl, SaveOutcome<Project>), NestedError> {
        self.service
            .upload_project_icon(session, id, asset)
            .await
            .map_err(Into::into)
    }

    async fn load_project(
        &self,
        session: &Session,
        id: Uuid,
    ) -> Result<LoadOutcome<Project>, NestedError> {
        self.service
            .load_project(session, id)
            .await
            .map_err(Into::into)
    }

    async fn list_my_projects(
        &self,
        session: &Session,
    ) -> Result<LoadOutcome<Vec<Project>>, NestedError> {
        self.service
            .list_my_projects(session)
            .await
            .map_err(Into::into)
    }

    async fn discover_projects(
        &self,
        session: &Session,
    ) -> Result<LoadOutcome<Vec<Project>>, NestedError> {
        self.service
            .discover_projects(session)
            .await
            .map_err(Into::into)
    }

    async fn delete_project(&self, session: &Session, id: Uuid) -> Result<(), NestedError> {
        self.service
            .delete_project(session, id)
            .await
            .map_err(Into::into)
    }

    async fn delete_account(&self, session: &Session) -> Result<(), NestedError> {
        self.service.delete_account(session).await.map_err(Into::into)
    }

    fn authorize_email(
        &self,
        recipient: &str,
        kind: &str,
        redirect_to: Option<&str>,
    ) -> Result<(), NestedError> {
        self.service
            .authorize_email(recipient, kind, redirect_to)
            .map_err(Into::into)
    }
}
