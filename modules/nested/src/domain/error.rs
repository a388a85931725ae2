use thiserror::Error;
use uuid::Uuid;

use crate::contract::error::{AssetError, ValidationKind};
use crate::contract::model::UserId;

/// Closed set of failures the domain service can report.
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Validation failed: {0}")]
    ValidationFailed(ValidationKind),

    #[error("'{field}' is already taken")]
    Conflict { field: String },

    #[error("No authenticated user in session")]
    NotAuthenticated,

    #[error("Asset rejected: {0}")]
    AssetRejected(AssetError),

    #[error("Project not found: {id}")]
    ProjectNotFound { id: Uuid },

    #[error("User {user} does not own project {project}")]
    NotOwner { user: UserId, project: Uuid },

    #[error("Redirect URL not allowed: {url}")]
    RedirectNotAllowed { url: String },

    #[error("Email rate limit reached for {recipient} ({kind})")]
    RateLimited { recipient: String, kind: String },

    #[error("Remote store unavailable: {message}")]
    Transport { message: String },
}

impl DomainError {
    pub fn validation(kind: impl Into<ValidationKind>) -> Self {
        Self::ValidationFailed(kind.into())
    }

    pub fn conflict(field: impl Into<String>) -> Self {
        Self::Conflict {
            field: field.into(),
        }
    }

    pub fn project_not_found(id: Uuid) -> Self {
        Self::ProjectNotFound { id }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}
