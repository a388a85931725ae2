use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EmailError {
    #[error("email is required")]
    EmptyInput,
    #[error("email is not a valid address")]
    MalformedEmail,
    #[error("a university (.edu) email is required")]
    NonEduDomain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum UsernameError {
    #[error("username must be at least 3 characters")]
    TooShort,
    #[error("username must be at most 30 characters")]
    TooLong,
    #[error("username may only contain letters, numbers, underscores and dots")]
    InvalidChars,
    #[error("username cannot start with a dot")]
    LeadingDot,
    #[error("username cannot end with a dot")]
    TrailingDot,
    #[error("username cannot contain consecutive dots")]
    ConsecutiveDots,
    #[error("username cannot be only numbers")]
    NumericOnly,
    #[error("this username is reserved")]
    Reserved,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("bio is {len} characters (max {max})")]
    BioTooLong { len: usize, max: usize },
    #[error("{count} skills listed (max {max})")]
    TooManySkills { count: usize, max: usize },
    #[error("description of project entry #{index} is {len} characters (max {max})")]
    ProjectDescriptionTooLong { index: usize, len: usize, max: usize },
    #[error("onboarding cannot be completed without {missing}")]
    IncompleteOnboarding { missing: &'static str },
    #[error("project name is required")]
    EmptyProjectName,
    #[error("communication link '{link}' is not an http(s) URL")]
    InvalidCommunicationLink { link: String },
}

/// Why input was rejected before any I/O.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationKind {
    #[error(transparent)]
    Email(#[from] EmailError),
    #[error(transparent)]
    Username(#[from] UsernameError),
    #[error(transparent)]
    Field(#[from] FieldError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssetError {
    #[error("unsupported file type '{mime}' (allowed: jpeg, png, gif, webp)")]
    UnsupportedType { mime: String },
    #[error("file is {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },
    #[error("storage rejected the file: {reason}")]
    Rejected { reason: String },
}

/// Errors that are safe to expose to callers of [`crate::contract::client::NestedApi`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NestedError {
    #[error("Validation error: {kind}")]
    Validation { kind: ValidationKind },

    #[error("'{field}' is already taken")]
    Conflict { field: String },

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Asset rejected: {kind}")]
    AssetRejected { kind: AssetError },

    #[error("Project not found: {id}")]
    NotFound { id: Uuid },

    #[error("Not allowed: {message}")]
    Forbidden { message: String },

    #[error("Too many emails: {message}")]
    RateLimited { message: String },

    #[error("Backend unavailable")]
    Unavailable,
}

impl NestedError {
    pub fn validation(kind: impl Into<ValidationKind>) -> Self {
        Self::Validation { kind: kind.into() }
    }

    pub fn conflict(field: impl Into<String>) -> Self {
        Self::Conflict {
            field: field.into(),
        }
    }
}

impl From<crate::domain::error::DomainError> for NestedError {
    fn from(domain_error: crate::domain::error::DomainError) -> Self {
        use crate::domain::error::DomainError::*;
        match domain_error {
            ValidationFailed(kind) => Self::Validation { kind },
            Conflict { field } => Self::Conflict { field },
            NotAuthenticated => Self::NotAuthenticated,
            AssetRejected(kind) => Self::AssetRejected { kind },
            ProjectNotFound { id } => Self::NotFound { id },
            NotOwner { user, project } => Self::Forbidden {
                message: format!("{user} does not own project {project}"),
            },
            RedirectNotAllowed { url } => Self::Forbidden {
                message: format!("redirect to '{url}' is not allowed"),
            },
            RateLimited { recipient, kind } => Self::RateLimited {
                message: format!("{kind} emails to {recipient}"),
            },
            Transport { .. } => Self::Unavailable,
        }
    }
}
