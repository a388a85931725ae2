//! Pure input validators. Deterministic, no I/O, safe to call before any
//! request leaves the process.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use crate::contract::error::{AssetError, EmailError, FieldError, UsernameError, ValidationKind};
use crate::contract::model::{Asset, AssetKind, Profile, ProfileFields, ProjectDraft, ProjectPatch};

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 30;
pub const BIO_MAX_LEN: usize = 160;
pub const MAX_SKILLS: usize = 7;
pub const PROJECT_ENTRY_DESCRIPTION_MAX_LEN: usize = 120;

/// Non-`.edu` university suffixes accepted for sign-up.
pub const INTERNATIONAL_EDU_SUFFIXES: &[&str] = &[".ac.uk", ".edu.au", ".edu.ca", ".ac.za"];

pub const ALLOWED_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];

static EMAIL_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("static email regex"));

static RESERVED_USERNAMES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        // brand
        "nested", "nestedapp", "nested_app", "nestedhq", "official", "team", "staff",
        "support", "help", "admin", "administrator", "moderator", "mod", "root", "system",
        "security", "null", "undefined",
        // routes
        "api", "www", "mail", "email", "app", "auth", "login", "logout", "signin", "signup",
        "register", "onboarding", "settings", "account", "profile", "profiles", "project",
        "projects", "discover", "explore", "messages", "inbox", "notifications", "home",
        "about", "terms", "privacy", "search", "static", "assets",
        // universities
        "nyu", "mit", "harvard", "stanford", "columbia", "yale", "princeton", "berkeley",
        "ucla", "usc", "cornell", "upenn", "brown", "dartmouth", "duke", "caltech",
        "uchicago", "northwestern", "gatech", "umich", "cmu", "oxford", "cambridge",
    ]
    .into_iter()
    .collect()
});

pub fn is_reserved_username(username: &str) -> bool {
    RESERVED_USERNAMES.contains(username.to_ascii_lowercase().as_str())
}

/// University email check. Must pass before an address is sent anywhere.
pub fn validate_edu_email(email: &str) -> Result<(), EmailError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(EmailError::EmptyInput);
    }
    if !EMAIL_SHAPE.is_match(email) {
        return Err(EmailError::MalformedEmail);
    }
    let domain = email
        .rsplit_once('@')
        .map(|(_, d)| d.to_ascii_lowercase())
        .unwrap_or_default();
    let accepted = domain.ends_with(".edu")
        || INTERNATIONAL_EDU_SUFFIXES
            .iter()
            .any(|suffix| domain.ends_with(suffix));
    if !accepted {
        return Err(EmailError::NonEduDomain);
    }
    Ok(())
}

/// Returns the first rule the username breaks, or `None` when it is acceptable.
pub fn validate_username_format(username: &str) -> Option<UsernameError> {
    let len = username.chars().count();
    if len < USERNAME_MIN_LEN {
        return Some(UsernameError::TooShort);
    }
    if len > USERNAME_MAX_LEN {
        return Some(UsernameError::TooLong);
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
    {
        return Some(UsernameError::InvalidChars);
    }
    if username.starts_with('.') {
        return Some(UsernameError::LeadingDot);
    }
    if username.ends_with('.') {
        return Some(UsernameError::TrailingDot);
    }
    if username.contains("..") {
        return Some(UsernameError::ConsecutiveDots);
    }
    if username.chars().all(|c| c.is_ascii_digit()) {
        return Some(UsernameError::NumericOnly);
    }
    if is_reserved_username(username) {
        return Some(UsernameError::Reserved);
    }
    None
}

/// Validate a profile edit. `current` is the best known record and is only
/// used to check the onboarding rule against the merged result.
pub fn validate_profile_fields(
    fields: &ProfileFields,
    current: Option<&Profile>,
) -> Result<(), ValidationKind> {
    validate_profile_limits(fields)?;
    if fields.onboarding_completed == Some(true) {
        let mut merged = current.cloned().unwrap_or_default();
        fields.apply_to(&mut merged);
        check_onboarding_complete(&merged)?;
    }
    Ok(())
}

/// Checks that depend on `fields` alone.
pub fn validate_profile_limits(fields: &ProfileFields) -> Result<(), ValidationKind> {
    if let Some(username) = &fields.username {
        if let Some(e) = validate_username_format(username) {
            return Err(e.into());
        }
    }
    if let Some(bio) = &fields.bio {
        let len = bio.chars().count();
        if len > BIO_MAX_LEN {
            return Err(FieldError::BioTooLong {
                len,
                max: BIO_MAX_LEN,
            }
            .into());
        }
    }
    if let Some(skills) = &fields.skills {
        if skills.len() > MAX_SKILLS {
            return Err(FieldError::TooManySkills {
                count: skills.len(),
                max: MAX_SKILLS,
            }
            .into());
        }
    }
    if let Some(entries) = &fields.projects {
        for (index, entry) in entries.iter().enumerate() {
            let len = entry.description.chars().count();
            if len > PROJECT_ENTRY_DESCRIPTION_MAX_LEN {
                return Err(FieldError::ProjectDescriptionTooLong {
                    index,
                    len,
                    max: PROJECT_ENTRY_DESCRIPTION_MAX_LEN,
                }
                .into());
            }
        }
    }
    Ok(())
}

fn check_onboarding_complete(profile: &Profile) -> Result<(), FieldError> {
    let missing = if profile.university.trim().is_empty() {
        Some("a university")
    } else if profile.interests.is_empty() {
        Some("an interest field")
    } else if profile.looking_for.is_empty() {
        Some("a looking-for choice")
    } else {
        None
    };
    match missing {
        Some(missing) => Err(FieldError::IncompleteOnboarding { missing }),
        None => Ok(()),
    }
}

pub fn validate_project_draft(draft: &ProjectDraft) -> Result<(), ValidationKind> {
    if draft.name.trim().is_empty() {
        return Err(FieldError::EmptyProjectName.into());
    }
    if let Some(link) = &draft.communication_link {
        validate_link(link)?;
    }
    Ok(())
}

pub fn validate_project_patch(patch: &ProjectPatch) -> Result<(), ValidationKind> {
    if let Some(name) = &patch.name {
        if name.trim().is_empty() {
            return Err(FieldError::EmptyProjectName.into());
        }
    }
    if let Some(Some(link)) = &patch.communication_link {
        validate_link(link)?;
    }
    Ok(())
}

fn validate_link(link: &str) -> Result<(), FieldError> {
    match url::Url::parse(link) {
        Ok(u) if matches!(u.scheme(), "http" | "https") && u.host().is_some() => Ok(()),
        _ => Err(FieldError::InvalidCommunicationLink {
            link: link.to_string(),
        }),
    }
}

/// MIME and size ceiling check performed before any upload attempt.
pub fn validate_asset(kind: AssetKind, asset: &Asset) -> Result<(), AssetError> {
    let mime = asset.mime_type.to_ascii_lowercase();
    if !ALLOWED_IMAGE_TYPES.contains(&mime.as_str()) {
        return Err(AssetError::UnsupportedType {
            mime: asset.mime_type.clone(),
        });
    }
    let max = kind.max_bytes();
    if asset.bytes.len() > max {
        return Err(AssetError::TooLarge {
            size: asset.bytes.len(),
            max,
        });
    }
    Ok(())
}
