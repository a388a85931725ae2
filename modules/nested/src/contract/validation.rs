//! Input checks that need no backend, for consumers that validate before
//! calling the API.

pub use crate::domain::validation::{validate_edu_email, validate_username_format};
