pub mod client;
pub mod error;
pub mod model;
pub mod validation;

pub use client::NestedApi;
pub use error::NestedError;
pub use model::*;
