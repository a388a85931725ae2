pub mod autosave;
pub mod coordinator;
pub mod error;
pub mod mail_policy;
pub mod ports;
pub mod service;
pub mod validation;
