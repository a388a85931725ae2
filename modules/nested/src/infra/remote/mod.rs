pub mod client;
pub mod http;

pub use client::BackendClient;
pub use http::HttpRemoteStore;
