pub mod cache;
pub mod remote;

pub use cache::LocalCache;
pub use remote::{AssetBucket, ListFilter, Lookup, RemoteError, RemoteStore, Table};
