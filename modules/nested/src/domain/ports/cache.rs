/// Synchronous key-value store of JSON strings.
///
/// Implementations never surface write failures; they log and move on.
pub trait LocalCache: Send + Sync {
    fn read(&self, key: &str) -> Option<String>;
    fn write(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}
