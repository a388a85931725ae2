pub mod file;
pub mod memory;

pub use file::FileCache;
pub use memory::MemoryCache;
