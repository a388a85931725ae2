//! One JSON file per key under a cache directory.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::domain::ports::LocalCache;

#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    /// Creates `dir` if needed.
    pub fn open(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Keys map to file names injectively: bytes outside `[A-Za-z0-9._-]`
    /// become `~xx`.
    fn path_for(&self, key: &str) -> PathBuf {
        let mut name = String::with_capacity(key.len() + 5);
        for b in key.bytes() {
            if b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-') {
                name.push(b as char);
            } else {
                name.push_str(&format!("~{b:02x}"));
            }
        }
        name.push_str(".json");
        self.dir.join(name)
    }
}

impl LocalCache for FileCache {
    fn read(&self, key: &str) -> Option<String> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Some(raw),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                warn!(cache_key = key, error = %e, "Failed to read cache file");
                None
            }
        }
    }

    fn write(&self, key: &str, value: &str) {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        let result = fs::write(&tmp, value).and_then(|()| fs::rename(&tmp, &path));
        if let Err(e) = result {
            warn!(cache_key = key, path = %path.display(), error = %e, "Failed to write cache file");
            let _ = fs::remove_file(&tmp);
        }
    }

    fn remove(&self, key: &str) {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(cache_key = key, error = %e, "Failed to remove cache file"),
        }
    }
}
