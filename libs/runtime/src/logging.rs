use crate::config::{LoggingConfig, Section};
use std::collections::HashMap;
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::level_filters::LevelFilter;
use tracing::Level;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::fmt;

use file_rotate::{
    compression::Compression,
    suffix::{AppendTimestamp, FileLimit},
    ContentLimit, FileRotate,
};

const DEFAULT_SECTION: &str = "default";

fn parse_tracing_level(s: &str) -> Option<Level> {
    match s.to_ascii_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        "off" | "none" => None,
        _ => Some(Level::INFO),
    }
}

fn level_filter(s: &str) -> LevelFilter {
    parse_tracing_level(s)
        .map(LevelFilter::from_level)
        .unwrap_or(LevelFilter::OFF)
}

/// true if `target` is `prefix` itself or one of its `prefix::` children
fn matches_target_prefix(target: &str, prefix: &str) -> bool {
    target == prefix
        || (target.starts_with(prefix) && target[prefix.len()..].starts_with("::"))
}

// -------- rotating file sink --------

type SharedRotate = Arc<Mutex<FileRotate<AppendTimestamp>>>;

#[derive(Clone)]
struct RotatingFile(SharedRotate);

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self.0.lock() {
            Ok(mut f) => f.write(buf),
            Err(_) => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self.0.lock() {
            Ok(mut f) => f.flush(),
            Err(_) => Ok(()),
        }
    }
}

/// Writer that drops everything; used when a record has no file destination.
struct Discard;

impl Write for Discard {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Picks the log file for a record by target prefix, falling back to the default file.
#[derive(Clone, Default)]
struct FileRouter {
    default: Option<SharedRotate>,
    by_target: Vec<(String, SharedRotate)>,
}

impl FileRouter {
    fn is_empty(&self) -> bool {
        self.default.is_none() && self.by_target.is_empty()
    }

    fn resolve(&self, target: &str) -> Option<SharedRotate> {
        self.by_target
            .iter()
            .find(|(prefix, _)| matches_target_prefix(target, prefix))
            .map(|(_, f)| f.clone())
            .or_else(|| self.default.clone())
    }
}

impl<'a> fmt::MakeWriter<'a> for FileRouter {
    type Writer = Box<dyn Write + 'a>;

    fn make_writer(&'a self) -> Self::Writer {
        match &self.default {
            Some(f) => Box::new(RotatingFile(f.clone())),
            None => Box::new(Discard),
        }
    }

    fn make_writer_for(&'a self, meta: &tracing::Metadata<'_>) -> Self::Writer {
        match self.resolve(meta.target()) {
            Some(f) => Box::new(RotatingFile(f)),
            None => Box::new(Discard),
        }
    }
}

/// Relative paths are anchored at `base_dir` (usually the app home dir).
fn resolve_log_path(file: &str, base_dir: &Path) -> PathBuf {
    let p = Path::new(file);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base_dir.join(p)
    }
}

fn open_rotating_file(log_path: &Path, section: &Section) -> std::io::Result<SharedRotate> {
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let max_bytes = section.max_size_mb.unwrap_or(100) * 1024 * 1024;
    let rot = FileRotate::new(
        log_path,
        AppendTimestamp::default(FileLimit::MaxFiles(section.max_backups.unwrap_or(3))),
        ContentLimit::BytesSurpassed(max_bytes as usize),
        Compression::None,
        #[cfg(unix)]
        None,
    );
    Ok(Arc::new(Mutex::new(rot)))
}

// -------- plan --------

/// Resolved sinks and filters for one logging configuration.
struct LoggingPlan {
    console: Targets,
    file: Targets,
    router: FileRouter,
}

fn build_plan(cfg: &LoggingConfig, base_dir: &Path) -> LoggingPlan {
    let mut console = Targets::new().with_default(LevelFilter::OFF);
    let mut file = Targets::new().with_default(LevelFilter::OFF);
    let mut router = FileRouter::default();
    // opened files are shared between sections pointing at the same path
    let mut opened: HashMap<PathBuf, SharedRotate> = HashMap::new();

    for (name, section) in cfg {
        let is_default = name == DEFAULT_SECTION;
        let console_level = level_filter(&section.console_level);
        console = if is_default {
            console.with_default(console_level)
        } else {
            console.with_target(name.clone(), console_level)
        };

        if section.file.trim().is_empty() {
            continue;
        }
        let path = resolve_log_path(&section.file, base_dir);
        let handle = match opened.get(&path) {
            Some(h) => h.clone(),
            None => match open_rotating_file(&path, section) {
                Ok(h) => {
                    opened.insert(path.clone(), h.clone());
                    h
                }
                Err(e) => {
                    eprintln!(
                        "Failed to open log file '{}' for '{}': {}",
                        path.display(),
                        name,
                        e
                    );
                    continue;
                }
            },
        };

        let file_level = level_filter(&section.file_level);
        if is_default {
            router.default = Some(handle);
            file = file.with_default(file_level);
        } else {
            router.by_target.push((name.clone(), handle));
            file = file.with_target(name.clone(), file_level);
        }
    }

    LoggingPlan {
        console,
        file,
        router,
    }
}

// -------- public init --------

/// Install the global subscriber described by `cfg`.
/// Relative log file paths are resolved against `base_dir`.
pub fn init_logging_from_config(cfg: &LoggingConfig, base_dir: &Path) {
    use tracing_subscriber::{layer::SubscriberExt, prelude::*, Registry};

    // Bridge `log` → `tracing` before installing the subscriber
    let _ = tracing_log::LogTracer::init();

    if cfg.is_empty() {
        let _ = fmt()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .try_init();
        return;
    }

    let plan = build_plan(cfg, base_dir);
    // stdout is reserved for command output
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(true)
        .with_level(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_filter(plan.console);

    if plan.router.is_empty() {
        let _ = Registry::default().with(console_layer).try_init();
        return;
    }

    let file_layer = fmt::layer()
        .json()
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_writer(plan.router)
        .with_filter(plan.file);

    let _ = Registry::default()
        .with(console_layer)
        .with(file_layer)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_logging_config;
    use tempfile::tempdir;

    fn section(console: &str, file: &str, file_level: &str) -> Section {
        Section {
            console_level: console.into(),
            file: file.into(),
            file_level: file_level.into(),
            max_backups: Some(2),
            max_size_mb: Some(1),
        }
    }

    #[test]
    fn test_logging_level_parsing() {
        assert_eq!(parse_tracing_level("trace"), Some(Level::TRACE));
        assert_eq!(parse_tracing_level("DEBUG"), Some(Level::DEBUG));
        assert_eq!(parse_tracing_level("Warn"), Some(Level::WARN));
        assert_eq!(parse_tracing_level("off"), None);
        assert_eq!(parse_tracing_level("none"), None);
        assert_eq!(parse_tracing_level("bogus"), Some(Level::INFO));
    }

    #[test]
    fn test_target_prefix_matching() {
        assert!(matches_target_prefix("nested", "nested"));
        assert!(matches_target_prefix("nested::domain::service", "nested"));
        assert!(!matches_target_prefix("nested_cli", "nested"));
    }

    #[test]
    fn test_log_paths_resolved_against_base_dir() {
        let tmp = tempdir().unwrap();
        let resolved = resolve_log_path("logs/nested.log", tmp.path());
        assert!(resolved.starts_with(tmp.path()));
        assert!(resolved.ends_with("logs/nested.log"));
    }

    #[test]
    fn test_plan_creates_files_and_routes_by_target() {
        let tmp = tempdir().unwrap();
        let mut cfg = default_logging_config();
        cfg.insert("nested::infra".into(), section("warn", "logs/infra.log", "debug"));

        let plan = build_plan(&cfg, tmp.path());
        assert!(tmp.path().join("logs").exists());
        assert!(plan.router.default.is_some());
        assert_eq!(plan.router.by_target.len(), 1);

        let routed = plan.router.resolve("nested::infra::remote").unwrap();
        let default = plan.router.resolve("nested::domain").unwrap();
        assert!(!Arc::ptr_eq(&routed, &default));
    }

    #[test]
    fn test_plan_without_files_has_empty_router() {
        let tmp = tempdir().unwrap();
        let mut cfg = LoggingConfig::new();
        cfg.insert(DEFAULT_SECTION.into(), section("info", "", "debug"));
        let plan = build_plan(&cfg, tmp.path());
        assert!(plan.router.is_empty());
    }
}
