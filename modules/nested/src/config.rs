use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::autosave::DEFAULT_DEBOUNCE;
use crate::domain::mail_policy::{MailPolicyConfig, DEFAULT_HOURLY_LIMIT};

pub const BACKEND_URL_ENV: &str = "NESTED_BACKEND_URL";
pub const BACKEND_KEY_ENV: &str = "NESTED_BACKEND_ANON_KEY";

/// Values shipped in templates that must never be treated as real credentials.
const PLACEHOLDER_MARKERS: &[&str] = &[
    "your-project",
    "your_project",
    "your-supabase",
    "your_supabase",
    "placeholder",
    "example",
    "xxx",
    "changeme",
];

const MIN_ANON_KEY_LEN: usize = 20;

/// Configuration for the nested module
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NestedConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default = "default_debounce_ms")]
    pub autosave_debounce_ms: u64,
    #[serde(default)]
    pub mail: MailConfig,
}

impl Default for NestedConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            cache: CacheConfig::default(),
            autosave_debounce_ms: default_debounce_ms(),
            mail: MailConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub anon_key: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            anon_key: String::new(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl BackendConfig {
    /// True only for a plausible http(s) URL and a non-placeholder key.
    pub fn is_remote_configured(&self) -> bool {
        let url = self.url.trim();
        let key = self.anon_key.trim();
        if is_placeholder(url) || is_placeholder(key) || key.len() < MIN_ANON_KEY_LEN {
            return false;
        }
        let Ok(parsed) = url::Url::parse(url) else {
            return false;
        };
        if !matches!(parsed.scheme(), "http" | "https") {
            return false;
        }
        match parsed.host() {
            Some(url::Host::Domain(d)) => d == "localhost" || d.contains('.'),
            Some(url::Host::Ipv4(_)) | Some(url::Host::Ipv6(_)) => true,
            None => false,
        }
    }

    /// Non-empty overrides replace the configured values.
    pub fn apply_overrides(&mut self, url: Option<String>, anon_key: Option<String>) {
        if let Some(url) = url.filter(|v| !v.trim().is_empty()) {
            self.url = url;
        }
        if let Some(key) = anon_key.filter(|v| !v.trim().is_empty()) {
            self.anon_key = key;
        }
    }

    pub fn with_env_overrides(mut self) -> Self {
        self.apply_overrides(
            std::env::var(BACKEND_URL_ENV).ok(),
            std::env::var(BACKEND_KEY_ENV).ok(),
        );
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Relative paths resolve against the home dir; `None` keeps the cache in memory.
    #[serde(default)]
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MailConfig {
    #[serde(default = "default_hourly_limit")]
    pub default_hourly_limit: u32,
    #[serde(default)]
    pub hourly_limits: HashMap<String, u32>,
    #[serde(default = "default_redirect_allowlist")]
    pub redirect_allowlist: Vec<String>,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            default_hourly_limit: default_hourly_limit(),
            hourly_limits: HashMap::new(),
            redirect_allowlist: default_redirect_allowlist(),
        }
    }
}

impl From<&MailConfig> for MailPolicyConfig {
    fn from(cfg: &MailConfig) -> Self {
        Self {
            default_hourly_limit: cfg.default_hourly_limit,
            hourly_limits: cfg.hourly_limits.clone(),
            redirect_allowlist: cfg.redirect_allowlist.clone(),
        }
    }
}

fn is_placeholder(value: &str) -> bool {
    if value.is_empty() || (value.starts_with('<') && value.ends_with('>')) {
        return true;
    }
    let lower = value.to_ascii_lowercase();
    PLACEHOLDER_MARKERS.iter().any(|m| lower.contains(m))
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE.as_millis() as u64
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_hourly_limit() -> u32 {
    DEFAULT_HOURLY_LIMIT
}

fn default_redirect_allowlist() -> Vec<String> {
    vec![
        "https://nested.app/*".to_string(),
        "http://localhost:*/*".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "eyJhbGciOiJIUzI1NiJ9.anon-test-key";

    fn backend(url: &str, key: &str) -> BackendConfig {
        BackendConfig {
            url: url.to_string(),
            anon_key: key.to_string(),
            ..BackendConfig::default()
        }
    }

    #[test]
    fn defaults_are_local_only() {
        let cfg = NestedConfig::default();
        assert!(!cfg.backend.is_remote_configured());
        assert_eq!(cfg.autosave_debounce_ms, 800);
        assert_eq!(cfg.mail.default_hourly_limit, 10);
        assert!(cfg.cache.dir.is_none());
    }

    #[test]
    fn real_looking_backend_is_configured() {
        assert!(backend("https://abcd1234.supabase.co", KEY).is_remote_configured());
        assert!(backend("http://localhost:54321", KEY).is_remote_configured());
        assert!(backend("http://127.0.0.1:54321", KEY).is_remote_configured());
    }

    #[test]
    fn placeholders_and_malformed_urls_are_rejected() {
        for url in [
            "",
            "https://your-project.supabase.co",
            "https://YOUR_SUPABASE_URL",
            "<backend-url>",
            "https://example.com",
            "ftp://files.nested.app",
            "not a url",
            "https://intranet",
        ] {
            assert!(!backend(url, KEY).is_remote_configured(), "{url}");
        }
        for key in ["", "changeme", "short", "your_supabase_anon_key_goes_here"] {
            assert!(
                !backend("https://abcd1234.supabase.co", key).is_remote_configured(),
                "{key}"
            );
        }
    }

    #[test]
    fn overrides_ignore_blank_values() {
        let mut b = backend("https://a.supabase.co", KEY);
        b.apply_overrides(Some("  ".into()), None);
        assert_eq!(b.url, "https://a.supabase.co");
        b.apply_overrides(Some("https://b.supabase.co".into()), Some("k".into()));
        assert_eq!(b.url, "https://b.supabase.co");
        assert_eq!(b.anon_key, "k");
    }

    #[test]
    fn parses_module_section() {
        let cfg: NestedConfig = serde_json::from_value(serde_json::json!({
            "backend": { "url": "https://a.supabase.co", "anon_key": KEY },
            "cache": { "dir": "cache" },
            "mail": { "hourly_limits": { "recovery": 3 } }
        }))
        .unwrap();
        assert_eq!(cfg.backend.timeout_ms, 10_000);
        assert_eq!(cfg.cache.dir.as_deref(), Some("cache"));
        assert_eq!(cfg.mail.hourly_limits["recovery"], 3);
        assert_eq!(cfg.mail.redirect_allowlist.len(), 2);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = serde_json::from_value::<NestedConfig>(serde_json::json!({ "bogus": 1 }));
        assert!(err.is_err());
    }
}
