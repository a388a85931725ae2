//! Gatekeeping for outgoing auth emails: redirect allowlist and per-recipient
//! hourly rate limits.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use regex::Regex;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::domain::error::DomainError;

pub const DEFAULT_HOURLY_LIMIT: u32 = 10;

#[derive(Debug, Clone)]
pub struct MailPolicyConfig {
    pub default_hourly_limit: u32,
    /// Per email kind ("magic_link", "signup", "recovery", ...).
    pub hourly_limits: HashMap<String, u32>,
    /// `scheme://host[:port]/path` patterns. `*` as the port matches any
    /// port, `*` in the host matches host characters only, and `*` in the
    /// path and query matches any run of characters.
    pub redirect_allowlist: Vec<String>,
}

impl Default for MailPolicyConfig {
    fn default() -> Self {
        Self {
            default_hourly_limit: DEFAULT_HOURLY_LIMIT,
            hourly_limits: HashMap::new(),
            redirect_allowlist: Vec::new(),
        }
    }
}

#[derive(Error, Debug)]
pub enum AllowlistError {
    #[error("redirect pattern '{pattern}' is malformed: {reason}")]
    Malformed { pattern: String, reason: &'static str },
    #[error(transparent)]
    Regex(#[from] regex::Error),
}

#[derive(Debug, PartialEq, Eq)]
enum PortRule {
    /// No port in the pattern: the scheme default only.
    Default,
    Any,
    Exact(u16),
}

/// One allowlist entry, matched against the parsed parts of a URL so that
/// a wildcard can never stretch across the authority.
#[derive(Debug)]
struct RedirectPattern {
    scheme: String,
    host: Regex,
    port: PortRule,
    path: Regex,
}

impl RedirectPattern {
    fn parse(pattern: &str) -> Result<Self, AllowlistError> {
        let malformed = |reason| AllowlistError::Malformed {
            pattern: pattern.to_string(),
            reason,
        };
        let (scheme, rest) = pattern
            .split_once("://")
            .ok_or_else(|| malformed("missing scheme"))?;
        if scheme.is_empty() || scheme.contains('*') {
            return Err(malformed("scheme must be literal"));
        }
        let split = rest.find(&['/', '?', '#'][..]).unwrap_or(rest.len());
        let (authority, path) = rest.split_at(split);
        if authority.contains('@') {
            return Err(malformed("credentials are not allowed"));
        }
        let (host, port) = match authority.rsplit_once(':') {
            Some((host, "*")) => (host, PortRule::Any),
            Some((host, port)) if !port.ends_with(']') => (
                host,
                PortRule::Exact(port.parse().map_err(|_| malformed("invalid port"))?),
            ),
            Some(_) | None => (authority, PortRule::Default),
        };
        if host.is_empty() {
            return Err(malformed("missing host"));
        }
        let path = if path.is_empty() { "/" } else { path };

        Ok(Self {
            scheme: scheme.to_ascii_lowercase(),
            host: wildcard_regex(&host.to_ascii_lowercase(), "[a-z0-9.-]*")?,
            port,
            path: wildcard_regex(path, ".*")?,
        })
    }

    fn matches(&self, url: &Url) -> bool {
        if url.scheme() != self.scheme {
            return false;
        }
        let Some(host) = url.host_str() else {
            return false;
        };
        if !self.host.is_match(host) {
            return false;
        }
        let port_ok = match self.port {
            PortRule::Default => url.port().is_none(),
            PortRule::Any => true,
            PortRule::Exact(port) => url.port_or_known_default() == Some(port),
        };
        if !port_ok {
            return false;
        }
        let target = match url.query() {
            Some(query) => format!("{}?{query}", url.path()),
            None => url.path().to_string(),
        };
        self.path.is_match(&target)
    }
}

pub struct MailPolicy {
    default_limit: u32,
    limits: HashMap<String, u32>,
    allowlist: Vec<RedirectPattern>,
    sent: Mutex<HashMap<(String, String), VecDeque<DateTime<Utc>>>>,
}

impl MailPolicy {
    pub fn new(cfg: &MailPolicyConfig) -> Result<Self, AllowlistError> {
        let allowlist = cfg
            .redirect_allowlist
            .iter()
            .map(|p| RedirectPattern::parse(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            default_limit: cfg.default_hourly_limit,
            limits: cfg.hourly_limits.clone(),
            allowlist,
            sent: Mutex::new(HashMap::new()),
        })
    }

    pub fn limit_for(&self, kind: &str) -> u32 {
        self.limits.get(kind).copied().unwrap_or(self.default_limit)
    }

    /// An empty allowlist rejects every redirect, as does any URL that
    /// carries credentials.
    pub fn is_redirect_allowed(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        if !parsed.username().is_empty() || parsed.password().is_some() {
            return false;
        }
        self.allowlist.iter().any(|p| p.matches(&parsed))
    }

    /// Admit one email of `kind` to `recipient` at `now`, consuming budget on success.
    pub fn authorize(
        &self,
        recipient: &str,
        kind: &str,
        redirect_to: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if let Some(url) = redirect_to {
            if !self.is_redirect_allowed(url) {
                return Err(DomainError::RedirectNotAllowed {
                    url: url.to_string(),
                });
            }
        }

        let recipient = recipient.trim().to_ascii_lowercase();
        let limit = self.limit_for(kind) as usize;
        let window_start = now - Duration::hours(1);

        let mut sent = self.sent.lock();
        // Drop stamps outside the window, and recipients with none left.
        sent.retain(|_, stamps| {
            while stamps.front().is_some_and(|t| *t <= window_start) {
                stamps.pop_front();
            }
            !stamps.is_empty()
        });

        let key = (recipient, kind.to_string());
        if sent.get(&key).map_or(0, VecDeque::len) >= limit {
            debug!(recipient = %key.0, kind, limit, "Email rate limit reached");
            return Err(DomainError::RateLimited {
                recipient: key.0,
                kind: key.1,
            });
        }
        sent.entry(key).or_default().push_back(now);
        Ok(())
    }

    #[cfg(test)]
    fn tracked_recipients(&self) -> usize {
        self.sent.lock().len()
    }
}

fn wildcard_regex(pattern: &str, wildcard: &str) -> Result<Regex, regex::Error> {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(wildcard);
    Regex::new(&format!("^{body}$"))
}
