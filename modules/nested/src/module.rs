use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::config::NestedConfig;
use crate::contract::client::NestedApi;
use crate::contract::model::Session;
use crate::domain::autosave::Autosaver;
use crate::domain::mail_policy::{MailPolicy, MailPolicyConfig};
use crate::domain::ports::{LocalCache, RemoteStore};
use crate::domain::service::Service;
use crate::gateways::local::NestedLocalClient;
use crate::infra::cache::{FileCache, MemoryCache};
use crate::infra::remote::{BackendClient, HttpRemoteStore};

/// Wires the configured adapters into the domain service.
#[derive(Clone)]
pub struct NestedModule {
    service: Arc<Service>,
    config: NestedConfig,
}

impl NestedModule {
    pub fn init(cfg: NestedConfig, home_dir: &Path) -> anyhow::Result<Self> {
        info!("Initializing nested module");
        let backend = cfg.backend.clone().with_env_overrides();

        let remote: Option<Arc<dyn RemoteStore>> = if backend.is_remote_configured() {
            let client = BackendClient::new(
                &backend.url,
                backend.anon_key.clone(),
                Duration::from_millis(backend.timeout_ms),
            )?;
            info!(url = %client.base(), "Hosted backend configured");
            Some(Arc::new(HttpRemoteStore::new(client)))
        } else {
            warn!("Hosted backend not configured; running in local-only mode");
            None
        };

        let cache: Arc<dyn LocalCache> = match &cfg.cache.dir {
            Some(dir) => {
                let dir = home_dir.join(dir);
                let cache = FileCache::open(&dir)
                    .with_context(|| format!("open cache dir {}", dir.display()))?;
                debug!(dir = %dir.display(), "Using file cache");
                Arc::new(cache)
            }
            None => {
                debug!("Using in-memory cache");
                Arc::new(MemoryCache::new())
            }
        };

        let mail = MailPolicy::new(&MailPolicyConfig::from(&cfg.mail))
            .context("invalid mail redirect allowlist")?;

        Ok(Self::with_adapters(cfg, remote, cache, mail))
    }

    /// Build from explicit adapters, bypassing config-driven wiring.
    pub fn with_adapters(
        cfg: NestedConfig,
        remote: Option<Arc<dyn RemoteStore>>,
        cache: Arc<dyn LocalCache>,
        mail: MailPolicy,
    ) -> Self {
        Self {
            service: Arc::new(Service::new(remote, cache, mail)),
            config: cfg,
        }
    }

    pub fn config(&self) -> &NestedConfig {
        &self.config
    }

    pub fn service(&self) -> Arc<Service> {
        Arc::clone(&self.service)
    }

    pub fn client(&self) -> Arc<dyn NestedApi> {
        Arc::new(NestedLocalClient::new(self.service()))
    }

    pub fn autosaver(&self, session: Session) -> Autosaver {
        Autosaver::new(
            (*self.service).clone(),
            session,
            Duration::from_millis(self.config.autosave_debounce_ms),
        )
    }
}
