//! Debounced profile autosave.
//!
//! Edits are merged into one pending patch; the save fires once the caller
//! has been quiet for the debounce interval. A save that already started is
//! never cancelled by later edits, and saves run one at a time in order.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::contract::model::{Profile, ProfileFields, SaveOutcome, Session};
use crate::domain::error::DomainError;
use crate::domain::service::Service;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(800);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutosaveStatus {
    Idle,
    /// Edits are waiting for the debounce timer or a running save.
    Pending,
    Saved {
        synced: bool,
    },
    Failed {
        message: String,
    },
}

#[derive(Default)]
struct State {
    pending: Option<ProfileFields>,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

struct Inner {
    service: Service,
    session: Session,
    debounce: Duration,
    state: Mutex<State>,
    save_lock: tokio::sync::Mutex<()>,
    status: watch::Sender<AutosaveStatus>,
}

#[derive(Clone)]
pub struct Autosaver {
    inner: Arc<Inner>,
}

impl Autosaver {
    pub fn new(service: Service, session: Session, debounce: Duration) -> Self {
        let (status, _) = watch::channel(AutosaveStatus::Idle);
        Self {
            inner: Arc::new(Inner {
                service,
                session,
                debounce,
                state: Mutex::new(State::default()),
                save_lock: tokio::sync::Mutex::new(()),
                status,
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<AutosaveStatus> {
        self.inner.status.subscribe()
    }

    pub fn status(&self) -> AutosaveStatus {
        self.inner.status.borrow().clone()
    }

    pub fn has_pending(&self) -> bool {
        self.inner.state.lock().pending.is_some()
    }

    /// Queue an edit and restart the debounce timer. Must be called inside a
    /// Tokio runtime.
    pub fn schedule(&self, fields: ProfileFields) {
        if fields.is_empty() {
            return;
        }
        let mut state = self.inner.state.lock();
        match &mut state.pending {
            Some(pending) => pending.merge(fields),
            None => state.pending = Some(fields),
        }
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.generation += 1;

        let generation = state.generation;
        let inner = Arc::clone(&self.inner);
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(inner.debounce).await;
            let fields = {
                let mut state = inner.state.lock();
                if state.generation != generation {
                    return;
                }
                state.timer = None;
                state.pending.take()
            };
            if let Some(fields) = fields {
                // Detached so a later `schedule` cannot abort a running save.
                tokio::spawn(async move {
                    let _ = run_save(&inner, fields).await;
                });
            }
        }));
        drop(state);
        self.inner.status.send_replace(AutosaveStatus::Pending);
    }

    /// Save pending edits now. `None` if nothing was pending.
    pub async fn flush(&self) -> Option<Result<SaveOutcome<Profile>, DomainError>> {
        let fields = {
            let mut state = self.inner.state.lock();
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
            state.generation += 1;
            state.pending.take()
        }?;
        Some(run_save(&self.inner, fields).await)
    }

    /// Drop pending edits without saving.
    pub fn cancel(&self) {
        let mut state = self.inner.state.lock();
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.generation += 1;
        if state.pending.take().is_some() {
            self.inner.status.send_replace(AutosaveStatus::Idle);
        }
    }
}

async fn run_save(
    inner: &Inner,
    fields: ProfileFields,
) -> Result<SaveOutcome<Profile>, DomainError> {
    let _guard = inner.save_lock.lock().await;
    let result = inner.service.save_profile(&inner.session, fields).await;

    let next = match &result {
        Ok(outcome) => {
            debug!(synced = outcome.is_synced(), "Autosave completed");
            AutosaveStatus::Saved {
                synced: outcome.is_synced(),
            }
        }
        Err(e) => {
            warn!(error = %e, "Autosave failed");
            AutosaveStatus::Failed {
                message: e.to_string(),
            }
        }
    };
    if inner.state.lock().pending.is_none() {
        inner.status.send_replace(next);
    }
    result
}
