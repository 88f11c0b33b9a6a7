mod clock;
pub mod hub;
pub mod lifecycle;
pub mod live;

use std::{future::Future, sync::Arc, time::SystemTime};

use dashmap::{DashMap, DashSet};
use tokio::sync::{RwLock, watch};
use tokio::time::timeout;

use crate::{
    config::AppConfig,
    dao::{
        directory::{ConfirmationProvider, GameStatusStore},
        live_store::LiveStore,
    },
    error::ServiceError,
    services::badges::BadgeAwarder,
};

pub use self::clock::MonotonicClock;
pub use self::hub::{Feed, LiveChange, LiveHub};

pub type SharedState = Arc<AppState>;

/// Storage handles installed together once a backend is reachable.
#[derive(Clone)]
pub struct StorageBackend {
    /// Ledger and aggregate persistence.
    pub live: Arc<dyn LiveStore>,
    /// Owner / confirmed participant lookups.
    pub confirmations: Arc<dyn ConfirmationProvider>,
    /// Game-level status reads and the finish write.
    pub games: Arc<dyn GameStatusStore>,
}

impl StorageBackend {
    /// Bundle a backend that implements every storage concern.
    pub fn from_store<S>(store: S) -> Self
    where
        S: LiveStore + ConfirmationProvider + GameStatusStore + Clone + 'static,
    {
        Self {
            live: Arc::new(store.clone()),
            confirmations: Arc::new(store.clone()),
            games: Arc::new(store),
        }
    }
}

/// Central application state storing the storage handles and the live fan-out.
pub struct AppState {
    config: AppConfig,
    storage: RwLock<Option<StorageBackend>>,
    degraded: watch::Sender<bool>,
    hub: LiveHub,
    active_feeds: DashMap<String, usize>,
    badges: Arc<dyn BadgeAwarder>,
    finish_attempts: DashSet<String>,
    clock: MonotonicClock,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig, badges: Arc<dyn BadgeAwarder>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            hub: LiveHub::new(config.hub_capacity),
            config,
            storage: RwLock::new(None),
            degraded: degraded_tx,
            active_feeds: DashMap::new(),
            badges,
            finish_attempts: DashSet::new(),
            clock: MonotonicClock::new(),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Obtain the installed storage handles, if any.
    pub async fn storage(&self) -> Option<StorageBackend> {
        let guard = self.storage.read().await;
        guard.as_ref().cloned()
    }

    /// Installed storage handles, or [`ServiceError::Degraded`].
    pub async fn require_storage(&self) -> Result<StorageBackend, ServiceError> {
        self.storage().await.ok_or(ServiceError::Degraded)
    }

    /// Install a storage backend and leave degraded mode.
    pub async fn install_storage(&self, backend: StorageBackend) {
        {
            let mut guard = self.storage.write().await;
            *guard = Some(backend);
        }
        self.update_degraded(false).await;
    }

    /// Remove the current storage backend and enter degraded mode.
    pub async fn clear_storage(&self) {
        {
            let mut guard = self.storage.write().await;
            guard.take();
        }
        self.update_degraded(true).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        let guard = self.storage.read().await;
        guard.is_none()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Per-game change notifications.
    pub fn hub(&self) -> &LiveHub {
        &self.hub
    }

    /// Open feed subscriptions per game, maintained by the subscription manager.
    pub fn active_feeds(&self) -> &DashMap<String, usize> {
        &self.active_feeds
    }

    pub fn badges(&self) -> &Arc<dyn BadgeAwarder> {
        &self.badges
    }

    /// Games whose badge evaluation was already attempted by this process.
    pub fn finish_attempts(&self) -> &DashSet<String> {
        &self.finish_attempts
    }

    /// Ordering timestamp for a new ledger entry.
    pub fn now(&self) -> SystemTime {
        self.clock.now()
    }

    /// Run a storage write under the configured time bound.
    pub async fn bounded<T, Fut>(&self, work: Fut) -> Result<T, ServiceError>
    where
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        match self.config.write_timeout {
            Some(limit) => timeout(limit, work)
                .await
                .unwrap_or(Err(ServiceError::Timeout)),
            None => work.await,
        }
    }

    /// Update and broadcast the degraded flag when the value changes.
    async fn update_degraded(&self, value: bool) {
        if *self.degraded.borrow() == value {
            return;
        }

        self.degraded.send_replace(value);
    }
}
