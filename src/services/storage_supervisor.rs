use std::{future::Future, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{dao::storage::StorageError, state::{SharedState, StorageBackend}};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Connect to the storage backend and keep it installed while healthy.
///
/// While storage is unreachable the handles are withdrawn, so every live operation
/// fails fast with a retryable error instead of hanging.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<StorageBackend, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(backend) => {
                state.install_storage(backend.clone()).await;
                info!("storage connection established; leaving degraded mode");
                delay = INITIAL_DELAY;

                supervise(&state, &backend).await;
                warn!("exhausted storage reconnect attempts; opening a fresh connection");

                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
            Err(err) => {
                warn!(error = %err, "storage connection attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
}

/// Poll the installed backend until it fails and cannot be reconnected.
async fn supervise(state: &SharedState, backend: &StorageBackend) {
    loop {
        if backend.live.health_check().await.is_ok() {
            sleep(HEALTH_POLL_INTERVAL).await;
            continue;
        }

        if !reconnect(state, backend).await {
            return;
        }
        sleep(HEALTH_POLL_INTERVAL).await;
    }
}

async fn reconnect(state: &SharedState, backend: &StorageBackend) -> bool {
    let mut reconnect_delay = INITIAL_DELAY;

    for attempt in 0..MAX_RECONNECT_ATTEMPTS {
        match backend.live.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "storage reconnection succeeded after health check failure");
                if state.is_degraded().await {
                    state.install_storage(backend.clone()).await;
                }
                return true;
            }
            Err(err) => {
                if attempt == 0 {
                    warn!(
                        attempt, error = %err,
                        "storage reconnect first attempt failed; entering degraded mode"
                    );
                    state.clear_storage().await;
                } else {
                    warn!(attempt, error = %err, "storage reconnect attempt failed");
                }
                sleep(reconnect_delay).await;
                reconnect_delay = (reconnect_delay * 2).min(MAX_DELAY);
            }
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dao::{directory::memory::MemoryDirectory, live_store::memory::MemoryLiveStore},
        services::badges::LoggingBadgeAwarder,
        state::AppState,
    };
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn installs_storage_and_withdraws_it_while_unreachable() {
        let state = AppState::new(AppConfig::default(), Arc::new(LoggingBadgeAwarder));
        let store = MemoryLiveStore::new();
        let directory = MemoryDirectory::new();
        let backend = StorageBackend {
            live: Arc::new(store.clone()),
            confirmations: Arc::new(directory.clone()),
            games: Arc::new(directory),
        };
        let mut degraded = state.degraded_watcher();

        let supervisor = tokio::spawn(run(state.clone(), move || {
            let backend = backend.clone();
            async move { backend.live.health_check().await.map(|()| backend) }
        }));

        degraded.wait_for(|value| !*value).await.unwrap();
        assert!(state.storage().await.is_some());

        store.set_unavailable(true);
        degraded.wait_for(|value| *value).await.unwrap();
        assert!(state.storage().await.is_none());

        store.set_unavailable(false);
        degraded.wait_for(|value| !*value).await.unwrap();
        assert!(state.storage().await.is_some());

        supervisor.abort();
    }
}
