use super::ExpiryStore;
use crate::config::StoreConfig;
use crate::core::Clock;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{Level, event, info_span};

/// Background task that periodically removes expired entities from the store.
pub struct ExpirySweeper {
    stop_tx: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<()>>,
}

impl ExpirySweeper {
    /// Signals the sweeper to stop and waits for it to finish.
    pub async fn stop(mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        if let Some(join_handle) = self.join_handle.take() {
            if let Err(err) = join_handle.await {
                event!(Level::WARN, error = %err, "expiry sweeper join failed");
            }
        }
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(join_handle) = self.join_handle.take() {
            join_handle.abort();
        }
    }
}

/// Spawns the sweeper. The first sweep runs one interval after start.
pub fn spawn_expiry_sweeper(
    store: Arc<ExpiryStore>,
    config: &StoreConfig,
    clock: Arc<dyn Clock>,
) -> ExpirySweeper {
    let interval = config.sweep_interval();
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

    let join_handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = &mut stop_rx => {
                    break;
                }
                _ = sleep(interval) => {
                    let span = info_span!("ttl.sweep");
                    let now = clock.now();
                    match store.sweep_expired(now).await {
                        Ok(0) => {}
                        Ok(removed) => span.in_scope(|| {
                            event!(Level::DEBUG, removed = removed, "expired entities removed")
                        }),
                        Err(err) => span.in_scope(|| {
                            event!(Level::ERROR, error = %err, "expiry sweep failed")
                        }),
                    }
                }
            }
        }
    });

    ExpirySweeper {
        stop_tx: Some(stop_tx),
        join_handle: Some(join_handle),
    }
}
