//! Retention sweeper.
//!
//! Runs once at startup, then every six hours, tombstoning messages older
//! than the retention window. Tombstoned rows stay retrievable by id for
//! audit but are excluded from history, search and replay.

use crate::store::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// Sweep interval between runs.
const SWEEP_INTERVAL: Duration = Duration::from_secs(6 * 3600);

/// Spawn the background sweeper task.
pub fn spawn_retention_sweeper(
    store: Arc<Store>,
    retention_days: i64,
    mut shutdown_rx: tokio::sync::broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        // The first tick fires immediately, which doubles as the startup run.
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let marked = store.run_retention_cleanup(retention_days);
                    if marked > 0 {
                        info!(marked, retention_days, "Retention sweep tombstoned messages");
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Retention sweeper stopping");
                    break;
                }
            }
        }
    })
}
