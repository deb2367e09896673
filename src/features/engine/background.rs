//! Periodic and connectivity-triggered sync passes.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::sync_engine::SyncEngine;
use crate::remote::ConnectivityEvent;

/// Owns the background task. Dropping the handle leaves the task running
/// until the runtime shuts down; call [`BackgroundHandle::shutdown`] to stop
/// it.
pub struct BackgroundHandle {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl BackgroundHandle {
    /// Stop the scheduler and wait for it to exit. A pass already running
    /// finishes on its own.
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let _ = self.task.await;
    }
}

impl SyncEngine {
    /// Spawn the scheduler: a pass every `sync_interval_minutes` when
    /// background sync is enabled, and connectivity events from
    /// `connectivity` applied as they arrive. Passes run on their own tasks so
    /// a disconnect is seen while a pass is in flight; overlapping passes are
    /// skipped by [`SyncEngine::sync_now`].
    #[must_use]
    pub fn start_background(
        &self,
        mut connectivity: mpsc::Receiver<ConnectivityEvent>,
    ) -> BackgroundHandle {
        let engine = self.clone();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let period = engine.config().sync_interval();
        let periodic = engine.config().enable_background_sync;

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut listening = true;
            info!(periodic, interval_secs = period.as_secs(), "Background sync started");

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick(), if periodic => {
                        debug!("Periodic sync due");
                        engine.spawn_pass();
                    }
                    event = connectivity.recv(), if listening => match event {
                        Some(event) => {
                            if engine.note_connectivity(event) {
                                engine.spawn_pass();
                            }
                        }
                        None => listening = false,
                    },
                }
            }
            info!("Background sync stopped");
        });

        BackgroundHandle {
            stop: Some(stop_tx),
            task,
        }
    }

    fn spawn_pass(&self) {
        let engine = self.clone();
        tokio::spawn(async move {
            let result = engine.sync_now().await;
            debug!(skipped = result.skipped, success = result.success, "Background pass done");
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::config::EngineConfig;
    use crate::features::engine::{SyncState, SyncStatus};
    use crate::remote::fakes::{FakeReader, FakeWriter};
    use crate::storage::Database;
    use tokio::sync::broadcast;

    fn engine(config: EngineConfig) -> (SyncEngine, Arc<FakeReader>) {
        let reader = Arc::new(FakeReader::default());
        let engine = SyncEngine::builder(
            Database::open_in_memory().unwrap(),
            reader.clone(),
            Arc::new(FakeWriter::default()),
        )
        .engine_config(config)
        .build()
        .unwrap();
        (engine, reader)
    }

    async fn wait_for(rx: &mut broadcast::Receiver<SyncStatus>, state: SyncState) {
        loop {
            match rx.recv().await {
                Ok(status) if status.state == state => return,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("status channel closed"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_pass_runs_on_interval() {
        let (engine, reader) = engine(EngineConfig {
            scopes: vec![crate::features::delta::SyncScope::Video {
                id: "v1".to_string(),
            }],
            ..EngineConfig::default()
        });
        let mut rx = engine.subscribe();
        let (_tx, conn_rx) = mpsc::channel(4);
        let handle = engine.start_background(conn_rx);

        let started = Instant::now();
        wait_for(&mut rx, SyncState::UpToDate).await;
        assert!(started.elapsed() >= Duration::from_secs(15 * 60));
        assert_eq!(reader.calls().len(), 1);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_connectivity_events_drive_state() {
        let (engine, _reader) = engine(EngineConfig {
            enable_background_sync: false,
            ..EngineConfig::default()
        });
        let mut rx = engine.subscribe();
        let (tx, conn_rx) = mpsc::channel(4);
        let handle = engine.start_background(conn_rx);

        tx.send(ConnectivityEvent::Disconnected).await.unwrap();
        wait_for(&mut rx, SyncState::Offline).await;
        assert!(!engine.is_online());

        tx.send(ConnectivityEvent::Connected).await.unwrap();
        wait_for(&mut rx, SyncState::UpToDate).await;
        assert!(engine.is_online());

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_with_closed_connectivity() {
        let (engine, _reader) = engine(EngineConfig {
            enable_background_sync: false,
            ..EngineConfig::default()
        });
        let (tx, conn_rx) = mpsc::channel(1);
        drop(tx);
        let handle = engine.start_background(conn_rx);
        handle.shutdown().await;
        assert_eq!(engine.status().state, SyncState::Idle);
    }
}
