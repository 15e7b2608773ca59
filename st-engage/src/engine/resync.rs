//! Background resynchronization
//!
//! On a fixed interval the engine silently re-runs `refresh` for every key
//! with at least one active view binding. A short debounce collapses bursts
//! of triggers (a viewer flipping between subjects, an interval tick close
//! to a manual trigger) into one call per key. Failures are logged and
//! swallowed; the previous good state stays visible.
//!
//! The loop is started and stopped explicitly so the engine carries no
//! hidden dependency on any UI framework's lifecycle.

use std::collections::HashSet;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::store::StateKey;

use super::{lock, InteractionEngine};

/// Handles for the running resync loop
pub(crate) struct ResyncWorker {
    trigger_tx: mpsc::UnboundedSender<StateKey>,
    interval_task: JoinHandle<()>,
    debounce_task: JoinHandle<()>,
}

impl InteractionEngine {
    /// Start the background resync loop. A second call while the loop is
    /// running is a no-op.
    pub fn start_resync(&self) {
        let mut slot = lock(&self.inner.resync);
        if slot.is_some() {
            return;
        }

        let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();

        let interval_engine = self.clone();
        let interval_tx = trigger_tx.clone();
        let interval_task = tokio::spawn(async move {
            interval_engine.interval_loop(interval_tx).await;
        });

        let debounce_engine = self.clone();
        let debounce_task = tokio::spawn(async move {
            debounce_engine.debounce_loop(trigger_rx).await;
        });

        *slot = Some(ResyncWorker {
            trigger_tx,
            interval_task,
            debounce_task,
        });
        tracing::info!("background resync started");
    }

    /// Stop the background resync loop
    pub fn stop_resync(&self) {
        if let Some(worker) = lock(&self.inner.resync).take() {
            worker.interval_task.abort();
            worker.debounce_task.abort();
            tracing::info!("background resync stopped");
        }
    }

    /// Queue a debounced resync for one key (e.g. on visibility or viewer
    /// change). Dropped silently when the loop is not running.
    pub fn request_resync(&self, subject_id: Uuid, viewer_id: Option<Uuid>) {
        if let Some(worker) = lock(&self.inner.resync).as_ref() {
            let _ = worker.trigger_tx.send(StateKey::new(subject_id, viewer_id));
        }
    }

    /// Emit a trigger per observed key on every interval tick. Keys with a
    /// mutation in flight are skipped entirely, not queued.
    async fn interval_loop(self, trigger_tx: mpsc::UnboundedSender<StateKey>) {
        let mut ticker = tokio::time::interval(self.inner.config.resync_interval);
        // The first tick fires immediately; observed keys were just fetched
        ticker.tick().await;

        loop {
            ticker.tick().await;
            for key in self.inner.store.observed_keys() {
                if self.write_in_flight(key.subject_id) {
                    tracing::debug!(
                        subject_id = %key.subject_id,
                        "resync tick skipped, mutation in flight"
                    );
                    continue;
                }
                if trigger_tx.send(key).is_err() {
                    return;
                }
            }
        }
    }

    /// Collapse trigger bursts into one refresh per key
    async fn debounce_loop(self, mut trigger_rx: mpsc::UnboundedReceiver<StateKey>) {
        let debounce = self.inner.config.resync_debounce;

        while let Some(first) = trigger_rx.recv().await {
            let mut pending = HashSet::new();
            pending.insert(first);

            // Keep draining until the burst goes quiet
            loop {
                match tokio::time::timeout(debounce, trigger_rx.recv()).await {
                    Ok(Some(key)) => {
                        pending.insert(key);
                    }
                    Ok(None) => return,
                    Err(_) => break,
                }
            }

            for key in pending {
                if let Err(err) = self.refresh(key.subject_id, key.viewer_id).await {
                    tracing::debug!(
                        subject_id = %key.subject_id,
                        error = %err,
                        "background resync failed"
                    );
                }
            }
        }
    }
}
