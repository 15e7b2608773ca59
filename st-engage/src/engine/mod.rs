//! Reconciliation engine
//!
//! Owns optimistic mutation, request single-flight, retry, periodic resync,
//! and rollback. The store is the only state it mutates; the remote service
//! is the source of truth it reconciles against.
//!
//! Single-flight domains are separate for reads and writes: a read must
//! never block behind a slow write, but also must never race ahead of a
//! write's optimistic state. The latter is enforced by discarding any read
//! result that lands while a mutation for the same subject is in flight.

mod comments;
mod likes;
mod resync;

use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{BoxFuture, Shared};
use sqlx::{Pool, Sqlite};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use st_common::events::{EngageEvent, EventBus};
use st_common::model::InteractionState;

use crate::client::InteractionApi;
use crate::config::EngineConfig;
use crate::db;
use crate::store::{InteractionStore, StateKey};

use resync::ResyncWorker;

/// In-flight mutation bookkeeping for one subject
pub(crate) struct WriteFlight {
    pub(crate) generation: u64,
    pub(crate) cancel: CancellationToken,
}

/// Deduplicated in-flight refresh, shared between concurrent callers
pub(crate) type RefreshFuture = Shared<BoxFuture<'static, crate::Result<()>>>;

pub(crate) struct EngineInner {
    pub(crate) api: Arc<dyn InteractionApi>,
    pub(crate) store: InteractionStore,
    pub(crate) cache: Option<Pool<Sqlite>>,
    pub(crate) config: EngineConfig,
    /// Single-flight domain for mutations, keyed by subject
    pub(crate) writes: Mutex<HashMap<Uuid, WriteFlight>>,
    /// Generation source for latest-wins arbitration between mutations
    pub(crate) write_seq: AtomicU64,
    /// Single-flight domain for authoritative reads
    pub(crate) reads: Mutex<HashMap<StateKey, RefreshFuture>>,
    pub(crate) resync: Mutex<Option<ResyncWorker>>,
}

/// Lock a std mutex, recovering the data from a poisoned guard
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// The reconciliation engine
///
/// Cheap to clone; all clones share the same store, caches, and in-flight
/// bookkeeping. Constructed once per process and passed by reference to all
/// consumers.
#[derive(Clone)]
pub struct InteractionEngine {
    pub(crate) inner: Arc<EngineInner>,
}

impl InteractionEngine {
    /// Create an engine over a remote API and an optional persistent cache
    pub fn new(
        api: Arc<dyn InteractionApi>,
        cache: Option<Pool<Sqlite>>,
        config: EngineConfig,
    ) -> Self {
        let bus = EventBus::new(config.event_capacity);
        Self {
            inner: Arc::new(EngineInner {
                api,
                store: InteractionStore::new(bus),
                cache,
                config,
                writes: Mutex::new(HashMap::new()),
                write_seq: AtomicU64::new(0),
                reads: Mutex::new(HashMap::new()),
                resync: Mutex::new(None),
            }),
        }
    }

    /// Subscribe to state-change events
    pub fn subscribe(&self) -> broadcast::Receiver<EngageEvent> {
        self.inner.store.bus().subscribe()
    }

    /// Current number of event subscribers
    pub fn subscriber_count(&self) -> usize {
        self.inner.store.bus().subscriber_count()
    }

    /// Current reconciled state for a (subject, viewer) pair.
    ///
    /// Never blocks. On first sight of a key this returns a default state
    /// and schedules hydration (persistent cache, then an authoritative
    /// refresh) in the background, so it must be called from within a Tokio
    /// runtime.
    pub fn get_state(&self, subject_id: Uuid, viewer_id: Option<Uuid>) -> InteractionState {
        let key = StateKey::new(subject_id, viewer_id);
        let (state, created) = self
            .inner
            .store
            .snapshot(key, self.inner.config.initial_likes_count);

        if created {
            let engine = self.clone();
            tokio::spawn(async move {
                engine.hydrate(key).await;
            });
        }

        state
    }

    /// Register an active view binding for a key, making it eligible for
    /// background resynchronization
    pub fn observe(&self, subject_id: Uuid, viewer_id: Option<Uuid>) {
        let key = StateKey::new(subject_id, viewer_id);
        self.inner
            .store
            .observe(key, self.inner.config.initial_likes_count);
    }

    /// Release a view binding registered with [`Self::observe`]
    pub fn release(&self, subject_id: Uuid, viewer_id: Option<Uuid>) {
        self.inner
            .store
            .release(StateKey::new(subject_id, viewer_id));
    }

    /// Whether a mutating request for the subject is in flight
    pub(crate) fn write_in_flight(&self, subject_id: Uuid) -> bool {
        lock(&self.inner.writes).contains_key(&subject_id)
    }

    /// Cold-start hydration: consult the persistent cache once, then fetch
    /// the authoritative state. Both steps are best-effort.
    pub(crate) async fn hydrate(&self, key: StateKey) {
        if let Some(pool) = &self.inner.cache {
            match db::interactions::load(pool, key.subject_id, key.viewer_id).await {
                Ok(Some(row)) => {
                    self.inner
                        .store
                        .apply_cached(key, row.is_liked, row.likes_count);
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::debug!(
                        subject_id = %key.subject_id,
                        error = %err,
                        "interaction cache read failed"
                    );
                }
            }
        }

        if let Err(err) = self.refresh(key.subject_id, key.viewer_id).await {
            tracing::debug!(
                subject_id = %key.subject_id,
                error = %err,
                "initial refresh failed"
            );
        }
    }

    /// Write-through of the latest state to the persistent cache.
    /// Failures (quota, readonly storage) never affect in-memory state.
    pub(crate) async fn persist_state(&self, key: StateKey, state: &InteractionState) {
        let Some(pool) = &self.inner.cache else {
            return;
        };

        if let Err(err) = db::interactions::save(
            pool,
            key.subject_id,
            key.viewer_id,
            state.is_liked,
            state.likes_count,
        )
        .await
        {
            tracing::warn!(
                subject_id = %key.subject_id,
                error = %err,
                "interaction cache write failed"
            );
        }
    }
}
