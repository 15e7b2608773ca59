//! Like toggling and authoritative refresh
//!
//! The optimistic flip is visible to every observer before the network
//! round-trip starts. The server response is the final arbiter: concurrent
//! likes from other viewers make the confirmed count differ from the local
//! guess, and the confirmed value always wins.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use st_common::model::MutationPhase;

use crate::client;
use crate::error::Error;
use crate::store::StateKey;

use super::{lock, InteractionEngine, RefreshFuture, WriteFlight};

impl InteractionEngine {
    /// Toggle the viewer's like on a subject.
    ///
    /// Returns `Ok(true)` when the server confirmed the mutation. Returns
    /// `Ok(false)` when the call was dropped because a mutation for the
    /// subject is already in flight, when it was superseded by a newer call,
    /// or when it rolled back after a transient failure (the failure class
    /// is recorded in the state for passive display). Only `Unauthenticated`
    /// and `Permission` failures are returned as errors.
    pub async fn toggle_like(
        &self,
        subject_id: Uuid,
        viewer_id: Option<Uuid>,
    ) -> crate::Result<bool> {
        let Some(viewer) = viewer_id else {
            return Err(Error::Unauthenticated);
        };
        let key = StateKey::new(subject_id, Some(viewer));
        let initial = self.inner.config.initial_likes_count;

        // Single-flight per subject: drop, don't queue. A previous request
        // that already hit its timeout may still be arbitrating; supersede
        // it so it can never commit late.
        let (generation, cancel) = {
            let mut writes = lock(&self.inner.writes);
            if let Some(flight) = writes.get(&subject_id) {
                if !flight.cancel.is_cancelled() {
                    tracing::debug!(
                        subject_id = %subject_id,
                        "like toggle dropped, mutation already in flight"
                    );
                    return Ok(false);
                }
            }
            let generation = self.inner.write_seq.fetch_add(1, Ordering::Relaxed) + 1;
            let cancel = CancellationToken::new();
            writes.insert(
                subject_id,
                WriteFlight {
                    generation,
                    cancel: cancel.clone(),
                },
            );
            (generation, cancel)
        };

        // Optimistic flip, synchronously visible to all observers
        let ((was_liked, prev_count), _) = self.inner.store.update_state(key, initial, |s| {
            let prior = (s.is_liked, s.likes_count);
            s.is_liked = !prior.0;
            s.likes_count = if prior.0 {
                (prior.1 - 1).max(0)
            } else {
                prior.1 + 1
            };
            s.phase = MutationPhase::Optimistic;
            s.error = None;
            prior
        });

        // The reconcile task owns the request lifecycle so an abandoned
        // caller cannot leave the subject's write slot occupied forever.
        let engine = self.clone();
        let handle = tokio::spawn(async move {
            engine
                .reconcile_toggle(key, viewer, generation, cancel, was_liked, prev_count)
                .await
        });

        match handle.await {
            Ok(result) => result,
            Err(err) => Err(Error::Internal(format!("toggle task failed: {}", err))),
        }
    }

    /// Issue the mutating request and commit or roll back its outcome
    async fn reconcile_toggle(
        &self,
        key: StateKey,
        viewer: Uuid,
        generation: u64,
        cancel: CancellationToken,
        was_liked: bool,
        prev_count: i64,
    ) -> crate::Result<bool> {
        let initial = self.inner.config.initial_likes_count;
        let mutate_timeout = self.inner.config.mutate_timeout;

        let (_, outgoing) = self
            .inner
            .store
            .update_state(key, initial, |s| s.phase = MutationPhase::Reconciling);
        self.persist_state(key, &outgoing).await;

        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = tokio::time::timeout(
                mutate_timeout,
                self.inner.api.toggle_like(key.subject_id, viewer),
            ) => match result {
                Ok(inner) => inner,
                Err(_) => {
                    cancel.cancel();
                    Err(Error::Transient(format!(
                        "like toggle timed out after {:?}",
                        mutate_timeout
                    )))
                }
            }
        };

        // Latest-wins arbitration: only the current generation may commit
        // or roll back. A superseded request's result is discarded without
        // rollback; the newer call owns the state.
        let still_current = {
            let mut writes = lock(&self.inner.writes);
            match writes.get(&key.subject_id) {
                Some(flight) if flight.generation == generation => {
                    writes.remove(&key.subject_id);
                    true
                }
                _ => false,
            }
        };

        if !still_current {
            tracing::debug!(
                subject_id = %key.subject_id,
                generation,
                "like toggle superseded, result discarded"
            );
            return Ok(false);
        }

        match outcome {
            Ok(summary) => {
                // The server is the final arbiter, not the optimistic guess
                let (_, state) = self.inner.store.update_state(key, initial, |s| {
                    s.is_liked = summary.has_liked;
                    s.likes_count = summary.count.max(0);
                    s.phase = MutationPhase::Idle;
                    s.error = None;
                });
                self.inner.store.mark_hydrated(key);
                self.persist_state(key, &state).await;
                Ok(true)
            }
            Err(err) => {
                // Roll back to the exact pre-optimistic snapshot
                let error_kind = match &err {
                    Error::Cancelled => None,
                    other => Some(other.kind()),
                };
                let (_, state) = self.inner.store.update_state(key, initial, |s| {
                    s.is_liked = was_liked;
                    s.likes_count = prev_count;
                    s.phase = MutationPhase::RolledBack;
                    s.error = error_kind;
                });
                self.persist_state(key, &state).await;

                match err {
                    Error::Permission(_) => {
                        tracing::warn!(
                            subject_id = %key.subject_id,
                            error = %err,
                            "like toggle rejected by remote"
                        );
                        Err(err)
                    }
                    Error::Cancelled => Ok(false),
                    other => {
                        tracing::info!(
                            subject_id = %key.subject_id,
                            error = %other,
                            "like toggle rolled back"
                        );
                        Ok(false)
                    }
                }
            }
        }
    }

    /// Fetch the authoritative like state and overwrite the local copy,
    /// unless a mutation for the subject is in flight.
    ///
    /// Concurrent refreshes for the same key share one in-flight request:
    /// the second caller awaits the first's result instead of issuing a
    /// second fetch.
    pub async fn refresh(&self, subject_id: Uuid, viewer_id: Option<Uuid>) -> crate::Result<()> {
        let key = StateKey::new(subject_id, viewer_id);

        // Never clobber an optimistic update with a stale read
        if self.write_in_flight(subject_id) {
            return Ok(());
        }

        let shared = {
            let mut reads = lock(&self.inner.reads);
            if let Some(existing) = reads.get(&key) {
                existing.clone()
            } else {
                let (tx, rx) = tokio::sync::oneshot::channel();
                let shared: RefreshFuture = rx
                    .map(|received| match received {
                        Ok(result) => result,
                        Err(_) => Err(Error::Internal("refresh task dropped".to_string())),
                    })
                    .boxed()
                    .shared();
                reads.insert(key, shared.clone());

                let engine = self.clone();
                tokio::spawn(async move {
                    let result = engine.refresh_inner(key).await;
                    lock(&engine.inner.reads).remove(&key);
                    let _ = tx.send(result);
                });

                shared
            }
        };

        shared.await
    }

    async fn refresh_inner(&self, key: StateKey) -> crate::Result<()> {
        let fetch_timeout = self.inner.config.fetch_timeout;
        let retries = self.inner.config.fetch_retries;
        let backoff = self.inner.config.retry_backoff;
        let api = Arc::clone(&self.inner.api);

        let summary = client::retry_read("like refresh", retries, backoff, || {
            let api = Arc::clone(&api);
            async move {
                tokio::time::timeout(
                    fetch_timeout,
                    api.fetch_likes(key.subject_id, key.viewer_id),
                )
                .await
                .unwrap_or_else(|_| Err(Error::Transient("like fetch timed out".to_string())))
            }
        })
        .await?;

        // A write may have started while the fetch was in flight; the
        // optimistic state wins and this result is discarded.
        let state = {
            let writes = lock(&self.inner.writes);
            if writes.contains_key(&key.subject_id) {
                tracing::debug!(
                    subject_id = %key.subject_id,
                    "refresh discarded, mutation in flight"
                );
                return Ok(());
            }
            let (_, state) =
                self.inner
                    .store
                    .update_state(key, self.inner.config.initial_likes_count, |s| {
                        s.is_liked = summary.has_liked;
                        s.likes_count = summary.count.max(0);
                        s.phase = MutationPhase::Idle;
                        s.error = None;
                    });
            self.inner.store.mark_hydrated(key);
            state
        };

        self.persist_state(key, &state).await;
        Ok(())
    }
}
