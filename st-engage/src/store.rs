//! In-memory interaction state cache
//!
//! Process-wide store shared by every view of a subject: two bindings
//! observing the same (subject, viewer) pair read the same values without
//! separate network calls. The reconciliation engine is the only writer;
//! every write publishes an event on the bus.
//!
//! Locks guard plain maps and are never held across await points.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use uuid::Uuid;

use st_common::events::{EngageEvent, EventBus};
use st_common::model::{CommentRecord, InteractionState};

/// Cache key: one reconciled state per (subject, viewer) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateKey {
    pub subject_id: Uuid,
    /// None for anonymous (count-only) state
    pub viewer_id: Option<Uuid>,
}

impl StateKey {
    pub fn new(subject_id: Uuid, viewer_id: Option<Uuid>) -> Self {
        Self {
            subject_id,
            viewer_id,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    state: InteractionState,
    /// Cold-start hydration done: the persistent cache was consulted, or a
    /// server value arrived first
    hydrated: bool,
    /// Active view bindings for this key
    observers: usize,
}

impl Entry {
    fn new(initial_likes: i64) -> Self {
        Self {
            state: InteractionState::new(initial_likes),
            hydrated: false,
            observers: 0,
        }
    }
}

/// Per-subject comment thread
#[derive(Debug, Clone, Default)]
struct Thread {
    comments: Vec<CommentRecord>,
    sync: ThreadSync,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum ThreadSync {
    /// Never fetched from the remote
    #[default]
    Cold,
    /// A fetch is in flight
    Syncing,
    /// At least one server copy has been applied
    Synced,
}

/// Shared state store
///
/// Constructed once per process and passed by reference to all consumers.
pub struct InteractionStore {
    entries: RwLock<HashMap<StateKey, Entry>>,
    threads: RwLock<HashMap<Uuid, Thread>>,
    bus: EventBus,
}

fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl InteractionStore {
    pub fn new(bus: EventBus) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            threads: RwLock::new(HashMap::new()),
            bus,
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Current state for a key, creating a default entry on first sight.
    /// Returns the state and whether the entry was just created (the caller
    /// schedules hydration for new entries).
    pub fn snapshot(&self, key: StateKey, initial_likes: i64) -> (InteractionState, bool) {
        let mut entries = write_lock(&self.entries);
        let created = !entries.contains_key(&key);
        let entry = entries.entry(key).or_insert_with(|| Entry::new(initial_likes));
        (entry.state.clone(), created)
    }

    /// Current state for a key without creating an entry
    pub fn peek(&self, key: StateKey) -> Option<InteractionState> {
        read_lock(&self.entries).get(&key).map(|e| e.state.clone())
    }

    /// Mutate the state for a key and publish the change.
    /// Creates a default entry first if the key is unknown.
    pub fn update_state<R>(
        &self,
        key: StateKey,
        initial_likes: i64,
        mutate: impl FnOnce(&mut InteractionState) -> R,
    ) -> (R, InteractionState) {
        let state = {
            let mut entries = write_lock(&self.entries);
            let entry = entries.entry(key).or_insert_with(|| Entry::new(initial_likes));
            let result = mutate(&mut entry.state);
            entry.state.likes_count = entry.state.likes_count.max(0);
            entry.state.touch();
            (result, entry.state.clone())
        };

        self.bus.publish(EngageEvent::LikeStateChanged {
            subject_id: key.subject_id,
            viewer_id: key.viewer_id,
            state: state.1.clone(),
            timestamp: st_common::time::now(),
        });
        state
    }

    /// Apply a value from the persistent cache, but only onto a pristine
    /// entry: a live write or server response always wins over a cached row.
    /// Returns true if the cached value was applied.
    pub fn apply_cached(&self, key: StateKey, is_liked: bool, likes_count: i64) -> bool {
        let applied = {
            let mut entries = write_lock(&self.entries);
            match entries.get_mut(&key) {
                Some(entry) if !entry.hydrated && !entry.state.is_updating() => {
                    entry.state.is_liked = is_liked;
                    entry.state.likes_count = likes_count.max(0);
                    entry.state.touch();
                    entry.hydrated = true;
                    Some(entry.state.clone())
                }
                Some(entry) => {
                    entry.hydrated = true;
                    None
                }
                None => None,
            }
        };

        if let Some(state) = applied {
            self.bus.publish(EngageEvent::LikeStateChanged {
                subject_id: key.subject_id,
                viewer_id: key.viewer_id,
                state,
                timestamp: st_common::time::now(),
            });
            true
        } else {
            false
        }
    }

    /// Mark a key as hydrated (a server value has been applied)
    pub fn mark_hydrated(&self, key: StateKey) {
        if let Some(entry) = write_lock(&self.entries).get_mut(&key) {
            entry.hydrated = true;
        }
    }

    /// Register one active view binding for a key
    pub fn observe(&self, key: StateKey, initial_likes: i64) {
        let mut entries = write_lock(&self.entries);
        let entry = entries.entry(key).or_insert_with(|| Entry::new(initial_likes));
        entry.observers += 1;
    }

    /// Release one view binding for a key
    pub fn release(&self, key: StateKey) {
        if let Some(entry) = write_lock(&self.entries).get_mut(&key) {
            entry.observers = entry.observers.saturating_sub(1);
        }
    }

    /// Keys with at least one active view binding
    pub fn observed_keys(&self) -> Vec<StateKey> {
        read_lock(&self.entries)
            .iter()
            .filter(|(_, entry)| entry.observers > 0)
            .map(|(key, _)| *key)
            .collect()
    }

    /// Likes count for a subject from any cached viewer entry, for the
    /// denormalized counter patch
    pub fn any_likes_count(&self, subject_id: Uuid) -> Option<i64> {
        read_lock(&self.entries)
            .iter()
            .find(|(key, _)| key.subject_id == subject_id)
            .map(|(_, entry)| entry.state.likes_count)
    }

    // ------------------------------------------------------------------
    // Comment threads
    // ------------------------------------------------------------------

    /// Visible comment list for a subject, optimistic entries included
    pub fn comments_snapshot(&self, subject_id: Uuid) -> Vec<CommentRecord> {
        read_lock(&self.threads)
            .get(&subject_id)
            .map(|t| t.comments.clone())
            .unwrap_or_default()
    }

    /// Whether the subject's thread has ever been synced from the remote
    pub fn comments_synced(&self, subject_id: Uuid) -> bool {
        read_lock(&self.threads)
            .get(&subject_id)
            .map(|t| t.sync == ThreadSync::Synced)
            .unwrap_or(false)
    }

    /// Claim the first fetch for a cold thread. Returns false when the
    /// thread is already synced or a fetch is in flight.
    pub fn begin_comment_sync(&self, subject_id: Uuid) -> bool {
        let mut threads = write_lock(&self.threads);
        let thread = threads.entry(subject_id).or_default();
        if thread.sync == ThreadSync::Cold {
            thread.sync = ThreadSync::Syncing;
            true
        } else {
            false
        }
    }

    /// Return a failed fetch's thread to the cold state so a later call
    /// can try again
    pub fn abort_comment_sync(&self, subject_id: Uuid) {
        let mut threads = write_lock(&self.threads);
        if let Some(thread) = threads.get_mut(&subject_id) {
            if thread.sync == ThreadSync::Syncing {
                thread.sync = ThreadSync::Cold;
            }
        }
    }

    /// Optimistically insert a comment at the head of the visible list
    pub fn insert_comment_head(&self, subject_id: Uuid, comment: CommentRecord) {
        {
            let mut threads = write_lock(&self.threads);
            let thread = threads.entry(subject_id).or_default();
            thread.comments.insert(0, comment.clone());
        }
        self.bus.publish(EngageEvent::CommentAdded {
            subject_id,
            comment,
            timestamp: st_common::time::now(),
        });
    }

    /// Replace an optimistic record with the server copy, in place.
    /// If the optimistic record is gone the server copy goes to the head.
    pub fn confirm_comment(&self, subject_id: Uuid, temp_id: &str, saved: CommentRecord) {
        let mut threads = write_lock(&self.threads);
        let thread = threads.entry(subject_id).or_default();
        match thread.comments.iter_mut().find(|c| c.id == temp_id) {
            Some(slot) => *slot = saved,
            None => thread.comments.insert(0, saved),
        }
    }

    /// Remove a comment from the visible list
    pub fn remove_comment(&self, subject_id: Uuid, comment_id: &str) -> Option<CommentRecord> {
        let removed = {
            let mut threads = write_lock(&self.threads);
            let thread = threads.get_mut(&subject_id)?;
            let index = thread.comments.iter().position(|c| c.id == comment_id)?;
            Some(thread.comments.remove(index))
        };

        if removed.is_some() {
            self.bus.publish(EngageEvent::CommentRemoved {
                subject_id,
                comment_id: comment_id.to_string(),
                timestamp: st_common::time::now(),
            });
        }
        removed
    }

    /// One comment by id, for ownership checks
    pub fn comment(&self, subject_id: Uuid, comment_id: &str) -> Option<CommentRecord> {
        read_lock(&self.threads)
            .get(&subject_id)?
            .comments
            .iter()
            .find(|c| c.id == comment_id)
            .cloned()
    }

    /// Replace the thread with a server copy, keeping still-unconfirmed
    /// optimistic entries at the head
    pub fn set_comments(&self, subject_id: Uuid, server_copy: Vec<CommentRecord>) {
        let count = {
            let mut threads = write_lock(&self.threads);
            let thread = threads.entry(subject_id).or_default();
            let mut merged: Vec<CommentRecord> = thread
                .comments
                .iter()
                .filter(|c| c.is_optimistic && !server_copy.iter().any(|s| s.id == c.id))
                .cloned()
                .collect();
            merged.extend(server_copy);
            thread.comments = merged;
            thread.sync = ThreadSync::Synced;
            thread.comments.len()
        };

        self.bus.publish(EngageEvent::CommentsRefreshed {
            subject_id,
            count,
            timestamp: st_common::time::now(),
        });
    }

    /// Number of server-confirmed comments for a subject
    pub fn confirmed_comment_count(&self, subject_id: Uuid) -> usize {
        read_lock(&self.threads)
            .get(&subject_id)
            .map(|t| t.comments.iter().filter(|c| !c.is_optimistic).count())
            .unwrap_or(0)
    }
}
