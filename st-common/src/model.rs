//! Interaction data model
//!
//! Shared types describing like state and comments for a subject (a track or
//! vibe post). The reconciliation engine in st-engage owns all mutation of
//! these values; other services and view bindings consume them read-only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a mutating request for one (subject, viewer) pair.
///
/// Single-flight and cancellation rules key off this phase rather than
/// ad hoc boolean flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationPhase {
    /// No mutation activity for this key
    Idle,
    /// An optimistic local value is visible; the request is being prepared
    Optimistic,
    /// The mutating request is in flight, awaiting the authoritative response
    Reconciling,
    /// The last mutation failed and the prior value was restored
    RolledBack,
}

impl MutationPhase {
    /// True while a mutating request may still commit for this key
    pub fn is_updating(&self) -> bool {
        matches!(self, MutationPhase::Optimistic | MutationPhase::Reconciling)
    }
}

impl std::fmt::Display for MutationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MutationPhase::Idle => write!(f, "idle"),
            MutationPhase::Optimistic => write!(f, "optimistic"),
            MutationPhase::Reconciling => write!(f, "reconciling"),
            MutationPhase::RolledBack => write!(f, "rolled_back"),
        }
    }
}

/// Machine-readable classification of the last failure, if any
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unauthenticated,
    InvalidInput,
    Transient,
    Cancelled,
    Permission,
    NotFound,
    Internal,
}

/// Reconciled like state for one (subject, viewer) pair
///
/// `likes_count` is never negative. `last_updated` advances on every write,
/// even when the wall clock steps backwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionState {
    pub is_liked: bool,
    pub likes_count: i64,
    pub phase: MutationPhase,
    pub error: Option<ErrorKind>,
    pub last_updated: DateTime<Utc>,
}

impl InteractionState {
    /// State for a subject never seen before, from a baseline count
    pub fn new(likes_count: i64) -> Self {
        Self {
            is_liked: false,
            likes_count: likes_count.max(0),
            phase: MutationPhase::Idle,
            error: None,
            last_updated: Utc::now(),
        }
    }

    /// True while a mutating request may still commit for this key
    pub fn is_updating(&self) -> bool {
        self.phase.is_updating()
    }

    /// Advance `last_updated`, keeping it strictly monotonic
    pub fn touch(&mut self) {
        let now = Utc::now();
        self.last_updated = if now > self.last_updated {
            now
        } else {
            self.last_updated + chrono::Duration::milliseconds(1)
        };
    }
}

impl Default for InteractionState {
    fn default() -> Self {
        Self::new(0)
    }
}

/// One comment on a subject
///
/// `is_optimistic` marks a record inserted locally but not yet confirmed by
/// the remote. It is client-side bookkeeping only; the wire request types in
/// st-engage never carry it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentRecord {
    /// Server-assigned id, or a client-generated temporary id while optimistic
    pub id: String,
    pub viewer_id: Uuid,
    pub subject_id: Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_optimistic: bool,
}
