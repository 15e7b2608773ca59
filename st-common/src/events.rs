//! Event types for the Sacral Track engagement event system
//!
//! Provides the shared event enum and the EventBus carrying interaction
//! changes to every observer (view bindings, SSE bridges).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::model::{CommentRecord, InteractionState};

/// Engagement event types
///
/// Events are broadcast via EventBus and can be serialized for SSE
/// transmission. Every write the reconciliation engine performs emits
/// exactly one event, so observers can mirror state without polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngageEvent {
    /// Reconciled like state changed for a (subject, viewer) pair
    ///
    /// Fires on optimistic writes, authoritative commits, and rollbacks
    /// alike; the embedded phase distinguishes them.
    LikeStateChanged {
        subject_id: Uuid,
        /// None for anonymous (count-only) state
        viewer_id: Option<Uuid>,
        state: InteractionState,
        timestamp: DateTime<Utc>,
    },

    /// A comment became visible (optimistic insert or confirmed create)
    CommentAdded {
        subject_id: Uuid,
        comment: CommentRecord,
        timestamp: DateTime<Utc>,
    },

    /// A comment was removed from the visible list
    CommentRemoved {
        subject_id: Uuid,
        comment_id: String,
        timestamp: DateTime<Utc>,
    },

    /// The full comment list for a subject was replaced by a server copy
    CommentsRefreshed {
        subject_id: Uuid,
        count: usize,
        timestamp: DateTime<Utc>,
    },
}

impl EngageEvent {
    /// Event type name for SSE event framing and test matching
    pub fn event_type(&self) -> &'static str {
        match self {
            EngageEvent::LikeStateChanged { .. } => "LikeStateChanged",
            EngageEvent::CommentAdded { .. } => "CommentAdded",
            EngageEvent::CommentRemoved { .. } => "CommentRemoved",
            EngageEvent::CommentsRefreshed { .. } => "CommentsRefreshed",
        }
    }

    /// Subject this event concerns
    pub fn subject_id(&self) -> Uuid {
        match self {
            EngageEvent::LikeStateChanged { subject_id, .. }
            | EngageEvent::CommentAdded { subject_id, .. }
            | EngageEvent::CommentRemoved { subject_id, .. }
            | EngageEvent::CommentsRefreshed { subject_id, .. } => *subject_id,
        }
    }
}

/// Broadcast bus for engagement events
///
/// Cheap to clone; all clones share the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngageEvent>,
}

impl EventBus {
    /// Create a new bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event, ignoring the no-subscribers case
    pub fn publish(&self, event: EngageEvent) {
        let _ = self.tx.send(event);
    }

    /// Subscribe to the event stream
    pub fn subscribe(&self) -> broadcast::Receiver<EngageEvent> {
        self.tx.subscribe()
    }

    /// Current number of subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
