//! # Sacral Track Common Library
//!
//! Shared code for Sacral Track services including:
//! - Interaction data model (like state, comment records)
//! - Event types (EngageEvent enum) and the event bus
//! - Configuration loading
//! - Common error type
//! - Timestamp utilities

pub mod config;
pub mod error;
pub mod events;
pub mod model;
pub mod time;

pub use error::{Error, Result};
pub use events::{EngageEvent, EventBus};
pub use model::{CommentRecord, ErrorKind, InteractionState, MutationPhase};
