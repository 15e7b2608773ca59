//! # Sacral Track Engagement Service (st-engage)
//!
//! Optimistic like/comment reconciliation against the remote interaction
//! service.
//!
//! **Purpose:** Keep one authoritative, race-free view of "did I like this,
//! and how many likes/comments does it have" per (subject, viewer) pair,
//! without blocking callers on network latency.
//!
//! **Architecture:** In-memory shared state store + SQLite fallback cache,
//! driven by a single-flight reconciliation engine over an HTTP client, with
//! an HTTP/SSE facade for view bindings.

pub mod api;
pub mod client;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod store;

pub use config::EngineConfig;
pub use engine::InteractionEngine;
pub use error::{Error, Result};
