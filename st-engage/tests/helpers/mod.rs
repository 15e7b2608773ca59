//! Test helpers for engine and API tests
//!
//! Provides a scripted remote implementing `InteractionApi`. Each operation
//! pops one planned step (optional delay, optional forced result); with no
//! step planned the mock behaves as a healthy remote over simple in-memory
//! state.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

use st_common::model::CommentRecord;
use st_engage::client::{CountsPatch, InteractionApi, LikeSummary};
use st_engage::error::{Error, Result};
use st_engage::{EngineConfig, InteractionEngine};

/// One scripted step: wait `delay`, then either return the forced result or
/// fall through to the mock's default behavior.
pub struct Step<T> {
    pub delay: Duration,
    pub result: Option<Result<T>>,
}

impl<T> Step<T> {
    /// Default behavior, no delay
    pub fn ok() -> Self {
        Self {
            delay: Duration::ZERO,
            result: None,
        }
    }

    /// Forced response
    pub fn respond(value: T) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Some(Ok(value)),
        }
    }

    /// Forced failure
    pub fn fail(err: Error) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Some(Err(err)),
        }
    }

    /// Delay before resolving
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Default)]
pub struct MockApi {
    likes: Mutex<HashMap<(Uuid, Uuid), bool>>,
    counts: Mutex<HashMap<Uuid, i64>>,
    comments: Mutex<HashMap<Uuid, Vec<CommentRecord>>>,

    toggle_steps: Mutex<VecDeque<Step<LikeSummary>>>,
    fetch_steps: Mutex<VecDeque<Step<LikeSummary>>>,
    create_steps: Mutex<VecDeque<Step<CommentRecord>>>,
    delete_steps: Mutex<VecDeque<Step<()>>>,
    counts_steps: Mutex<VecDeque<Step<()>>>,

    pub toggle_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    pub counts_calls: AtomicUsize,
    next_comment_id: AtomicUsize,
}

fn grab<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Seed the remote's like count for a subject
    pub fn set_count(&self, subject_id: Uuid, count: i64) {
        grab(&self.counts).insert(subject_id, count);
    }

    /// Seed the remote's liked flag for a (subject, viewer) pair
    pub fn set_liked(&self, subject_id: Uuid, viewer_id: Uuid, liked: bool) {
        grab(&self.likes).insert((subject_id, viewer_id), liked);
    }

    /// Seed a server-side comment
    pub fn seed_comment(&self, comment: CommentRecord) {
        grab(&self.comments)
            .entry(comment.subject_id)
            .or_default()
            .insert(0, comment);
    }

    pub fn plan_toggle(&self, step: Step<LikeSummary>) {
        grab(&self.toggle_steps).push_back(step);
    }

    pub fn plan_fetch(&self, step: Step<LikeSummary>) {
        grab(&self.fetch_steps).push_back(step);
    }

    pub fn plan_create(&self, step: Step<CommentRecord>) {
        grab(&self.create_steps).push_back(step);
    }

    pub fn plan_delete(&self, step: Step<()>) {
        grab(&self.delete_steps).push_back(step);
    }

    pub fn plan_counts(&self, step: Step<()>) {
        grab(&self.counts_steps).push_back(step);
    }

    async fn run_step<T>(steps: &Mutex<VecDeque<Step<T>>>) -> Option<Result<T>> {
        let step = grab(steps).pop_front();
        match step {
            Some(step) => {
                if step.delay > Duration::ZERO {
                    tokio::time::sleep(step.delay).await;
                }
                step.result
            }
            None => None,
        }
    }
}

#[async_trait]
impl InteractionApi for MockApi {
    async fn toggle_like(&self, subject_id: Uuid, viewer_id: Uuid) -> Result<LikeSummary> {
        self.toggle_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(result) = Self::run_step(&self.toggle_steps).await {
            return result;
        }

        let liked = {
            let mut likes = grab(&self.likes);
            let entry = likes.entry((subject_id, viewer_id)).or_insert(false);
            *entry = !*entry;
            *entry
        };
        let count = {
            let mut counts = grab(&self.counts);
            let entry = counts.entry(subject_id).or_insert(0);
            *entry = (*entry + if liked { 1 } else { -1 }).max(0);
            *entry
        };
        Ok(LikeSummary {
            count,
            has_liked: liked,
        })
    }

    async fn fetch_likes(
        &self,
        subject_id: Uuid,
        viewer_id: Option<Uuid>,
    ) -> Result<LikeSummary> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(result) = Self::run_step(&self.fetch_steps).await {
            return result;
        }

        let count = grab(&self.counts).get(&subject_id).copied().unwrap_or(0);
        let has_liked = viewer_id
            .map(|viewer| {
                grab(&self.likes)
                    .get(&(subject_id, viewer))
                    .copied()
                    .unwrap_or(false)
            })
            .unwrap_or(false);
        Ok(LikeSummary { count, has_liked })
    }

    async fn list_comments(&self, subject_id: Uuid) -> Result<Vec<CommentRecord>> {
        Ok(grab(&self.comments)
            .get(&subject_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_comment(
        &self,
        subject_id: Uuid,
        viewer_id: Uuid,
        text: &str,
    ) -> Result<CommentRecord> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(result) = Self::run_step(&self.create_steps).await {
            return result;
        }

        let id = self.next_comment_id.fetch_add(1, Ordering::SeqCst);
        let saved = CommentRecord {
            id: format!("srv-{}", id),
            viewer_id,
            subject_id,
            text: text.to_string(),
            created_at: st_common::time::now(),
            is_optimistic: false,
        };
        grab(&self.comments)
            .entry(subject_id)
            .or_default()
            .insert(0, saved.clone());
        Ok(saved)
    }

    async fn delete_comment(&self, comment_id: &str) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(result) = Self::run_step(&self.delete_steps).await {
            return result;
        }

        let mut comments = grab(&self.comments);
        for list in comments.values_mut() {
            if let Some(index) = list.iter().position(|c| c.id == comment_id) {
                list.remove(index);
                return Ok(());
            }
        }
        Err(Error::NotFound(format!("comment {}", comment_id)))
    }

    async fn update_subject_counts(&self, _subject_id: Uuid, _patch: CountsPatch) -> Result<()> {
        self.counts_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(result) = Self::run_step(&self.counts_steps).await {
            return result;
        }
        Ok(())
    }
}

/// Engine config with fast timers for tests
pub fn test_config() -> EngineConfig {
    EngineConfig {
        fetch_retries: 0,
        retry_backoff: Duration::from_millis(5),
        resync_interval: Duration::from_millis(50),
        resync_debounce: Duration::from_millis(10),
        ..EngineConfig::default()
    }
}

/// Engine over a mock remote, no persistent cache
pub fn test_engine(api: Arc<MockApi>) -> InteractionEngine {
    InteractionEngine::new(api, None, test_config())
}

/// A server-side comment record for seeding
pub fn server_comment(subject_id: Uuid, viewer_id: Uuid, id: &str, text: &str) -> CommentRecord {
    CommentRecord {
        id: id.to_string(),
        viewer_id,
        subject_id,
        text: text.to_string(),
        created_at: st_common::time::now(),
        is_optimistic: false,
    }
}
