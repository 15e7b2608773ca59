//! Comment creation, deletion, and thread refresh
//!
//! Comment rollback means deletion: there is no previous value to restore,
//! so a failed create removes the optimistic record and a failed delete
//! re-fetches the whole thread instead of reconstructing the removed item.

use std::sync::Arc;

use uuid::Uuid;

use st_common::model::CommentRecord;

use crate::client::{self, CountsPatch};
use crate::error::Error;

impl super::InteractionEngine {
    /// Visible comment list for a subject, optimistic entries included.
    ///
    /// Never blocks; the first call for a cold subject schedules a
    /// background fetch, so it must be called from within a Tokio runtime.
    pub fn comments(&self, subject_id: Uuid) -> Vec<CommentRecord> {
        if self.inner.store.begin_comment_sync(subject_id) {
            let engine = self.clone();
            tokio::spawn(async move {
                if let Err(err) = engine.refresh_comments(subject_id).await {
                    tracing::debug!(
                        subject_id = %subject_id,
                        error = %err,
                        "background comment fetch failed"
                    );
                }
            });
        }
        self.inner.store.comments_snapshot(subject_id)
    }

    /// Comment list for a subject, fetching from the remote first if the
    /// thread has never been synced. Fetch failures fall back to the local
    /// snapshot.
    pub async fn ensure_comments(&self, subject_id: Uuid) -> Vec<CommentRecord> {
        if !self.inner.store.comments_synced(subject_id) {
            self.inner.store.begin_comment_sync(subject_id);
            if let Err(err) = self.refresh_comments(subject_id).await {
                tracing::debug!(
                    subject_id = %subject_id,
                    error = %err,
                    "comment fetch failed, serving local snapshot"
                );
            }
        }
        self.inner.store.comments_snapshot(subject_id)
    }

    /// Fetch the authoritative comment list and replace the local thread.
    /// Optimistic entries that the server does not know yet survive at the
    /// head of the list.
    pub async fn refresh_comments(&self, subject_id: Uuid) -> crate::Result<Vec<CommentRecord>> {
        let fetch_timeout = self.inner.config.fetch_timeout;
        let retries = self.inner.config.fetch_retries;
        let backoff = self.inner.config.retry_backoff;
        let api = Arc::clone(&self.inner.api);

        let result = client::retry_read("comment list", retries, backoff, || {
            let api = Arc::clone(&api);
            async move {
                tokio::time::timeout(fetch_timeout, api.list_comments(subject_id))
                    .await
                    .unwrap_or_else(|_| {
                        Err(Error::Transient("comment fetch timed out".to_string()))
                    })
            }
        })
        .await;

        match result {
            Ok(list) => {
                self.inner.store.set_comments(subject_id, list);
                Ok(self.inner.store.comments_snapshot(subject_id))
            }
            Err(err) => {
                self.inner.store.abort_comment_sync(subject_id);
                Err(err)
            }
        }
    }

    /// Post a comment with an optimistic head insert.
    ///
    /// On success the optimistic record is replaced in place by the server
    /// copy. On failure it is removed from the visible list and the error
    /// is returned; there is nothing to restore.
    pub async fn add_comment(
        &self,
        subject_id: Uuid,
        viewer_id: Option<Uuid>,
        text: &str,
    ) -> crate::Result<CommentRecord> {
        let Some(viewer) = viewer_id else {
            return Err(Error::Unauthenticated);
        };

        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("comment text is empty".to_string()));
        }
        let max_len = self.inner.config.max_comment_len;
        if trimmed.chars().count() > max_len {
            return Err(Error::InvalidInput(format!(
                "comment text exceeds {} characters",
                max_len
            )));
        }

        let optimistic = CommentRecord {
            id: format!("tmp-{}", Uuid::new_v4()),
            viewer_id: viewer,
            subject_id,
            text: trimmed.to_string(),
            created_at: st_common::time::now(),
            is_optimistic: true,
        };
        self.inner
            .store
            .insert_comment_head(subject_id, optimistic.clone());

        let outcome = tokio::time::timeout(
            self.inner.config.mutate_timeout,
            self.inner.api.create_comment(subject_id, viewer, trimmed),
        )
        .await
        .unwrap_or_else(|_| Err(Error::Transient("comment create timed out".to_string())));

        match outcome {
            Ok(saved) => {
                self.inner
                    .store
                    .confirm_comment(subject_id, &optimistic.id, saved.clone());
                self.sync_comment_count(subject_id).await;
                Ok(saved)
            }
            Err(err) => {
                self.inner.store.remove_comment(subject_id, &optimistic.id);
                tracing::warn!(
                    subject_id = %subject_id,
                    error = %err,
                    "comment create failed, optimistic entry removed"
                );
                Err(err)
            }
        }
    }

    /// Delete an owned comment with an optimistic removal.
    ///
    /// Ownership is checked against the locally stored record as a UX
    /// optimization; the remote enforces it authoritatively. On failure the
    /// visible list is restored by a full refetch.
    pub async fn delete_comment(
        &self,
        subject_id: Uuid,
        viewer_id: Option<Uuid>,
        comment_id: &str,
    ) -> crate::Result<()> {
        let Some(viewer) = viewer_id else {
            return Err(Error::Unauthenticated);
        };

        let Some(existing) = self.inner.store.comment(subject_id, comment_id) else {
            // Nothing visible to delete; treat like a remote 404
            return Ok(());
        };
        if existing.viewer_id != viewer {
            return Err(Error::Permission(
                "comment belongs to another viewer".to_string(),
            ));
        }

        self.inner.store.remove_comment(subject_id, comment_id);

        let outcome = tokio::time::timeout(
            self.inner.config.mutate_timeout,
            self.inner.api.delete_comment(comment_id),
        )
        .await
        .unwrap_or_else(|_| Err(Error::Transient("comment delete timed out".to_string())));

        match outcome {
            Ok(()) => {
                self.sync_comment_count(subject_id).await;
                Ok(())
            }
            // Already deleted remotely: the optimistic removal stands
            Err(Error::NotFound(_)) => {
                self.sync_comment_count(subject_id).await;
                Ok(())
            }
            Err(err) => {
                tracing::warn!(
                    subject_id = %subject_id,
                    comment_id,
                    error = %err,
                    "comment delete failed, re-fetching thread"
                );
                if let Err(refetch_err) = self.refresh_comments(subject_id).await {
                    tracing::warn!(
                        subject_id = %subject_id,
                        error = %refetch_err,
                        "thread refetch after failed delete also failed"
                    );
                }
                Err(err)
            }
        }
    }

    /// Best-effort update of the subject's denormalized counters. One retry
    /// with a minimal payload shape, then the update is dropped: losing the
    /// counter is acceptable, losing the comment is not.
    pub(crate) async fn sync_comment_count(&self, subject_id: Uuid) {
        let comments_count = self.inner.store.confirmed_comment_count(subject_id) as i64;
        let patch_timeout = self.inner.config.fetch_timeout;

        let full = CountsPatch {
            likes_count: self.inner.store.any_likes_count(subject_id),
            comments_count: Some(comments_count),
        };
        let first = tokio::time::timeout(
            patch_timeout,
            self.inner.api.update_subject_counts(subject_id, full),
        )
        .await
        .unwrap_or_else(|_| Err(Error::Transient("counter update timed out".to_string())));

        let Err(first_err) = first else {
            return;
        };
        tracing::debug!(
            subject_id = %subject_id,
            error = %first_err,
            "subject counter update failed, retrying with minimal payload"
        );

        let minimal = CountsPatch {
            likes_count: None,
            comments_count: Some(comments_count),
        };
        let second = tokio::time::timeout(
            patch_timeout,
            self.inner.api.update_subject_counts(subject_id, minimal),
        )
        .await
        .unwrap_or_else(|_| Err(Error::Transient("counter update timed out".to_string())));

        if let Err(second_err) = second {
            tracing::warn!(
                subject_id = %subject_id,
                error = %second_err,
                "subject counter update dropped"
            );
        }
    }
}
