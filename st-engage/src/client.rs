//! Remote interaction service client
//!
//! HTTP/JSON client for the like/comment backend. The engine talks to the
//! remote through the [`InteractionApi`] trait so tests can substitute a
//! scripted implementation.
//!
//! Per-operation timeouts are applied by the engine (15 s for writes, 10 s
//! per read attempt), so the underlying `reqwest` client carries none.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use uuid::Uuid;

use st_common::model::CommentRecord;

use crate::error::{Error, Result};

const USER_AGENT: &str = "SacralTrack/0.1.0 (st-engage)";

/// Aggregate like state as reported by the remote
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeSummary {
    pub count: i64,
    /// Omitted by the remote when no viewer id was supplied
    #[serde(default)]
    pub has_liked: bool,
}

/// Denormalized counter patch for a subject document
///
/// Fields left `None` are not sent; the retry path uses a minimal shape.
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub likes_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments_count: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToggleLikeRequest {
    viewer_id: Uuid,
    subject_id: Uuid,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateCommentRequest<'a> {
    viewer_id: Uuid,
    subject_id: Uuid,
    text: &'a str,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentResponse {
    id: String,
    viewer_id: Uuid,
    subject_id: Uuid,
    text: String,
    timestamp: DateTime<Utc>,
}

impl From<CommentResponse> for CommentRecord {
    fn from(response: CommentResponse) -> Self {
        CommentRecord {
            id: response.id,
            viewer_id: response.viewer_id,
            subject_id: response.subject_id,
            text: response.text,
            created_at: response.timestamp,
            is_optimistic: false,
        }
    }
}

/// Remote operations used by the reconciliation engine
#[async_trait]
pub trait InteractionApi: Send + Sync {
    /// POST /likes/toggle — toggles per call; callers must single-flight
    async fn toggle_like(&self, subject_id: Uuid, viewer_id: Uuid) -> Result<LikeSummary>;

    /// GET /likes — authoritative count and per-viewer liked flag
    async fn fetch_likes(&self, subject_id: Uuid, viewer_id: Option<Uuid>)
        -> Result<LikeSummary>;

    /// GET /comments — full comment list for a subject, newest first
    async fn list_comments(&self, subject_id: Uuid) -> Result<Vec<CommentRecord>>;

    /// POST /comments
    async fn create_comment(
        &self,
        subject_id: Uuid,
        viewer_id: Uuid,
        text: &str,
    ) -> Result<CommentRecord>;

    /// DELETE /comments/{id} — a remote 404 maps to `Error::NotFound`
    async fn delete_comment(&self, comment_id: &str) -> Result<()>;

    /// PATCH /subjects/{id} — best-effort denormalized counter update
    async fn update_subject_counts(&self, subject_id: Uuid, patch: CountsPatch) -> Result<()>;
}

/// HTTP implementation of [`InteractionApi`]
pub struct HttpInteractionApi {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpInteractionApi {
    pub fn new(base_url: &str) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::Internal(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Map a non-2xx response into the engine error taxonomy
    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status().as_u16();
        if (200..300).contains(&status) {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(map_status(status, &body))
    }
}

#[async_trait]
impl InteractionApi for HttpInteractionApi {
    async fn toggle_like(&self, subject_id: Uuid, viewer_id: Uuid) -> Result<LikeSummary> {
        let body = ToggleLikeRequest {
            viewer_id,
            subject_id,
            timestamp: st_common::time::now(),
        };

        let response = self
            .http_client
            .post(self.url("/likes/toggle"))
            .json(&body)
            .send()
            .await
            .map_err(map_transport)?;

        Self::check(response)
            .await?
            .json::<LikeSummary>()
            .await
            .map_err(|e| Error::Internal(format!("toggle response parse: {}", e)))
    }

    async fn fetch_likes(
        &self,
        subject_id: Uuid,
        viewer_id: Option<Uuid>,
    ) -> Result<LikeSummary> {
        let mut request = self
            .http_client
            .get(self.url("/likes"))
            .query(&[("subjectId", subject_id.to_string())]);
        if let Some(viewer) = viewer_id {
            request = request.query(&[("viewerId", viewer.to_string())]);
        }

        let response = request.send().await.map_err(map_transport)?;

        Self::check(response)
            .await?
            .json::<LikeSummary>()
            .await
            .map_err(|e| Error::Internal(format!("likes response parse: {}", e)))
    }

    async fn list_comments(&self, subject_id: Uuid) -> Result<Vec<CommentRecord>> {
        let response = self
            .http_client
            .get(self.url("/comments"))
            .query(&[("subjectId", subject_id.to_string())])
            .send()
            .await
            .map_err(map_transport)?;

        let comments = Self::check(response)
            .await?
            .json::<Vec<CommentResponse>>()
            .await
            .map_err(|e| Error::Internal(format!("comments response parse: {}", e)))?;

        Ok(comments.into_iter().map(CommentRecord::from).collect())
    }

    async fn create_comment(
        &self,
        subject_id: Uuid,
        viewer_id: Uuid,
        text: &str,
    ) -> Result<CommentRecord> {
        let body = CreateCommentRequest {
            viewer_id,
            subject_id,
            text,
            timestamp: st_common::time::now(),
        };

        let response = self
            .http_client
            .post(self.url("/comments"))
            .json(&body)
            .send()
            .await
            .map_err(map_transport)?;

        let saved = Self::check(response)
            .await?
            .json::<CommentResponse>()
            .await
            .map_err(|e| Error::Internal(format!("comment response parse: {}", e)))?;

        Ok(saved.into())
    }

    async fn delete_comment(&self, comment_id: &str) -> Result<()> {
        let response = self
            .http_client
            .delete(self.url(&format!("/comments/{}", comment_id)))
            .send()
            .await
            .map_err(map_transport)?;

        Self::check(response).await?;
        Ok(())
    }

    async fn update_subject_counts(&self, subject_id: Uuid, patch: CountsPatch) -> Result<()> {
        let response = self
            .http_client
            .patch(self.url(&format!("/subjects/{}", subject_id)))
            .json(&patch)
            .send()
            .await
            .map_err(map_transport)?;

        Self::check(response).await?;
        Ok(())
    }
}

/// Map an HTTP status into the engine error taxonomy
fn map_status(status: u16, body: &str) -> Error {
    match status {
        401 | 403 => Error::Permission(format!("HTTP {}: {}", status, body)),
        404 => Error::NotFound(format!("HTTP 404: {}", body)),
        408 | 429 | 500..=599 => Error::Transient(format!("HTTP {}: {}", status, body)),
        _ => Error::InvalidInput(format!("HTTP {}: {}", status, body)),
    }
}

/// Transport-level failures (connect, reset, abort) are all retryable reads
fn map_transport(err: reqwest::Error) -> Error {
    Error::Transient(err.to_string())
}

/// Retry an authoritative read with exponential backoff.
///
/// Only `Transient` failures are retried; everything else fails immediately.
/// Mutating requests never go through this path.
pub(crate) async fn retry_read<F, Fut, T>(
    operation_name: &str,
    retries: u32,
    base_backoff: Duration,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut backoff = base_backoff;
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        "read succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(err) if err.is_retryable() && attempt <= retries => {
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "retryable read failure, backing off"
                );
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }
            Err(err) => return Err(err),
        }
    }
}
