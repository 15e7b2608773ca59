//! HTTP request handlers
//!
//! Maps engine results onto HTTP statuses: `Unauthenticated` → 401,
//! `InvalidInput` → 400, `Permission` → 403, `NotFound` → 404,
//! `Transient` → 502, `Internal` → 500.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use st_common::model::{CommentRecord, ErrorKind, InteractionState, MutationPhase};

use crate::error::Error;

use super::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ViewerQuery {
    pub viewer_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct InteractionStateResponse {
    pub subject_id: Uuid,
    pub viewer_id: Option<Uuid>,
    pub is_liked: bool,
    pub likes_count: i64,
    pub is_updating: bool,
    pub phase: MutationPhase,
    pub error: Option<ErrorKind>,
    pub last_updated: DateTime<Utc>,
}

impl InteractionStateResponse {
    fn new(subject_id: Uuid, viewer_id: Option<Uuid>, state: InteractionState) -> Self {
        Self {
            subject_id,
            viewer_id,
            is_liked: state.is_liked,
            likes_count: state.likes_count,
            is_updating: state.is_updating(),
            phase: state.phase,
            error: state.error,
            last_updated: state.last_updated,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ToggleLikeRequest {
    pub subject_id: Uuid,
    pub viewer_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ToggleLikeResponse {
    /// False when the call was dropped, superseded, or rolled back
    pub accepted: bool,
    #[serde(flatten)]
    pub state: InteractionStateResponse,
}

#[derive(Debug, Deserialize)]
pub struct AddCommentRequest {
    pub subject_id: Uuid,
    pub viewer_id: Option<Uuid>,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteCommentQuery {
    pub subject_id: Uuid,
    pub viewer_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct CommentListResponse {
    pub subject_id: Uuid,
    pub comments: Vec<CommentRecord>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorKind,
    pub message: String,
}

/// Map an engine error onto an HTTP response
fn error_response(err: Error) -> (StatusCode, Json<ErrorBody>) {
    let status = match &err {
        Error::Unauthenticated => StatusCode::UNAUTHORIZED,
        Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        Error::Permission(_) => StatusCode::FORBIDDEN,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Transient(_) | Error::Cancelled => StatusCode::BAD_GATEWAY,
        Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let body = ErrorBody {
        error: err.kind(),
        message: err.to_string(),
    };
    (status, Json(body))
}

// ============================================================================
// Like Endpoints
// ============================================================================

/// GET /subjects/:subject_id/interactions - Reconciled like state
pub async fn get_interaction_state(
    State(state): State<AppState>,
    Path(subject_id): Path<Uuid>,
    Query(query): Query<ViewerQuery>,
) -> Json<InteractionStateResponse> {
    let current = state.engine.get_state(subject_id, query.viewer_id);
    Json(InteractionStateResponse::new(
        subject_id,
        query.viewer_id,
        current,
    ))
}

/// POST /likes/toggle - Optimistic like toggle
pub async fn toggle_like(
    State(state): State<AppState>,
    Json(body): Json<ToggleLikeRequest>,
) -> Result<Json<ToggleLikeResponse>, (StatusCode, Json<ErrorBody>)> {
    match state.engine.toggle_like(body.subject_id, body.viewer_id).await {
        Ok(accepted) => {
            let current = state.engine.get_state(body.subject_id, body.viewer_id);
            Ok(Json(ToggleLikeResponse {
                accepted,
                state: InteractionStateResponse::new(body.subject_id, body.viewer_id, current),
            }))
        }
        Err(err) => Err(error_response(err)),
    }
}

// ============================================================================
// Comment Endpoints
// ============================================================================

/// GET /subjects/:subject_id/comments - Visible comment list
pub async fn get_comments(
    State(state): State<AppState>,
    Path(subject_id): Path<Uuid>,
) -> Json<CommentListResponse> {
    let comments = state.engine.ensure_comments(subject_id).await;
    Json(CommentListResponse {
        subject_id,
        comments,
    })
}

/// POST /comments - Create a comment
pub async fn add_comment(
    State(state): State<AppState>,
    Json(body): Json<AddCommentRequest>,
) -> Result<(StatusCode, Json<CommentRecord>), (StatusCode, Json<ErrorBody>)> {
    match state
        .engine
        .add_comment(body.subject_id, body.viewer_id, &body.text)
        .await
    {
        Ok(comment) => Ok((StatusCode::CREATED, Json(comment))),
        Err(err) => Err(error_response(err)),
    }
}

/// DELETE /comments/:comment_id - Delete an owned comment
pub async fn delete_comment(
    State(state): State<AppState>,
    Path(comment_id): Path<String>,
    Query(query): Query<DeleteCommentQuery>,
) -> Result<StatusCode, (StatusCode, Json<ErrorBody>)> {
    match state
        .engine
        .delete_comment(query.subject_id, query.viewer_id, &comment_id)
        .await
    {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(err) => Err(error_response(err)),
    }
}
