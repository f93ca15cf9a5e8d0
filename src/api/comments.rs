//! Editor comment moderation
//!
//! Every endpoint needs the "moderate comments" permission.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;

use crate::api::common::{PageResponse, EDITOR_PER_PAGE};
use crate::api::middleware::{logged_in, ApiError, AppState, EditorUser};
use crate::models::{CmsUser, Comment, ListParams};
use crate::services::Permission;

fn default_page() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct ModerationQuery {
    /// Only comments waiting for approval
    #[serde(default)]
    pub pending: bool,
    #[serde(default = "default_page")]
    pub page: u32,
}

#[derive(Debug, Deserialize)]
pub struct EditCommentInput {
    pub content: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_comments))
        .route("/{id}", axum::routing::put(edit_comment).delete(delete_comment))
        .route("/{id}/approve", post(approve_comment))
        .route("/{id}/restore", post(restore_comment))
}

fn moderator(state: &AppState, user: Option<&CmsUser>) -> Result<(), ApiError> {
    state.require(user, Permission::ModerateComments)
}

async fn list_comments(
    State(state): State<AppState>,
    Extension(EditorUser(user)): Extension<EditorUser>,
    Query(query): Query<ModerationQuery>,
) -> Result<Json<PageResponse<Comment>>, ApiError> {
    moderator(&state, user.as_ref())?;
    let params = ListParams::new(query.page, EDITOR_PER_PAGE);
    Ok(Json(state.cms.comments.list(query.pending, &params).await?.into()))
}

async fn approve_comment(
    State(state): State<AppState>,
    Extension(EditorUser(user)): Extension<EditorUser>,
    Path(id): Path<i64>,
) -> Result<Json<Comment>, ApiError> {
    moderator(&state, user.as_ref())?;
    Ok(Json(state.cms.comments.approve(id).await?))
}

async fn edit_comment(
    State(state): State<AppState>,
    Extension(EditorUser(user)): Extension<EditorUser>,
    Path(id): Path<i64>,
    Json(input): Json<EditCommentInput>,
) -> Result<Json<Comment>, ApiError> {
    moderator(&state, user.as_ref())?;
    Ok(Json(state.cms.comments.edit(id, &input.content, &logged_in(user)?).await?))
}

async fn delete_comment(
    State(state): State<AppState>,
    Extension(EditorUser(user)): Extension<EditorUser>,
    Path(id): Path<i64>,
) -> Result<Json<Comment>, ApiError> {
    moderator(&state, user.as_ref())?;
    Ok(Json(state.cms.comments.delete(id).await?))
}

async fn restore_comment(
    State(state): State<AppState>,
    Extension(EditorUser(user)): Extension<EditorUser>,
    Path(id): Path<i64>,
) -> Result<Json<Comment>, ApiError> {
    moderator(&state, user.as_ref())?;
    Ok(Json(state.cms.comments.undelete(id).await?))
}
