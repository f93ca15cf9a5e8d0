//! Editor page endpoints
//!
//! - GET /pages - list pages (30 per page)
//! - GET /pages/{id} - view a page
//! - PUT /pages/{id} - save content
//! - GET /pages/{id}/history/latest, GET /pages/{id}/history/{rev}
//! - POST /pages/{id}/history/{rev}/restore
//! - POST /pages/{id}/publish
//! - GET /pages/{id}/published/history
//! - POST /pages/{id}/published/history/{rev}/restore

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;

use crate::api::common::{PageResponse, PaginationQuery};
use crate::api::middleware::{logged_in, ApiError, AppState, EditorUser};
use crate::models::{History, Page, PageRevision, PublishedPage, PublishedPageRevision, SavePageInput};
use crate::services::Permission;

#[derive(Debug, Default, Deserialize)]
pub struct PublishInput {
    #[serde(default)]
    pub revision_notes: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_pages))
        .route("/{id}", get(get_page).put(save_page))
        .route("/{id}/history/latest", get(latest_revision))
        .route("/{id}/history/{rev}", get(revision))
        .route("/{id}/history/{rev}/restore", post(restore_revision))
        .route("/{id}/publish", post(publish_page))
        .route("/{id}/published/history", get(published_history))
        .route("/{id}/published/history/{rev}/restore", post(restore_published))
}

async fn list_pages(
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<PageResponse<Page>>, ApiError> {
    let pages = state.cms.pages.list(query.page).await?;
    Ok(Json(pages.into()))
}

async fn get_page(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<Page>, ApiError> {
    Ok(Json(state.cms.pages.get(id).await?))
}

async fn save_page(
    State(state): State<AppState>,
    Extension(EditorUser(user)): Extension<EditorUser>,
    Path(id): Path<i64>,
    Json(input): Json<SavePageInput>,
) -> Result<Json<Page>, ApiError> {
    state.require(user.as_ref(), Permission::EditPage)?;
    Ok(Json(state.cms.pages.save_content(id, input, &logged_in(user)?).await?))
}

async fn latest_revision(
    State(state): State<AppState>,
    Extension(EditorUser(user)): Extension<EditorUser>,
    Path(id): Path<i64>,
) -> Result<Json<History<PageRevision>>, ApiError> {
    state.require(user.as_ref(), Permission::EditPage)?;
    Ok(Json(state.cms.pages.history(id, None).await?))
}

async fn revision(
    State(state): State<AppState>,
    Extension(EditorUser(user)): Extension<EditorUser>,
    Path((id, rev)): Path<(i64, i64)>,
) -> Result<Json<History<PageRevision>>, ApiError> {
    state.require(user.as_ref(), Permission::EditPage)?;
    Ok(Json(state.cms.pages.history(id, Some(rev)).await?))
}

async fn restore_revision(
    State(state): State<AppState>,
    Extension(EditorUser(user)): Extension<EditorUser>,
    Path((id, rev)): Path<(i64, i64)>,
) -> Result<Json<Page>, ApiError> {
    state.require(user.as_ref(), Permission::EditPage)?;
    Ok(Json(state.cms.pages.restore_revision(id, rev, &logged_in(user)?).await?))
}

async fn publish_page(
    State(state): State<AppState>,
    Extension(EditorUser(user)): Extension<EditorUser>,
    Path(id): Path<i64>,
    Json(input): Json<PublishInput>,
) -> Result<Json<PublishedPage>, ApiError> {
    state.require(user.as_ref(), Permission::PublishPage)?;
    let published = state
        .cms
        .pages
        .publish(id, &logged_in(user)?, input.revision_notes.as_deref())
        .await?;
    Ok(Json(published))
}

async fn published_history(
    State(state): State<AppState>,
    Extension(EditorUser(user)): Extension<EditorUser>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<PublishedPageRevision>>, ApiError> {
    state.require(user.as_ref(), Permission::EditPage)?;
    Ok(Json(state.cms.pages.published_history(id).await?))
}

async fn restore_published(
    State(state): State<AppState>,
    Extension(EditorUser(user)): Extension<EditorUser>,
    Path((id, rev)): Path<(i64, i64)>,
) -> Result<Json<PublishedPage>, ApiError> {
    state.require(user.as_ref(), Permission::PublishPage)?;
    Ok(Json(state.cms.pages.restore_published(id, rev, &logged_in(user)?).await?))
}
