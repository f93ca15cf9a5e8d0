//! Editor post endpoints
//!
//! Listing, editing, tags, SEO, publish date, history, snippets and
//! deletion. Every write checks its own permission on top of the editor
//! guard.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::common::{PageResponse, PaginationQuery, EDITOR_PER_PAGE};
use crate::api::middleware::{logged_in, ApiError, AppState, EditorUser};
use crate::models::{
    History, ListParams, Post, PostDetail, PostFilter, PostRevision, PostSeoInput, SavePostInput, SnippetInput, Tag,
};
use crate::services::{Permission, PostServiceError};

#[derive(Debug, Deserialize)]
pub struct AddTagsInput {
    /// Comma-separated tag names
    pub tags: String,
}

#[derive(Debug, Deserialize)]
pub struct PublishDateInput {
    pub published: DateTime<Utc>,
}

/// Snippet fields as the editor shows them
#[derive(Debug, Serialize, Deserialize)]
pub struct SnippetResponse {
    pub snippet_title: String,
    pub snippet_description: String,
    pub snippet_image: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_all_posts))
        .route("/type/{post_type}", get(list_posts_of_type).post(create_post))
        .route("/{id}", get(get_post).put(update_post).delete(delete_post))
        .route("/{id}/tags", post(add_tags))
        .route("/{id}/tags/{code}", delete(remove_tag))
        .route("/{id}/seo", put(update_seo))
        .route("/{id}/publish-date", put(set_publish_date))
        .route("/{id}/history/latest", get(latest_revision))
        .route("/{id}/history/{rev}", get(revision))
        .route("/{id}/history/{rev}/restore", post(restore_revision))
        .route("/{id}/snippet", get(get_snippet).put(update_snippet))
        .route("/{id}/snippet/image", post(upload_snippet_image))
}

async fn list(state: &AppState, post_type: Option<String>, page: u32) -> Result<PageResponse<PostDetail>, ApiError> {
    let filter = PostFilter {
        post_type,
        allow_unpublished: true,
        ..PostFilter::default()
    };
    let params = ListParams::new(page, EDITOR_PER_PAGE);
    Ok(state.cms.posts.list_post_details(&filter, &params).await?.into())
}

async fn list_all_posts(
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<PageResponse<PostDetail>>, ApiError> {
    Ok(Json(list(&state, None, query.page).await?))
}

async fn list_posts_of_type(
    State(state): State<AppState>,
    Path(post_type): Path<String>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<PageResponse<PostDetail>>, ApiError> {
    if !state.cms.settings.is_post_type(&post_type) {
        return Err(ApiError::not_found(format!("Unknown post type: {}", post_type)));
    }
    Ok(Json(list(&state, Some(post_type), query.page).await?))
}

async fn create_post(
    State(state): State<AppState>,
    Extension(EditorUser(user)): Extension<EditorUser>,
    Path(post_type): Path<String>,
    Json(input): Json<SavePostInput>,
) -> Result<(StatusCode, Json<Post>), ApiError> {
    state.require(user.as_ref(), Permission::EditPost)?;
    let can_publish = state.allows(user.as_ref(), Permission::PublishPost);
    let post = state.cms.posts.create(&post_type, input, &logged_in(user)?, can_publish).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

async fn get_post(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<PostDetail>, ApiError> {
    let post = state.cms.posts.get(id).await?;
    Ok(Json(state.cms.posts.detail(post).await?))
}

async fn update_post(
    State(state): State<AppState>,
    Extension(EditorUser(user)): Extension<EditorUser>,
    Path(id): Path<i64>,
    Json(input): Json<SavePostInput>,
) -> Result<Json<Post>, ApiError> {
    state.require(user.as_ref(), Permission::EditPost)?;
    let can_publish = state.allows(user.as_ref(), Permission::PublishPost);
    Ok(Json(state.cms.posts.update(id, input, &logged_in(user)?, can_publish).await?))
}

async fn delete_post(
    State(state): State<AppState>,
    Extension(EditorUser(user)): Extension<EditorUser>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.require(user.as_ref(), Permission::DeletePost)?;
    state.cms.posts.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_tags(
    State(state): State<AppState>,
    Extension(EditorUser(user)): Extension<EditorUser>,
    Path(id): Path<i64>,
    Json(input): Json<AddTagsInput>,
) -> Result<Json<Vec<Tag>>, ApiError> {
    state.require(user.as_ref(), Permission::TagPost)?;
    let post = state.cms.posts.get(id).await?;
    let can_create = state.allows(user.as_ref(), Permission::ManageTags);
    let tags = state.cms.tags.add_tags(&post, &input.tags, can_create).await?;
    Ok(Json(tags))
}

async fn remove_tag(
    State(state): State<AppState>,
    Extension(EditorUser(user)): Extension<EditorUser>,
    Path((id, code)): Path<(i64, String)>,
) -> Result<Json<Vec<Tag>>, ApiError> {
    state.require(user.as_ref(), Permission::TagPost)?;
    let post = state.cms.posts.get(id).await?;
    Ok(Json(state.cms.tags.remove_tag(&post, &code).await?))
}

async fn update_seo(
    State(state): State<AppState>,
    Extension(EditorUser(user)): Extension<EditorUser>,
    Path(id): Path<i64>,
    Json(input): Json<PostSeoInput>,
) -> Result<Json<Post>, ApiError> {
    state.require(user.as_ref(), Permission::EditPostSeo)?;
    Ok(Json(state.cms.posts.update_seo(id, input).await?))
}

async fn set_publish_date(
    State(state): State<AppState>,
    Extension(EditorUser(user)): Extension<EditorUser>,
    Path(id): Path<i64>,
    Json(input): Json<PublishDateInput>,
) -> Result<Json<Post>, ApiError> {
    state.require(user.as_ref(), Permission::PublishPost)?;
    Ok(Json(state.cms.posts.set_publish_date(id, input.published).await?))
}

async fn latest_revision(
    State(state): State<AppState>,
    Extension(EditorUser(user)): Extension<EditorUser>,
    Path(id): Path<i64>,
) -> Result<Json<History<PostRevision>>, ApiError> {
    state.require(user.as_ref(), Permission::EditPost)?;
    Ok(Json(state.cms.posts.history(id, None).await?))
}

async fn revision(
    State(state): State<AppState>,
    Extension(EditorUser(user)): Extension<EditorUser>,
    Path((id, rev)): Path<(i64, i64)>,
) -> Result<Json<History<PostRevision>>, ApiError> {
    state.require(user.as_ref(), Permission::EditPost)?;
    Ok(Json(state.cms.posts.history(id, Some(rev)).await?))
}

async fn restore_revision(
    State(state): State<AppState>,
    Extension(EditorUser(user)): Extension<EditorUser>,
    Path((id, rev)): Path<(i64, i64)>,
) -> Result<Json<Post>, ApiError> {
    state.require(user.as_ref(), Permission::EditPost)?;
    Ok(Json(state.cms.posts.restore_revision(id, rev, &logged_in(user)?).await?))
}

fn snippet_response(state: &AppState, post: &Post) -> SnippetResponse {
    SnippetResponse {
        snippet_title: post.snippet_title_or_default(),
        snippet_description: post.snippet_description_or_default(),
        snippet_image: state.cms.posts.snippet_image(post).ok(),
    }
}

async fn get_snippet(
    State(state): State<AppState>,
    Extension(EditorUser(user)): Extension<EditorUser>,
    Path(id): Path<i64>,
) -> Result<Json<SnippetResponse>, ApiError> {
    state.require(user.as_ref(), Permission::EditPost)?;
    if !state.cms.settings.snippets_enabled {
        return Err(PostServiceError::SnippetsDisabled.into());
    }
    let post = state.cms.posts.get(id).await?;
    Ok(Json(snippet_response(&state, &post)))
}

async fn update_snippet(
    State(state): State<AppState>,
    Extension(EditorUser(user)): Extension<EditorUser>,
    Path(id): Path<i64>,
    Json(input): Json<SnippetInput>,
) -> Result<Json<SnippetResponse>, ApiError> {
    state.require(user.as_ref(), Permission::EditPost)?;
    let post = state.cms.posts.update_snippet(id, input).await?;
    Ok(Json(snippet_response(&state, &post)))
}

/// Multipart upload; the image is the field named `file`
async fn upload_snippet_image(
    State(state): State<AppState>,
    Extension(EditorUser(user)): Extension<EditorUser>,
    Path(id): Path<i64>,
    mut multipart: Multipart,
) -> Result<Json<SnippetResponse>, ApiError> {
    state.require(user.as_ref(), Permission::EditPost)?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid upload: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Invalid upload: {}", e)))?;
        let post = state
            .cms
            .posts
            .upload_snippet_image(id, file_name.as_deref(), content_type.as_deref(), &bytes)
            .await?;
        return Ok(Json(snippet_response(&state, &post)));
    }

    Err(ApiError::validation_error("No file uploaded"))
}
