//! Editor category and tag endpoints
//!
//! - GET /categories - every category, by name then post type
//! - POST /categories - create
//! - PUT /categories/{post_type}/{code} - rename
//! - DELETE /categories/{id}
//! - GET /tags?post_type= - tags, optionally of one post type

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, put},
    Extension, Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::{ApiError, AppState, EditorUser};
use crate::models::{Category, CreateCategoryInput, Tag, UpdateCategoryInput};
use crate::services::Permission;

#[derive(Debug, Deserialize)]
pub struct TagQuery {
    #[serde(default)]
    pub post_type: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/categories", get(list_categories).post(create_category))
        .route("/categories/{post_type}/{code}", put(update_category))
        .route("/categories/{id}", delete(delete_category))
        .route("/tags", get(list_tags))
}

async fn list_categories(State(state): State<AppState>) -> Result<Json<Vec<Category>>, ApiError> {
    Ok(Json(state.cms.categories.list().await?))
}

async fn create_category(
    State(state): State<AppState>,
    Extension(EditorUser(user)): Extension<EditorUser>,
    Json(input): Json<CreateCategoryInput>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    state.require(user.as_ref(), Permission::EditCategory)?;
    let category = state.cms.categories.create(input).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

async fn update_category(
    State(state): State<AppState>,
    Extension(EditorUser(user)): Extension<EditorUser>,
    Path((post_type, code)): Path<(String, String)>,
    Json(input): Json<UpdateCategoryInput>,
) -> Result<Json<Category>, ApiError> {
    state.require(user.as_ref(), Permission::EditCategory)?;
    Ok(Json(state.cms.categories.update(&post_type, &code, input).await?))
}

async fn delete_category(
    State(state): State<AppState>,
    Extension(EditorUser(user)): Extension<EditorUser>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.require(user.as_ref(), Permission::EditCategory)?;
    state.cms.categories.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_tags(State(state): State<AppState>, Query(query): Query<TagQuery>) -> Result<Json<Vec<Tag>>, ApiError> {
    Ok(Json(state.cms.tags.list(query.post_type.as_deref()).await?))
}
