//! Editor author endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Extension, Json, Router,
};

use crate::api::middleware::{ApiError, AppState, EditorUser};
use crate::models::{Author, AuthorInput};
use crate::services::Permission;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_authors).post(create_author))
        .route("/{id}", put(rename_author).delete(delete_author))
}

async fn list_authors(State(state): State<AppState>) -> Result<Json<Vec<Author>>, ApiError> {
    Ok(Json(state.cms.authors.list().await?))
}

async fn create_author(
    State(state): State<AppState>,
    Extension(EditorUser(user)): Extension<EditorUser>,
    Json(input): Json<AuthorInput>,
) -> Result<(StatusCode, Json<Author>), ApiError> {
    state.require(user.as_ref(), Permission::ManageAuthors)?;
    let author = state.cms.authors.create(input).await?;
    Ok((StatusCode::CREATED, Json(author)))
}

async fn rename_author(
    State(state): State<AppState>,
    Extension(EditorUser(user)): Extension<EditorUser>,
    Path(id): Path<i64>,
    Json(input): Json<AuthorInput>,
) -> Result<Json<Author>, ApiError> {
    state.require(user.as_ref(), Permission::ManageAuthors)?;
    Ok(Json(state.cms.authors.rename(id, input).await?))
}

async fn delete_author(
    State(state): State<AppState>,
    Extension(EditorUser(user)): Extension<EditorUser>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.require(user.as_ref(), Permission::ManageAuthors)?;
    state.cms.authors.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
