//! Editor landing summary

use axum::{extract::State, routing::get, Extension, Json, Router};
use futures::future::try_join_all;
use serde::Serialize;

use crate::api::middleware::{ApiError, AppState, EditorUser};
use crate::models::ListParams;
use crate::services::{CategoryServiceError, Permission};

#[derive(Debug, Serialize)]
pub struct PostTypeSummary {
    pub name: String,
    pub has_categories: bool,
}

#[derive(Debug, Serialize)]
pub struct EditorSummary {
    pub website_name: String,
    pub user_name: Option<String>,
    pub post_types: Vec<PostTypeSummary>,
    pub page_count: i64,
    pub pending_comments: i64,
    pub publishing_enabled: bool,
    pub comments_enabled: bool,
    pub snippets_enabled: bool,
    pub permissions: Vec<Permission>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(summary))
}

async fn summary(
    State(state): State<AppState>,
    Extension(EditorUser(user)): Extension<EditorUser>,
) -> Result<Json<EditorSummary>, ApiError> {
    let cms = &state.cms;
    let settings = &cms.settings;

    let post_types = try_join_all(settings.post_types.iter().map(|name| async move {
        let has_categories = cms.categories.has_categories(name).await?;
        Ok::<_, CategoryServiceError>(PostTypeSummary {
            name: name.clone(),
            has_categories,
        })
    }))
    .await?;

    let page_count = cms.pages.list(1).await?.total;
    let pending_comments = if state.allows(user.as_ref(), Permission::ModerateComments) {
        cms.comments.list(true, &ListParams::new(1, 1)).await?.total
    } else {
        0
    };

    let permissions = Permission::ALL
        .into_iter()
        .filter(|p| state.allows(user.as_ref(), *p))
        .collect();

    Ok(Json(EditorSummary {
        website_name: settings.website_name.clone(),
        user_name: user.as_ref().map(|u| u.name.clone()),
        post_types,
        page_count,
        pending_comments,
        publishing_enabled: settings.page_publishing_enabled,
        comments_enabled: settings.comments_enabled,
        snippets_enabled: settings.snippets_enabled,
        permissions,
    }))
}
