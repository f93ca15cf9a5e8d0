//! API middleware and shared state
//!
//! Contains:
//! - [`AppState`], the handle every handler receives
//! - [`ApiError`], the JSON error body and its status mapping
//! - the editor guard, which resolves the logged-in user through the host's
//!   access control and checks the "view editor" permission

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::cms::Cms;
use crate::models::CmsUser;
use crate::services::{
    AccessContext, AuthorServiceError, CategoryServiceError, CommentServiceError, FeedError, PageServiceError,
    Permission, PostServiceError, SnippetImageError, TagServiceError, UserServiceError,
};

pub const FORBIDDEN_MESSAGE: &str = "You don't have permission to view this page";

/// Application state shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub cms: Arc<Cms>,
}

impl AppState {
    pub fn new(cms: Arc<Cms>) -> Self {
        Self { cms }
    }

    pub fn allows(&self, user: Option<&CmsUser>, permission: Permission) -> bool {
        let ctx = AccessContext { user: user.cloned() };
        self.cms.access.allows(&ctx, permission)
    }

    /// Fail with 403 unless the caller holds `permission`
    pub fn require(&self, user: Option<&CmsUser>, permission: Permission) -> Result<(), ApiError> {
        if self.allows(user, permission) {
            Ok(())
        } else {
            tracing::debug!(
                "{} denied {:?}",
                user.map_or("Anonymous caller", |u| u.name.as_str()),
                permission
            );
            Err(ApiError::forbidden(FORBIDDEN_MESSAGE))
        }
    }
}

/// Caller of an editor route, inserted by [`require_editor`]. `None` when
/// the host lets anonymous callers into the editor.
#[derive(Debug, Clone)]
pub struct EditorUser(pub Option<CmsUser>);

/// The user a write is credited to; anonymous callers get 401
pub fn logged_in(user: Option<CmsUser>) -> Result<CmsUser, ApiError> {
    user.ok_or_else(|| ApiError::unauthorized("Authentication required"))
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("BAD_REQUEST", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new("RATE_LIMITED", message)
    }

    /// Logs the cause and answers with a generic message
    pub fn internal_error(err: impl std::fmt::Display) -> Self {
        tracing::error!("Internal error: {}", err);
        Self::new("INTERNAL_ERROR", "Internal server error")
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "BAD_REQUEST" | "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            "RATE_LIMITED" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<PostServiceError> for ApiError {
    fn from(err: PostServiceError) -> Self {
        match err {
            PostServiceError::NotFound(what) => ApiError::not_found(format!("Post not found: {}", what)),
            PostServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            PostServiceError::Conflict(msg) => ApiError::conflict(msg),
            e @ PostServiceError::SnippetsDisabled => ApiError::validation_error(e.to_string()),
            e @ PostServiceError::NoHistory => ApiError::not_found(e.to_string()),
            PostServiceError::InternalError(e) => ApiError::internal_error(e),
        }
    }
}

impl From<PageServiceError> for ApiError {
    fn from(err: PageServiceError) -> Self {
        match err {
            PageServiceError::NotFound(what) => ApiError::not_found(format!("Page not found: {}", what)),
            PageServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            e @ PageServiceError::NoHistory => ApiError::not_found(e.to_string()),
            e @ PageServiceError::PublishingDisabled => ApiError::validation_error(e.to_string()),
            PageServiceError::InternalError(e) => ApiError::internal_error(e),
        }
    }
}

impl From<CategoryServiceError> for ApiError {
    fn from(err: CategoryServiceError) -> Self {
        match err {
            CategoryServiceError::NotFound(what) => ApiError::not_found(format!("Category not found: {}", what)),
            CategoryServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            CategoryServiceError::Conflict(msg) => ApiError::conflict(msg),
            CategoryServiceError::InternalError(e) => ApiError::internal_error(e),
        }
    }
}

impl From<TagServiceError> for ApiError {
    fn from(err: TagServiceError) -> Self {
        match err {
            TagServiceError::NotFound(what) => ApiError::not_found(format!("Tag not found: {}", what)),
            TagServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            TagServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            TagServiceError::InternalError(e) => ApiError::internal_error(e),
        }
    }
}

impl From<CommentServiceError> for ApiError {
    fn from(err: CommentServiceError) -> Self {
        match err {
            e @ CommentServiceError::Disabled => ApiError::forbidden(e.to_string()),
            CommentServiceError::BadRequest(msg) => ApiError::bad_request(msg),
            CommentServiceError::NotFound(what) => ApiError::not_found(format!("Comment not found: {}", what)),
            CommentServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            e @ CommentServiceError::RateLimited => ApiError::rate_limited(e.to_string()),
            e @ CommentServiceError::Spam => ApiError::bad_request(e.to_string()),
            CommentServiceError::InternalError(e) => ApiError::internal_error(e),
        }
    }
}

impl From<AuthorServiceError> for ApiError {
    fn from(err: AuthorServiceError) -> Self {
        match err {
            AuthorServiceError::NotFound(what) => ApiError::not_found(format!("Author not found: {}", what)),
            AuthorServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            AuthorServiceError::Conflict(msg) => ApiError::conflict(msg),
            AuthorServiceError::InternalError(e) => ApiError::internal_error(e),
        }
    }
}

impl From<UserServiceError> for ApiError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::NotFound(what) => ApiError::not_found(format!("User not found: {}", what)),
            UserServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            UserServiceError::Conflict(msg) => ApiError::conflict(msg),
            UserServiceError::InternalError(e) => ApiError::internal_error(e),
        }
    }
}

impl From<SnippetImageError> for ApiError {
    fn from(err: SnippetImageError) -> Self {
        match err {
            SnippetImageError::InternalError(e) => ApiError::internal_error(e),
            other => ApiError::validation_error(other.to_string()),
        }
    }
}

impl From<FeedError> for ApiError {
    fn from(err: FeedError) -> Self {
        match err {
            e @ FeedError::NoPostUrl => {
                tracing::warn!("{}", e);
                ApiError::not_found("No RSS feed is configured")
            }
            FeedError::InternalError(e) => ApiError::internal_error(e),
        }
    }
}

/// Editor guard: only the "view editor" permission decides. A refused
/// anonymous caller gets 401, a refused user 403.
pub async fn require_editor(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = state.cms.access.logged_in_user(request.headers()).await;

    if user.is_none() && !state.allows(None, Permission::ViewEditor) {
        return Err(ApiError::unauthorized("Authentication required"));
    }
    state.require(user.as_ref(), Permission::ViewEditor)?;
    request.extensions_mut().insert(EditorUser(user));
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::unauthorized("x").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::forbidden("x").status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::bad_request("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::conflict("x").status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::rate_limited("x").status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ApiError::new("SOMETHING", "x").status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_service_messages_pass_through() {
        let err: ApiError = PostServiceError::ValidationError("Title is required".into()).into();
        assert_eq!(err.error.code, "VALIDATION_ERROR");
        assert_eq!(err.error.message, "Title is required");

        let err: ApiError = CommentServiceError::RateLimited.into();
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(err.error.message.starts_with("You can't comment"));

        let err: ApiError = PostServiceError::InternalError(anyhow::anyhow!("db down")).into();
        assert_eq!(err.error.message, "Internal server error");
    }
}
