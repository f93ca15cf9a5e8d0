//! Public endpoints
//!
//! - GET /feed.xml - RSS feed
//! - GET /posts, GET /posts/{post_type} - published posts
//! - GET /posts/{post_type}/{code} - one post with its neighbours
//! - GET /posts/{post_type}/category/{code}, GET /posts/{post_type}/tag/{name}
//! - GET|POST /posts/{post_type}/{code}/comments
//! - GET /pages/{code}
//!
//! Editors allowed to edit posts also see unpublished posts here, so the
//! host can preview them.

use axum::{
    extract::{OriginalUri, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{AppendHeaders, IntoResponse},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::common::{
    cookie_value, header_str, remember_cookie, ClientIp, PageResponse, PaginationQuery, COMMENT_EMAIL_COOKIE,
    COMMENT_NAME_COOKIE,
};
use crate::api::middleware::{ApiError, AppState};
use crate::models::{
    CmsUser, CommentSubmission, CommentView, CommentViewer, ListParams, Post, PostDetail, PostFilter, PublicPage,
};
use crate::services::{CommentOrigin, Permission, PostComments};

/// Link to a neighbouring post
#[derive(Debug, Serialize, Deserialize)]
pub struct PostLink {
    pub title: String,
    pub code: String,
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PostPageResponse {
    #[serde(flatten)]
    pub detail: PostDetail,
    pub html_title: String,
    pub html_description: String,
    pub url: Option<String>,
    pub next: Option<PostLink>,
    pub previous: Option<PostLink>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/feed.xml", get(feed))
        .route("/posts", get(all_posts))
        .route("/posts/{post_type}", get(posts_of_type))
        .route("/posts/{post_type}/{code}", get(view_post))
        .route("/posts/{post_type}/category/{code}", get(posts_in_category))
        .route("/posts/{post_type}/tag/{name}", get(posts_with_tag))
        .route("/posts/{post_type}/{code}/comments", get(list_comments).post(add_comment))
        .route("/pages/{code}", get(view_page))
}

async fn logged_in(state: &AppState, headers: &HeaderMap) -> Option<CmsUser> {
    state.cms.access.logged_in_user(headers).await
}

async fn can_preview(state: &AppState, headers: &HeaderMap) -> bool {
    let user = logged_in(state, headers).await;
    user.is_some() && state.allows(user.as_ref(), Permission::EditPost)
}

fn known_post_type(state: &AppState, post_type: &str) -> Result<(), ApiError> {
    if state.cms.settings.is_post_type(post_type) {
        Ok(())
    } else {
        Err(ApiError::not_found(format!("Unknown post type: {}", post_type)))
    }
}

async fn visible_post(state: &AppState, headers: &HeaderMap, post_type: &str, code: &str) -> Result<Post, ApiError> {
    known_post_type(state, post_type)?;
    let preview = can_preview(state, headers).await;
    state
        .cms
        .posts
        .get_post_by_code(post_type, code, preview)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Post not found: {}", code)))
}

async fn listing(
    state: &AppState,
    headers: &HeaderMap,
    filter: PostFilter,
    query: &PaginationQuery,
) -> Result<Json<PageResponse<PostDetail>>, ApiError> {
    let filter = PostFilter {
        allow_unpublished: can_preview(state, headers).await,
        ..filter
    };
    let params = ListParams::new(query.page, query.per_page);
    Ok(Json(state.cms.posts.list_post_details(&filter, &params).await?.into()))
}

async fn feed(State(state): State<AppState>, OriginalUri(uri): OriginalUri) -> Result<impl IntoResponse, ApiError> {
    let self_url = state.cms.settings.absolute_url(uri.path());
    let xml = state.cms.feed.generate_rss_xml(&self_url, None, None).await?;
    Ok(([(header::CONTENT_TYPE, "text/xml")], xml))
}

async fn all_posts(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<PageResponse<PostDetail>>, ApiError> {
    listing(&state, &headers, PostFilter::default(), &query).await
}

async fn posts_of_type(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(post_type): Path<String>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<PageResponse<PostDetail>>, ApiError> {
    known_post_type(&state, &post_type)?;
    listing(&state, &headers, PostFilter::published(post_type), &query).await
}

async fn posts_in_category(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((post_type, code)): Path<(String, String)>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<PageResponse<PostDetail>>, ApiError> {
    known_post_type(&state, &post_type)?;
    state
        .cms
        .categories
        .get_by_code(&post_type, &code)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Category not found: {}", code)))?;
    let filter = PostFilter {
        category_code: Some(code),
        ..PostFilter::published(post_type)
    };
    listing(&state, &headers, filter, &query).await
}

async fn posts_with_tag(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((post_type, name)): Path<(String, String)>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<PageResponse<PostDetail>>, ApiError> {
    known_post_type(&state, &post_type)?;
    state
        .cms
        .tags
        .get_by_name(&post_type, &name)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Tag not found: {}", name)))?;
    let filter = PostFilter {
        tag_name: Some(name),
        ..PostFilter::published(post_type)
    };
    listing(&state, &headers, filter, &query).await
}

fn link(state: &AppState, post: Post) -> PostLink {
    PostLink {
        url: state.cms.settings.post_url(&post.post_type, &post.code, post.id),
        title: post.title,
        code: post.code,
    }
}

async fn view_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((post_type, code)): Path<(String, String)>,
) -> Result<Json<PostPageResponse>, ApiError> {
    let post = visible_post(&state, &headers, &post_type, &code).await?;
    let preview = can_preview(&state, &headers).await;

    let next = state.cms.posts.next_post(&post, preview).await?;
    let previous = state.cms.posts.previous_post(&post, preview).await?;
    let url = state.cms.settings.post_url(&post.post_type, &post.code, post.id);
    let html_title = post.html_title_or_default();
    let html_description = post.html_description_or_default();
    let detail = state.cms.posts.detail(post).await?;

    Ok(Json(PostPageResponse {
        detail,
        html_title,
        html_description,
        url,
        next: next.map(|p| link(&state, p)),
        previous: previous.map(|p| link(&state, p)),
    }))
}

async fn list_comments(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((post_type, code)): Path<(String, String)>,
) -> Result<Json<PostComments>, ApiError> {
    let post = visible_post(&state, &headers, &post_type, &code).await?;
    let user = logged_in(&state, &headers).await;
    let viewer = if user.is_some() && state.allows(user.as_ref(), Permission::ModerateComments) {
        CommentViewer::moderator()
    } else {
        CommentViewer::visitor(cookie_value(&headers, COMMENT_EMAIL_COOKIE))
    };
    Ok(Json(state.cms.comments.list_for_post(post.id, &viewer).await?))
}

async fn add_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    ClientIp(ip): ClientIp,
    Path((post_type, code)): Path<(String, String)>,
    Json(submission): Json<CommentSubmission>,
) -> Result<impl IntoResponse, ApiError> {
    let post = visible_post(&state, &headers, &post_type, &code).await?;
    let user = logged_in(&state, &headers).await;
    let admin = user.filter(|u| state.allows(Some(u), Permission::PostCommentsAsAdmin));

    let mut cookies = Vec::new();
    if admin.is_none() {
        if let Some(name) = submission.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            cookies.push((header::SET_COOKIE, remember_cookie(COMMENT_NAME_COOKIE, name)));
        }
        if let Some(email) = submission.email.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
            cookies.push((header::SET_COOKIE, remember_cookie(COMMENT_EMAIL_COOKIE, email)));
        }
    }

    let origin = CommentOrigin {
        ip: ip.as_deref(),
        user_agent: header_str(&headers, header::USER_AGENT.as_str()),
    };
    let comment = state.cms.comments.submit(&post, submission, origin, admin.as_ref()).await?;
    let author = match comment.author_id {
        Some(id) => Some(state.cms.authors.get(id).await?),
        None => None,
    };

    Ok((
        StatusCode::CREATED,
        AppendHeaders(cookies),
        Json(CommentView::new(&comment, author.as_ref())),
    ))
}

async fn view_page(State(state): State<AppState>, Path(code): Path<String>) -> Result<Json<PublicPage>, ApiError> {
    state
        .cms
        .pages
        .get_page_by_code(&code, false)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Page not found: {}", code)))
}
