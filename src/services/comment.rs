//! Comment service
//!
//! Visitors submit comments through the public form; they wait for a
//! moderator unless posted by an editor with the admin comment permission.

use chrono::{Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::CmsSettings;
use crate::db::repositories::{AuthorRepository, CommentRepository, PostRepository};
use crate::models::{
    Author, CmsUser, Comment, CommentSubmission, CommentView, CommentViewer, ListParams, PagedResult, Post,
};
use crate::services::hooks::CmsHooks;
use crate::services::text::paragraphize;

pub const RECENTLY_COMMENTED: &str =
    "You can't comment as you have recently commented on this post.  Wait a while and try again.";
pub const COMMENT_FAILED: &str = "Comment failed";

#[derive(Debug, thiserror::Error)]
pub enum CommentServiceError {
    #[error("Comments are disabled")]
    Disabled,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Comment not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("You can't comment as you have recently commented on this post.  Wait a while and try again.")]
    RateLimited,

    #[error("Comment failed")]
    Spam,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Where a submission came from
#[derive(Debug, Clone, Copy, Default)]
pub struct CommentOrigin<'a> {
    pub ip: Option<&'a str>,
    pub user_agent: Option<&'a str>,
}

/// Comments of one post as a viewer sees them
#[derive(Debug, Clone, Serialize)]
pub struct PostComments {
    pub comments: Vec<CommentView>,
    pub visible_count: usize,
}

impl PostComments {
    pub fn has_visible(&self) -> bool {
        self.visible_count > 0
    }
}

pub struct CommentService {
    comments: Arc<dyn CommentRepository>,
    posts: Arc<dyn PostRepository>,
    authors: Arc<dyn AuthorRepository>,
    settings: Arc<CmsSettings>,
    hooks: Arc<dyn CmsHooks>,
}

impl CommentService {
    pub fn new(
        comments: Arc<dyn CommentRepository>,
        posts: Arc<dyn PostRepository>,
        authors: Arc<dyn AuthorRepository>,
        settings: Arc<CmsSettings>,
        hooks: Arc<dyn CmsHooks>,
    ) -> Self {
        Self {
            comments,
            posts,
            authors,
            settings,
            hooks,
        }
    }

    /// Store a comment on `post`. `admin` is the logged-in user when they may
    /// post comments as an admin; their comment is approved straight away.
    pub async fn submit(
        &self,
        post: &Post,
        submission: CommentSubmission,
        origin: CommentOrigin<'_>,
        admin: Option<&CmsUser>,
    ) -> Result<Comment, CommentServiceError> {
        if !self.settings.comments_enabled {
            return Err(CommentServiceError::Disabled);
        }

        let reply_to = match submission.reply_to.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
            Some(raw) => {
                let id: i64 = raw.parse().map_err(|_| {
                    tracing::warn!("Junk submitted as reply id: {}", raw);
                    CommentServiceError::BadRequest(format!("Invalid reply id: {}", raw))
                })?;
                let parent = self
                    .comments
                    .get_by_id(id)
                    .await?
                    .filter(|c| c.post_id == post.id)
                    .ok_or_else(|| CommentServiceError::NotFound(id.to_string()))?;
                Some(parent)
            }
            None => None,
        };

        if submission.content.trim().is_empty() {
            return Err(CommentServiceError::ValidationError("Comment is required".to_string()));
        }

        let now = Utc::now();
        let mut comment = Comment {
            id: 0,
            post_id: post.id,
            author_name: None,
            author_email: None,
            author_ip: origin.ip.map(str::to_string),
            author_user_agent: origin.user_agent.map(str::to_string),
            author_id: None,
            author_user_id: None,
            edited_by_id: None,
            edited_by_user_id: None,
            timestamp: now,
            approved: false,
            content: String::new(),
            original_content: None,
            edit_timestamp: None,
            deleted: false,
            reply_to_id: reply_to.as_ref().map(|c| c.id),
        };

        match admin {
            Some(user) => {
                comment.content = submission.content;
                comment.author_id = Some(user.author_id);
                comment.author_user_id = Some(user.id);
                comment.approved = true;
            }
            None => {
                let name = required(submission.name, "Name")?;
                let email = required(submission.email, "Email")?;
                if !email.contains('@') {
                    return Err(CommentServiceError::ValidationError("Enter a valid email address".to_string()));
                }

                if let Some(ip) = origin.ip {
                    let cut_off = now - Duration::seconds(self.settings.comment_rate_limit_secs);
                    if let Some(last) = self.comments.last_from_ip(post.id, ip).await? {
                        if last > cut_off {
                            return Err(CommentServiceError::RateLimited);
                        }
                    }
                }

                if submission.nickname.as_deref().is_some_and(|n| !n.trim().is_empty()) {
                    tracing::info!("Not posting comment due to spam check");
                    tracing::info!(
                        "ANTISPAM! User Agent: {} | ip: {} | name: {}",
                        origin.user_agent.unwrap_or("-"),
                        origin.ip.unwrap_or("-"),
                        name
                    );
                    return Err(CommentServiceError::Spam);
                }

                comment.content = paragraphize(&submission.content);
                comment.author_name = Some(name);
                comment.author_email = Some(email);
            }
        }

        let comment = self.comments.create(&comment).await?;
        tracing::info!("Comment {} added to post {}", comment.id, post.id);

        self.hooks.comment_added(&comment, post).await;
        if comment.approved {
            if let Some(parent) = &reply_to {
                self.hooks.comment_reply(&comment, parent, post).await;
            }
        }
        Ok(comment)
    }

    /// The comments of a post that `viewer` may see, oldest first
    pub async fn list_for_post(&self, post_id: i64, viewer: &CommentViewer) -> Result<PostComments, CommentServiceError> {
        let visible: Vec<Comment> = self
            .comments
            .list_for_post(post_id)
            .await?
            .into_iter()
            .filter(|c| c.is_visible_to(viewer))
            .collect();

        let mut authors: HashMap<i64, Option<Author>> = HashMap::new();
        let mut views = Vec::with_capacity(visible.len());
        for comment in &visible {
            let author = match comment.author_id {
                Some(id) => {
                    if !authors.contains_key(&id) {
                        authors.insert(id, self.authors.get_by_id(id).await?);
                    }
                    authors.get(&id).and_then(Option::as_ref)
                }
                None => None,
            };
            views.push(CommentView::new(comment, author));
        }

        Ok(PostComments {
            visible_count: views.len(),
            comments: views,
        })
    }

    /// Comments for moderation, newest first
    pub async fn list(&self, pending_only: bool, params: &ListParams) -> Result<PagedResult<Comment>, CommentServiceError> {
        let items = self.comments.list(pending_only, params).await?;
        let total = self.comments.count(pending_only).await?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn get(&self, id: i64) -> Result<Comment, CommentServiceError> {
        self.comments
            .get_by_id(id)
            .await?
            .ok_or_else(|| CommentServiceError::NotFound(id.to_string()))
    }

    pub async fn approve(&self, id: i64) -> Result<Comment, CommentServiceError> {
        let mut comment = self.get(id).await?;
        if comment.approved {
            return Ok(comment);
        }
        comment.approved = true;
        let comment = self.comments.update(&comment).await?;
        tracing::info!("Comment {} approved", id);

        if let Some(parent_id) = comment.reply_to_id {
            let parent = self.comments.get_by_id(parent_id).await?;
            let post = self.posts.get_by_id(comment.post_id).await?;
            if let (Some(parent), Some(post)) = (parent, post) {
                self.hooks.comment_reply(&comment, &parent, &post).await;
            }
        }
        Ok(comment)
    }

    /// Replace the content, keeping what the commenter first wrote
    pub async fn edit(&self, id: i64, content: &str, editor: &CmsUser) -> Result<Comment, CommentServiceError> {
        if content.trim().is_empty() {
            return Err(CommentServiceError::ValidationError("Comment is required".to_string()));
        }
        let mut comment = self.get(id).await?;
        if comment.original_content.is_none() {
            comment.original_content = Some(comment.content.clone());
        }
        comment.content = content.to_string();
        comment.edit_timestamp = Some(Utc::now());
        comment.edited_by_id = Some(editor.author_id);
        comment.edited_by_user_id = Some(editor.id);
        Ok(self.comments.update(&comment).await?)
    }

    pub async fn delete(&self, id: i64) -> Result<Comment, CommentServiceError> {
        self.set_deleted(id, true).await
    }

    pub async fn undelete(&self, id: i64) -> Result<Comment, CommentServiceError> {
        self.set_deleted(id, false).await
    }

    async fn set_deleted(&self, id: i64, deleted: bool) -> Result<Comment, CommentServiceError> {
        let mut comment = self.get(id).await?;
        comment.deleted = deleted;
        let comment = self.comments.update(&comment).await?;
        tracing::info!("Comment {} {}", id, if deleted { "deleted" } else { "restored" });
        Ok(comment)
    }
}

fn required(value: Option<String>, label: &str) -> Result<String, CommentServiceError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| CommentServiceError::ValidationError(format!("{} is required", label)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        SqlxAuthorRepository, SqlxCommentRepository, SqlxPostRepository, SqlxUserRepository, UserRepository,
    };
    use crate::db::test_database;
    use crate::services::hooks::recording::RecordingHooks;

    struct Fixture {
        service: CommentService,
        hooks: Arc<RecordingHooks>,
        post: Post,
        admin: CmsUser,
    }

    async fn fixture(configure: impl FnOnce(&mut CmsSettings)) -> Fixture {
        let (pool, tables) = test_database().await;
        let admin = SqlxUserRepository::new(pool.clone(), tables.clone())
            .create_with_author("Editor", "editor")
            .await
            .unwrap();
        for sql in [
            "INSERT INTO cms_category (id, post_type, name, code) VALUES (1, 'post', 'News', 'news')",
            "INSERT INTO cms_post (id, post_type, created, published, category_id, title, code, tagline, content, author_id) \
             VALUES (1, 'post', '2024-01-01T00:00:00+00:00', '2024-01-01T00:00:00+00:00', 1, 'Hello', 'hello', 'Hi', '', 1)",
        ] {
            pool.execute(sql).await.unwrap();
        }
        let posts = SqlxPostRepository::boxed(pool.clone(), tables.clone());
        let post = posts.get_by_id(1).await.unwrap().unwrap();

        let mut settings = CmsSettings {
            comments_enabled: true,
            ..CmsSettings::default()
        };
        configure(&mut settings);
        let hooks = Arc::new(RecordingHooks::default());
        let service = CommentService::new(
            SqlxCommentRepository::boxed(pool.clone(), tables.clone()),
            posts,
            SqlxAuthorRepository::boxed(pool, tables),
            Arc::new(settings),
            hooks.clone(),
        );
        Fixture {
            service,
            hooks,
            post,
            admin,
        }
    }

    fn submission(content: &str) -> CommentSubmission {
        CommentSubmission {
            name: Some("Bob".into()),
            email: Some("bob@example.com".into()),
            content: content.into(),
            reply_to: None,
            nickname: None,
        }
    }

    fn from(ip: &str) -> CommentOrigin<'_> {
        CommentOrigin {
            ip: Some(ip),
            user_agent: Some("test-agent"),
        }
    }

    #[tokio::test]
    async fn test_visitor_comment_is_escaped_and_pending() {
        let f = fixture(|_| {}).await;
        let comment = f
            .service
            .submit(&f.post, submission("<b>hi</b>\r\n\r\nthere"), from("10.0.0.1"), None)
            .await
            .unwrap();
        assert_eq!(comment.content, "<p>&lt;b&gt;hi&lt;/b&gt;</p><p>there</p>");
        assert!(!comment.approved);
        assert_eq!(comment.author_ip.as_deref(), Some("10.0.0.1"));
        assert_eq!(f.hooks.events(), vec![format!("added:{}", comment.id)]);
    }

    #[tokio::test]
    async fn test_rate_limit_per_ip() {
        let f = fixture(|_| {}).await;
        f.service
            .submit(&f.post, submission("first"), from("10.0.0.1"), None)
            .await
            .unwrap();
        match f.service.submit(&f.post, submission("again"), from("10.0.0.1"), None).await {
            Err(e @ CommentServiceError::RateLimited) => assert_eq!(e.to_string(), RECENTLY_COMMENTED),
            other => panic!("unexpected {:?}", other.map(|c| c.id)),
        }
        f.service
            .submit(&f.post, submission("other ip"), from("10.0.0.2"), None)
            .await
            .unwrap();

        let relaxed = fixture(|s| s.comment_rate_limit_secs = 0).await;
        relaxed.service.submit(&relaxed.post, submission("a"), from("10.0.0.1"), None).await.unwrap();
        relaxed.service.submit(&relaxed.post, submission("b"), from("10.0.0.1"), None).await.unwrap();
    }

    #[tokio::test]
    async fn test_honeypot_and_required_fields() {
        let f = fixture(|_| {}).await;
        let mut spam = submission("buy now");
        spam.nickname = Some("bot".into());
        match f.service.submit(&f.post, spam, from("10.0.0.9"), None).await {
            Err(e @ CommentServiceError::Spam) => assert_eq!(e.to_string(), COMMENT_FAILED),
            other => panic!("unexpected {:?}", other.map(|c| c.id)),
        }

        let mut nameless = submission("hi");
        nameless.name = None;
        assert!(matches!(
            f.service.submit(&f.post, nameless, from("10.0.0.3"), None).await,
            Err(CommentServiceError::ValidationError(_))
        ));
        assert!(f.hooks.events().is_empty());
    }

    #[tokio::test]
    async fn test_reply_to_must_parse_and_exist() {
        let f = fixture(|_| {}).await;
        let mut junk = submission("hi");
        junk.reply_to = Some("abc".into());
        assert!(matches!(
            f.service.submit(&f.post, junk, from("10.0.0.1"), None).await,
            Err(CommentServiceError::BadRequest(_))
        ));
        let mut missing = submission("hi");
        missing.reply_to = Some("42".into());
        assert!(matches!(
            f.service.submit(&f.post, missing, from("10.0.0.1"), None).await,
            Err(CommentServiceError::NotFound(_))
        ));

        // a reply must stay on the parent's post
        let parent = f
            .service
            .submit(&f.post, submission("parent"), from("10.0.0.1"), None)
            .await
            .unwrap();
        let other_post = Post { id: 2, ..f.post.clone() };
        let mut stray = submission("hi");
        stray.reply_to = Some(parent.id.to_string());
        assert!(matches!(
            f.service.submit(&other_post, stray, from("10.0.0.2"), Some(&f.admin)).await,
            Err(CommentServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_admin_reply_is_approved_and_fires_reply_hook() {
        let f = fixture(|_| {}).await;
        let parent = f
            .service
            .submit(&f.post, submission("question"), from("10.0.0.1"), None)
            .await
            .unwrap();

        let mut answer = submission("<p>answer</p>");
        answer.reply_to = Some(parent.id.to_string());
        let reply = f
            .service
            .submit(&f.post, answer, from("10.0.0.1"), Some(&f.admin))
            .await
            .unwrap();
        assert!(reply.approved);
        assert_eq!(reply.content, "<p>answer</p>");
        assert_eq!(reply.author_id, Some(f.admin.author_id));
        assert_eq!(reply.author_user_id, Some(f.admin.id));
        assert!(reply.author_name.is_none());

        assert_eq!(
            f.hooks.events(),
            vec![
                format!("added:{}", parent.id),
                format!("added:{}", reply.id),
                format!("reply:{}->{}", reply.id, parent.id),
            ]
        );
    }

    #[tokio::test]
    async fn test_disabled() {
        let f = fixture(|s| s.comments_enabled = false).await;
        assert!(matches!(
            f.service.submit(&f.post, submission("hi"), from("10.0.0.1"), None).await,
            Err(CommentServiceError::Disabled)
        ));
    }

    #[tokio::test]
    async fn test_visibility_in_listing() {
        let f = fixture(|_| {}).await;
        let pending = f
            .service
            .submit(&f.post, submission("mine"), from("10.0.0.1"), None)
            .await
            .unwrap();
        f.service
            .submit(&f.post, submission("admin"), CommentOrigin::default(), Some(&f.admin))
            .await
            .unwrap();

        let stranger = f.service.list_for_post(1, &CommentViewer::visitor(None)).await.unwrap();
        assert_eq!(stranger.visible_count, 1);
        assert_eq!(stranger.comments[0].author_name, "Editor");

        let bob = f
            .service
            .list_for_post(1, &CommentViewer::visitor(Some("bob@example.com".into())))
            .await
            .unwrap();
        assert_eq!(bob.visible_count, 2);
        assert_eq!(bob.comments[0].id, pending.id);

        let eve = f
            .service
            .list_for_post(1, &CommentViewer::visitor(Some("eve@example.com".into())))
            .await
            .unwrap();
        assert_eq!(eve.visible_count, 1);

        f.service.delete(pending.id).await.unwrap();
        let moderator = f.service.list_for_post(1, &CommentViewer::moderator()).await.unwrap();
        assert_eq!(moderator.visible_count, 2);
        assert!(moderator.has_visible());
    }

    #[tokio::test]
    async fn test_moderation() {
        let f = fixture(|_| {}).await;
        let parent = f
            .service
            .submit(&f.post, submission("parent"), from("10.0.0.1"), None)
            .await
            .unwrap();
        let mut child = submission("child");
        child.reply_to = Some(parent.id.to_string());
        let child = f.service.submit(&f.post, child, from("10.0.0.2"), None).await.unwrap();

        let pending = f.service.list(true, &ListParams::default()).await.unwrap();
        assert_eq!(pending.total, 2);

        let approved = f.service.approve(child.id).await.unwrap();
        assert!(approved.approved);
        assert!(f
            .hooks
            .events()
            .contains(&format!("reply:{}->{}", child.id, parent.id)));

        let edited = f.service.edit(child.id, "<p>tidied</p>", &f.admin).await.unwrap();
        let edited = f.service.edit(edited.id, "<p>tidied again</p>", &f.admin).await.unwrap();
        assert_eq!(edited.original_content.as_deref(), Some("<p>child</p>"));
        assert_eq!(edited.content, "<p>tidied again</p>");
        assert_eq!(edited.edited_by_id, Some(f.admin.author_id));
        assert!(edited.edit_timestamp.is_some());

        assert!(f.service.delete(child.id).await.unwrap().deleted);
        assert!(!f.service.undelete(child.id).await.unwrap().deleted);
        assert_eq!(f.service.list(true, &ListParams::default()).await.unwrap().total, 1);
        assert!(matches!(f.service.approve(999).await, Err(CommentServiceError::NotFound(_))));
    }
}
