//! Post service
//!
//! Business rules for posts:
//! - public listings and lookups that hide drafts and scheduled posts
//! - creating and editing with validation, title casing and a revision per save
//! - SEO fields, publish dates, history and restore
//! - snippets, including the default snippet image taken from the content
//!
//! Every write drops the cached RSS document.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::cache::{keys, CacheLayer, MemoryCache};
use crate::config::CmsSettings;
use crate::db::repositories::{Adjacent, AuthorRepository, CategoryRepository, PostRepository, TagRepository};
use crate::models::{
    restore_notes, CmsUser, History, ListParams, PagedResult, Post, PostDetail, PostFilter, PostRevision,
    PostSeoInput, SavePostInput, SnippetInput,
};
use crate::services::snippet::{SnippetImageError, SnippetStore};
use crate::services::text::{is_valid_code, make_code, titlecase};

#[derive(Debug, thiserror::Error)]
pub enum PostServiceError {
    #[error("Post not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Snippets Disabled")]
    SnippetsDisabled,

    #[error("This post has no history")]
    NoHistory,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<SnippetImageError> for PostServiceError {
    fn from(err: SnippetImageError) -> Self {
        match err {
            SnippetImageError::InternalError(e) => PostServiceError::InternalError(e),
            other => PostServiceError::ValidationError(other.to_string()),
        }
    }
}

pub struct PostService {
    posts: Arc<dyn PostRepository>,
    categories: Arc<dyn CategoryRepository>,
    authors: Arc<dyn AuthorRepository>,
    tags: Arc<dyn TagRepository>,
    cache: Arc<MemoryCache>,
    settings: Arc<CmsSettings>,
    snippets: Arc<SnippetStore>,
}

impl PostService {
    pub fn new(
        posts: Arc<dyn PostRepository>,
        categories: Arc<dyn CategoryRepository>,
        authors: Arc<dyn AuthorRepository>,
        tags: Arc<dyn TagRepository>,
        cache: Arc<MemoryCache>,
        settings: Arc<CmsSettings>,
        snippets: Arc<SnippetStore>,
    ) -> Self {
        Self {
            posts,
            categories,
            authors,
            tags,
            cache,
            settings,
            snippets,
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub async fn list_posts(&self, filter: &PostFilter, params: &ListParams) -> Result<PagedResult<Post>, PostServiceError> {
        let now = Utc::now();
        let items = self.posts.list(filter, params, now).await?;
        let total = self.posts.count(filter, now).await?;
        Ok(PagedResult::new(items, total, params))
    }

    /// Like [`list_posts`](Self::list_posts) with category, author and tags attached
    pub async fn list_post_details(
        &self,
        filter: &PostFilter,
        params: &ListParams,
    ) -> Result<PagedResult<PostDetail>, PostServiceError> {
        let page = self.list_posts(filter, params).await?;
        let mut details = Vec::with_capacity(page.items.len());
        for post in &page.items {
            details.push(self.detail(post.clone()).await?);
        }
        Ok(PagedResult {
            items: details,
            total: page.total,
            page: page.page,
            per_page: page.per_page,
        })
    }

    pub async fn get(&self, id: i64) -> Result<Post, PostServiceError> {
        self.posts
            .get_by_id(id)
            .await?
            .ok_or_else(|| PostServiceError::NotFound(id.to_string()))
    }

    /// A post by code; without `allow_unpublished` only posts published
    /// before now are found
    pub async fn get_post_by_code(
        &self,
        post_type: &str,
        code: &str,
        allow_unpublished: bool,
    ) -> Result<Option<Post>, PostServiceError> {
        Ok(self
            .posts
            .get_by_code(post_type, code, allow_unpublished, Utc::now())
            .await?)
    }

    pub async fn detail(&self, post: Post) -> Result<PostDetail, PostServiceError> {
        let category = self
            .categories
            .get_by_id(post.category_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Category {} of post {} is missing", post.category_id, post.id))?;
        let author = self
            .authors
            .get_by_id(post.author_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Author {} of post {} is missing", post.author_id, post.id))?;
        let tags = self.tags.list_for_post(post.id).await?;
        Ok(PostDetail::new(post, category, author, tags, Utc::now()))
    }

    pub async fn next_post(&self, post: &Post, allow_unpublished: bool) -> Result<Option<Post>, PostServiceError> {
        Ok(self
            .posts
            .adjacent(post, Adjacent::Next, allow_unpublished, Utc::now())
            .await?)
    }

    pub async fn previous_post(&self, post: &Post, allow_unpublished: bool) -> Result<Option<Post>, PostServiceError> {
        Ok(self
            .posts
            .adjacent(post, Adjacent::Previous, allow_unpublished, Utc::now())
            .await?)
    }

    /// Snippet image to show for a post
    pub fn snippet_image(&self, post: &Post) -> Result<String, PostServiceError> {
        post.snippet_image_or_default(self.settings.snippet_missing_image_url.as_deref())
            .ok_or_else(|| PostServiceError::ValidationError("snippet image unavailable".to_string()))
    }

    // ------------------------------------------------------------------
    // Editing
    // ------------------------------------------------------------------

    pub async fn create(
        &self,
        post_type: &str,
        input: SavePostInput,
        user: &CmsUser,
        can_publish: bool,
    ) -> Result<Post, PostServiceError> {
        if !self.settings.is_post_type(post_type) {
            return Err(PostServiceError::NotFound(format!("post type {}", post_type)));
        }
        let now = Utc::now();
        let draft = Post {
            id: 0,
            post_type: post_type.to_string(),
            created: now,
            published: None,
            category_id: input.category_id,
            title: String::new(),
            code: String::new(),
            tagline: String::new(),
            content: String::new(),
            author_id: user.author_id,
            html_title: None,
            html_description: None,
            snippet_title: None,
            snippet_description: None,
            snippet_image: None,
            main_image_url: None,
        };
        self.save(draft, input, user, can_publish).await
    }

    pub async fn update(
        &self,
        id: i64,
        input: SavePostInput,
        user: &CmsUser,
        can_publish: bool,
    ) -> Result<Post, PostServiceError> {
        let existing = self.get(id).await?;
        self.save(existing, input, user, can_publish).await
    }

    async fn save(
        &self,
        mut post: Post,
        input: SavePostInput,
        user: &CmsUser,
        can_publish: bool,
    ) -> Result<Post, PostServiceError> {
        let post_type = post.post_type.clone();
        if self.categories.count_for_post_type(&post_type).await? == 0 {
            return Err(PostServiceError::ValidationError(format!(
                "You must add at least one {t} category before creating a {t} post",
                t = post_type
            )));
        }

        let title = input.title.trim();
        if title.is_empty() {
            return Err(PostServiceError::ValidationError("Title is required".to_string()));
        }
        let tagline = input.tagline.trim();
        if tagline.is_empty() {
            return Err(PostServiceError::ValidationError("Tagline is required".to_string()));
        }
        if tagline.chars().count() > self.settings.tagline_max_length {
            return Err(PostServiceError::ValidationError(format!(
                "Tagline must be at most {} characters",
                self.settings.tagline_max_length
            )));
        }

        let main_image_url = input.main_image_url.as_deref().map(str::trim).filter(|u| !u.is_empty());
        if self.settings.post_main_image_enabled && self.settings.post_main_image_required && main_image_url.is_none() {
            return Err(PostServiceError::ValidationError("Main image is required".to_string()));
        }

        match self.categories.get_by_id(input.category_id).await? {
            Some(category) if category.post_type == post_type => {}
            _ => {
                return Err(PostServiceError::ValidationError(format!(
                    "Choose a {} category",
                    post_type
                )))
            }
        }

        let title = titlecase(title);
        let exclude = (post.id != 0).then_some(post.id);
        if self.posts.title_in_use(&post_type, &title, exclude).await? {
            return Err(PostServiceError::Conflict("A post with this title already exists".to_string()));
        }

        if post.id == 0 {
            post.code = make_code(&title, true);
            if post.code.is_empty() {
                return Err(PostServiceError::ValidationError(
                    "Title must contain letters or digits".to_string(),
                ));
            }
            if self.posts.code_in_use(&post_type, &post.code, None).await? {
                return Err(PostServiceError::Conflict("A post with this code already exists".to_string()));
            }
        }

        post.title = title;
        post.tagline = tagline.to_string();
        post.category_id = input.category_id;
        post.content = input.content.unwrap_or_default();
        if self.settings.post_main_image_enabled {
            post.main_image_url = main_image_url.map(str::to_string);
        }
        if can_publish {
            match (input.published, post.published) {
                (true, None) => post.published = Some(Utc::now()),
                (false, Some(_)) => post.published = None,
                _ => {}
            }
        }

        let notes = input.revision_notes.as_deref().map(str::trim).filter(|n| !n.is_empty());
        let mut saved = self.posts.save_with_revision(&post, user.id, notes).await?;
        tracing::info!("Saved {} post {} ({})", saved.post_type, saved.id, saved.code);

        if self.settings.snippets_enabled && saved.snippet_image.as_deref().map_or(true, str::is_empty) {
            saved = self.apply_default_snippet_image(saved).await?;
        }

        self.invalidate_feed().await;
        Ok(saved)
    }

    /// Import the first image of the post as its snippet image. Failing to
    /// fetch the image leaves the post as it is.
    async fn apply_default_snippet_image(&self, mut post: Post) -> Result<Post, PostServiceError> {
        let Some(first) = post.images().into_iter().next() else {
            return Ok(post);
        };
        match self.snippets.import_from_url(&first).await {
            Ok(url) => {
                post.snippet_image = Some(url);
                Ok(self.posts.update(&post).await?)
            }
            Err(e) => {
                tracing::warn!("Could not import default snippet image for post {}: {}", post.id, e);
                Ok(post)
            }
        }
    }

    pub async fn update_seo(&self, id: i64, input: PostSeoInput) -> Result<Post, PostServiceError> {
        let mut post = self.get(id).await?;

        let html_title = non_empty(input.html_title);
        if let Some(title) = &html_title {
            if title.chars().count() > self.settings.html_title_max_length {
                return Err(PostServiceError::ValidationError(format!(
                    "HTML title must be at most {} characters",
                    self.settings.html_title_max_length
                )));
            }
        }
        let html_description = non_empty(input.html_description);
        if let Some(description) = &html_description {
            if description.chars().count() > self.settings.html_description_max_length {
                return Err(PostServiceError::ValidationError(format!(
                    "HTML description must be at most {} characters",
                    self.settings.html_description_max_length
                )));
            }
        }

        if self.settings.post_code_is_editable {
            if let Some(code) = non_empty(input.code) {
                if !is_valid_code(&code) {
                    return Err(PostServiceError::ValidationError(
                        "Code may only contain lower-case letters, digits and hyphens".to_string(),
                    ));
                }
                if self.posts.code_in_use(&post.post_type, &code, Some(post.id)).await? {
                    return Err(PostServiceError::Conflict("A post with this code already exists".to_string()));
                }
                post.code = code;
            }
        }

        post.html_title = html_title;
        post.html_description = html_description;
        let saved = self.posts.update(&post).await?;
        self.invalidate_feed().await;
        Ok(saved)
    }

    pub async fn set_publish_date(&self, id: i64, published: DateTime<Utc>) -> Result<Post, PostServiceError> {
        let mut post = self.get(id).await?;
        post.published = Some(published);
        let saved = self.posts.update(&post).await?;
        tracing::info!("Post {} publish date set to {}", id, published);
        self.invalidate_feed().await;
        Ok(saved)
    }

    /// Revision `revision_id`, or the newest, plus every revision of the post
    pub async fn history(&self, id: i64, revision_id: Option<i64>) -> Result<History<PostRevision>, PostServiceError> {
        self.get(id).await?;
        let revisions = self.posts.list_revisions(id).await?;
        let current = match revision_id {
            Some(rev) => revisions
                .iter()
                .find(|r| r.id == rev)
                .cloned()
                .ok_or_else(|| PostServiceError::NotFound(format!("revision {}", rev)))?,
            None => revisions.first().cloned().ok_or(PostServiceError::NoHistory)?,
        };
        Ok(History { current, revisions })
    }

    /// Put a revision's title and content back, recording a new revision
    pub async fn restore_revision(&self, id: i64, revision_id: i64, user: &CmsUser) -> Result<Post, PostServiceError> {
        let mut post = self.get(id).await?;
        let revision = self
            .posts
            .get_revision(id, revision_id)
            .await?
            .ok_or_else(|| PostServiceError::NotFound(format!("revision {}", revision_id)))?;

        post.title = revision.title;
        post.content = revision.content;
        let notes = restore_notes(revision.id, revision.timestamp);
        let saved = self.posts.save_with_revision(&post, user.id, Some(&notes)).await?;
        tracing::info!("Post {} restored to revision {}", id, revision_id);
        self.invalidate_feed().await;
        Ok(saved)
    }

    pub async fn update_snippet(&self, id: i64, input: SnippetInput) -> Result<Post, PostServiceError> {
        if !self.settings.snippets_enabled {
            return Err(PostServiceError::SnippetsDisabled);
        }
        let mut post = self.get(id).await?;

        let title = input.snippet_title.trim();
        if title.is_empty() {
            return Err(PostServiceError::ValidationError("Snippet title is required".to_string()));
        }
        let description = non_empty(input.snippet_description);
        if let Some(d) = &description {
            if d.chars().count() > self.settings.snippet_description_max_length {
                return Err(PostServiceError::ValidationError(format!(
                    "Snippet description must be at most {} characters",
                    self.settings.snippet_description_max_length
                )));
            }
        }
        if let Some(url) = non_empty(input.image_url) {
            post.snippet_image = Some(self.snippets.import_from_url(&url).await?);
        }

        post.snippet_title = Some(title.to_string());
        post.snippet_description = description;
        Ok(self.posts.update(&post).await?)
    }

    pub async fn upload_snippet_image(
        &self,
        id: i64,
        file_name: Option<&str>,
        content_type: Option<&str>,
        bytes: &[u8],
    ) -> Result<Post, PostServiceError> {
        if !self.settings.snippets_enabled {
            return Err(PostServiceError::SnippetsDisabled);
        }
        let mut post = self.get(id).await?;
        post.snippet_image = Some(self.snippets.save_upload(file_name, content_type, bytes).await?);
        Ok(self.posts.update(&post).await?)
    }

    /// Delete a post with its tags, revisions and comments
    pub async fn delete(&self, id: i64) -> Result<(), PostServiceError> {
        let post = self.get(id).await?;
        self.posts.delete_with_dependents(id).await?;
        tracing::info!("Deleted {} post {} ({})", post.post_type, post.id, post.code);
        self.invalidate_feed().await;
        Ok(())
    }

    async fn invalidate_feed(&self) {
        if let Err(e) = self.cache.delete(keys::FEED).await {
            tracing::warn!("Failed to invalidate feed cache: {}", e);
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        SqlxAuthorRepository, SqlxCategoryRepository, SqlxPostRepository, SqlxTagRepository, SqlxUserRepository,
        UserRepository,
    };
    use crate::db::test_database;
    use crate::services::snippet::test_png;
    use chrono::Duration;
    use std::time::Duration as StdDuration;

    struct Fixture {
        service: PostService,
        cache: Arc<MemoryCache>,
        user: CmsUser,
        _tmp: tempfile::TempDir,
    }

    async fn fixture(configure: impl FnOnce(&mut CmsSettings)) -> Fixture {
        let (pool, tables) = test_database().await;
        let tmp = tempfile::tempdir().unwrap();
        let mut settings = CmsSettings {
            post_types: vec!["news".into(), "letter".into()],
            snippet_image_dir: tmp.path().join("snips"),
            // unreachable, so default snippet imports fail fast
            site_url: "http://127.0.0.1:9".into(),
            ..CmsSettings::default()
        };
        configure(&mut settings);

        let user = SqlxUserRepository::new(pool.clone(), tables.clone())
            .create_with_author("Ann Editor", "ann-editor")
            .await
            .unwrap();
        pool.execute("INSERT INTO cms_category (id, post_type, name, code) VALUES (1, 'news', 'Local', 'local')")
            .await
            .unwrap();
        pool.execute("INSERT INTO cms_category (id, post_type, name, code) VALUES (2, 'letter', 'Mail', 'mail')")
            .await
            .unwrap();

        let cache = Arc::new(MemoryCache::new());
        let snippets = Arc::new(SnippetStore::new(&settings).unwrap());
        let service = PostService::new(
            SqlxPostRepository::boxed(pool.clone(), tables.clone()),
            SqlxCategoryRepository::boxed(pool.clone(), tables.clone()),
            SqlxAuthorRepository::boxed(pool.clone(), tables.clone()),
            SqlxTagRepository::boxed(pool, tables),
            cache.clone(),
            Arc::new(settings),
            snippets,
        );
        Fixture {
            service,
            cache,
            user,
            _tmp: tmp,
        }
    }

    fn input(title: &str) -> SavePostInput {
        SavePostInput {
            title: title.into(),
            tagline: "A short tagline".into(),
            category_id: 1,
            content: Some("<p>Body text</p>".into()),
            main_image_url: None,
            published: false,
            revision_notes: None,
        }
    }

    #[tokio::test]
    async fn test_create_titlecases_and_codes() {
        let f = fixture(|_| {}).await;
        let post = f.service.create("news", input("the summer fete"), &f.user, true).await.unwrap();
        assert_eq!(post.title, "The Summer Fete");
        assert_eq!(post.code, "the-summer-fete");
        assert_eq!(post.author_id, f.user.author_id);
        assert!(post.published.is_none());

        let history = f.service.history(post.id, None).await.unwrap();
        assert_eq!(history.revisions.len(), 1);
        assert_eq!(history.current.title, "The Summer Fete");
    }

    #[tokio::test]
    async fn test_create_needs_category() {
        let f = fixture(|s| s.post_types.push("event".into())).await;
        match f.service.create("event", input("Anything"), &f.user, true).await {
            Err(PostServiceError::ValidationError(msg)) => assert_eq!(
                msg,
                "You must add at least one event category before creating a event post"
            ),
            other => panic!("unexpected {:?}", other.map(|p| p.id)),
        }
        assert!(matches!(
            f.service.create("recipe", input("Anything"), &f.user, true).await,
            Err(PostServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_validation_messages() {
        let f = fixture(|s| {
            s.tagline_max_length = 10;
            s.post_main_image_enabled = true;
            s.post_main_image_required = true;
        })
        .await;

        let mut bad = input("  ");
        bad.main_image_url = Some("/img/a.jpg".into());
        assert!(matches!(
            f.service.create("news", bad, &f.user, true).await,
            Err(PostServiceError::ValidationError(m)) if m == "Title is required"
        ));

        let mut long = input("Title");
        long.tagline = "far too long a tagline".into();
        long.main_image_url = Some("/img/a.jpg".into());
        assert!(matches!(
            f.service.create("news", long, &f.user, true).await,
            Err(PostServiceError::ValidationError(m)) if m == "Tagline must be at most 10 characters"
        ));

        let mut no_image = input("No Image");
        no_image.tagline = "Brief".into();
        assert!(matches!(
            f.service.create("news", no_image, &f.user, true).await,
            Err(PostServiceError::ValidationError(m)) if m == "Main image is required"
        ));

        let mut wrong_category = input("Wrong");
        wrong_category.category_id = 2;
        wrong_category.tagline = "short".into();
        wrong_category.main_image_url = Some("/img/a.jpg".into());
        assert!(matches!(
            f.service.create("news", wrong_category, &f.user, true).await,
            Err(PostServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_title_is_case_insensitive() {
        let f = fixture(|_| {}).await;
        let first = f.service.create("news", input("Village Hall"), &f.user, true).await.unwrap();
        match f.service.create("news", input("village hall"), &f.user, true).await {
            Err(PostServiceError::Conflict(msg)) => assert_eq!(msg, "A post with this title already exists"),
            other => panic!("unexpected {:?}", other.map(|p| p.id)),
        }
        // editing the same post keeps its title
        f.service.update(first.id, input("Village Hall"), &f.user, true).await.unwrap();
        // another post type may reuse it
        let mut letter = input("Village Hall");
        letter.category_id = 2;
        f.service.create("letter", letter, &f.user, true).await.unwrap();
    }

    #[tokio::test]
    async fn test_publish_flag_needs_permission() {
        let f = fixture(|_| {}).await;
        let mut publish = input("Now Live");
        publish.published = true;

        let unpublished = f.service.create("news", publish.clone(), &f.user, false).await.unwrap();
        assert!(unpublished.published.is_none());

        let live = f.service.update(unpublished.id, publish.clone(), &f.user, true).await.unwrap();
        let stamp = live.published.unwrap();
        let again = f.service.update(live.id, publish, &f.user, true).await.unwrap();
        assert_eq!(again.published, Some(stamp));

        let retracted = f.service.update(live.id, input("Now Live"), &f.user, true).await.unwrap();
        assert!(retracted.published.is_none());
    }

    #[tokio::test]
    async fn test_public_lookup_hides_unpublished() {
        let f = fixture(|_| {}).await;
        let post = f.service.create("news", input("Hidden"), &f.user, true).await.unwrap();
        assert!(f.service.get_post_by_code("news", &post.code, false).await.unwrap().is_none());
        assert!(f.service.get_post_by_code("news", &post.code, true).await.unwrap().is_some());

        f.service
            .set_publish_date(post.id, Utc::now() - Duration::minutes(1))
            .await
            .unwrap();
        assert!(f.service.get_post_by_code("news", &post.code, false).await.unwrap().is_some());

        let listed = f
            .service
            .list_post_details(&PostFilter::published("news"), &ListParams::default())
            .await
            .unwrap();
        assert_eq!(listed.total, 1);
        assert_eq!(listed.items[0].author.name, "Ann Editor");
        assert_eq!(listed.items[0].category.code, "local");
    }

    #[tokio::test]
    async fn test_restore_revision() {
        let f = fixture(|_| {}).await;
        let post = f.service.create("news", input("First Title"), &f.user, true).await.unwrap();
        let mut edit = input("Second Title");
        edit.content = Some("<p>changed</p>".into());
        f.service.update(post.id, edit, &f.user, true).await.unwrap();

        let history = f.service.history(post.id, None).await.unwrap();
        let original = history.revisions.last().unwrap().clone();
        let restored = f.service.restore_revision(post.id, original.id, &f.user).await.unwrap();
        assert_eq!(restored.title, "First Title");
        assert_eq!(restored.content, "<p>Body text</p>");

        let history = f.service.history(post.id, None).await.unwrap();
        assert_eq!(history.revisions.len(), 3);
        assert_eq!(
            history.current.revision_notes.as_deref(),
            Some(restore_notes(original.id, original.timestamp).as_str())
        );
        assert!(matches!(
            f.service.history(post.id, Some(9999)).await,
            Err(PostServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_seo_rules() {
        let f = fixture(|s| s.post_code_is_editable = true).await;
        let post = f.service.create("news", input("Seo Post"), &f.user, true).await.unwrap();
        f.service.create("news", input("Other Post"), &f.user, true).await.unwrap();

        let updated = f
            .service
            .update_seo(
                post.id,
                PostSeoInput {
                    html_title: Some("Better title".into()),
                    html_description: Some("  ".into()),
                    code: Some("seo-post-2024".into()),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.html_title.as_deref(), Some("Better title"));
        assert!(updated.html_description.is_none());
        assert_eq!(updated.code, "seo-post-2024");

        let clash = PostSeoInput {
            html_title: None,
            html_description: None,
            code: Some("other-post".into()),
        };
        assert!(matches!(f.service.update_seo(post.id, clash).await, Err(PostServiceError::Conflict(_))));

        let too_long = PostSeoInput {
            html_title: Some("x".repeat(56)),
            html_description: None,
            code: None,
        };
        assert!(matches!(
            f.service.update_seo(post.id, too_long).await,
            Err(PostServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_snippets() {
        let f = fixture(|_| {}).await;
        let post = f.service.create("news", input("Snip"), &f.user, true).await.unwrap();
        let updated = f
            .service
            .update_snippet(
                post.id,
                SnippetInput {
                    snippet_title: "Share me".into(),
                    snippet_description: Some("Short".into()),
                    image_url: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.snippet_title.as_deref(), Some("Share me"));

        let uploaded = f
            .service
            .upload_snippet_image(post.id, Some("card.png"), None, &test_png(40, 20))
            .await
            .unwrap();
        assert!(uploaded.snippet_image.unwrap().starts_with("/uploads/cms-snippet-images/sn-"));
        assert!(matches!(
            f.service.upload_snippet_image(post.id, Some("card.png"), None, b"png").await,
            Err(PostServiceError::ValidationError(m)) if m.starts_with("Not a readable image")
        ));

        let disabled = fixture(|s| s.snippets_enabled = false).await;
        let post = disabled.service.create("news", input("Plain"), &disabled.user, true).await.unwrap();
        assert!(matches!(
            disabled
                .service
                .update_snippet(
                    post.id,
                    SnippetInput {
                        snippet_title: "x".into(),
                        snippet_description: None,
                        image_url: None
                    }
                )
                .await,
            Err(PostServiceError::SnippetsDisabled)
        ));
    }

    #[tokio::test]
    async fn test_failed_default_snippet_import_is_not_fatal() {
        let f = fixture(|_| {}).await;
        let mut with_image = input("Pictured");
        with_image.content = Some("<p><img src=\"/img/missing.jpg\"></p><p>Text</p>".into());
        let post = f.service.create("news", with_image, &f.user, true).await.unwrap();
        assert!(post.snippet_image.is_none());
        assert!(matches!(f.service.snippet_image(&post), Err(PostServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_writes_drop_feed_cache_and_delete() {
        let f = fixture(|_| {}).await;
        f.cache
            .set(keys::FEED, &"<rss/>".to_string(), StdDuration::from_secs(60))
            .await
            .unwrap();
        let post = f.service.create("news", input("Cached"), &f.user, true).await.unwrap();
        assert!(f.cache.get::<String>(keys::FEED).await.unwrap().is_none());

        f.service.delete(post.id).await.unwrap();
        assert!(matches!(f.service.get(post.id).await, Err(PostServiceError::NotFound(_))));
    }
}
