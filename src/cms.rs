//! The CMS as one value
//!
//! [`Cms`] wires repositories, services, the cache and the host's access
//! control together. Building it brings the schema up to date, applies the
//! page definitions and creates the snippet image directory.
//!
//! ```ignore
//! let cms = Cms::builder(pool, settings)
//!     .with_access_control(Arc::new(my_access))
//!     .build()
//!     .await?;
//! let app = Router::new()
//!     .nest("/editor", cms.editor_router())
//!     .merge(cms.public_router());
//! ```

use anyhow::Context;
use std::sync::Arc;

use crate::api;
use crate::cache::MemoryCache;
use crate::config::CmsSettings;
use crate::db::repositories::{
    SqlxAuthorRepository, SqlxCategoryRepository, SqlxCommentRepository, SqlxPageRepository, SqlxPostRepository,
    SqlxTagRepository, SqlxUserRepository,
};
use crate::db::{migrations, DynDatabasePool, Tables};
use crate::services::{
    AccessControl, AuthorService, CategoryService, CmsHooks, CommentService, DefaultAccessControl, FeedService,
    NoHooks, PageService, PostService, SnippetStore, TagService, UserService,
};

pub struct Cms {
    pub settings: Arc<CmsSettings>,
    pub pool: DynDatabasePool,
    pub tables: Arc<Tables>,
    pub cache: Arc<MemoryCache>,
    pub access: Arc<dyn AccessControl>,
    pub snippets: Arc<SnippetStore>,
    pub posts: PostService,
    pub pages: PageService,
    pub categories: CategoryService,
    pub tags: TagService,
    pub comments: CommentService,
    pub authors: AuthorService,
    pub users: UserService,
    pub feed: FeedService,
}

pub struct CmsBuilder {
    pool: DynDatabasePool,
    settings: CmsSettings,
    cache: Option<Arc<MemoryCache>>,
    hooks: Arc<dyn CmsHooks>,
    access: Arc<dyn AccessControl>,
}

impl CmsBuilder {
    pub fn with_cache(mut self, cache: Arc<MemoryCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn CmsHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_access_control(mut self, access: Arc<dyn AccessControl>) -> Self {
        self.access = access;
        self
    }

    pub async fn build(self) -> anyhow::Result<Cms> {
        self.settings.validate()?;
        let settings = Arc::new(self.settings);
        let tables = Arc::new(Tables::new(&settings.table_prefix));
        let pool = self.pool;

        let version = migrations::ensure_schema(&pool, &tables)
            .await
            .context("Failed to bring the CMS schema up to date")?;
        tracing::info!("CMS schema at version {}", version);

        let cache = self.cache.unwrap_or_else(|| Arc::new(MemoryCache::new()));
        let snippets = Arc::new(SnippetStore::new(&settings)?);
        if settings.snippets_enabled {
            snippets.ensure_dir().await?;
        }

        let post_repo = SqlxPostRepository::boxed(pool.clone(), tables.clone());
        let category_repo = SqlxCategoryRepository::boxed(pool.clone(), tables.clone());
        let author_repo = SqlxAuthorRepository::boxed(pool.clone(), tables.clone());
        let tag_repo = SqlxTagRepository::boxed(pool.clone(), tables.clone());
        let comment_repo = SqlxCommentRepository::boxed(pool.clone(), tables.clone());
        let page_repo = SqlxPageRepository::boxed(pool.clone(), tables.clone());
        let user_repo = SqlxUserRepository::boxed(pool.clone(), tables.clone());

        let cms = Cms {
            posts: PostService::new(
                post_repo.clone(),
                category_repo.clone(),
                author_repo.clone(),
                tag_repo.clone(),
                cache.clone(),
                settings.clone(),
                snippets.clone(),
            ),
            pages: PageService::new(page_repo, cache.clone(), settings.clone(), self.hooks.clone()),
            categories: CategoryService::new(category_repo.clone(), settings.clone()),
            tags: TagService::new(tag_repo),
            comments: CommentService::new(
                comment_repo.clone(),
                post_repo.clone(),
                author_repo.clone(),
                settings.clone(),
                self.hooks,
            ),
            authors: AuthorService::new(author_repo.clone()),
            users: UserService::new(user_repo, author_repo.clone()),
            feed: FeedService::new(post_repo, category_repo, author_repo, comment_repo, cache.clone(), settings.clone()),
            settings,
            pool,
            tables,
            cache,
            access: self.access,
            snippets,
        };

        cms.pages
            .sync_page_defs(&cms.settings.page_defs)
            .await
            .context("Failed to apply page definitions")?;
        Ok(cms)
    }
}

impl Cms {
    /// Start building a CMS over `pool`. Without further configuration it
    /// caches in memory, fires no hooks and lets nobody into the editor.
    pub fn builder(pool: DynDatabasePool, settings: CmsSettings) -> CmsBuilder {
        CmsBuilder {
            pool,
            settings,
            cache: None,
            hooks: Arc::new(NoHooks),
            access: Arc::new(DefaultAccessControl),
        }
    }

    /// JSON editor API, to be nested by the host
    pub fn editor_router(self: &Arc<Self>) -> axum::Router {
        api::editor_router(api::AppState::new(self.clone()))
    }

    /// Published posts, pages, comments and the RSS feed
    pub fn public_router(self: &Arc<Self>) -> axum::Router {
        api::public_router(api::AppState::new(self.clone()))
    }
}
