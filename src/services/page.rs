//! Page service
//!
//! Pages come from the host's page definitions. Editors change their content,
//! and when page publishing is on, publish it to a separate live copy.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use crate::cache::{keys, CacheLayer, MemoryCache};
use crate::config::{CmsSettings, PageDef};
use crate::db::repositories::{PageContentUpdate, PageRepository};
use crate::models::{
    restore_notes, CmsUser, History, ListParams, Page, PageRevision, PagedResult, PublicPage, PublishedPage,
    PublishedPageRevision, SavePageInput,
};
use crate::services::hooks::CmsHooks;

/// Editor page listings show this many pages at a time
pub const PAGES_PER_PAGE: u32 = 30;

#[derive(Debug, thiserror::Error)]
pub enum PageServiceError {
    #[error("Page not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("This page has no history")]
    NoHistory,

    #[error("Page publishing is disabled")]
    PublishingDisabled,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// What the public lookup caches per code
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedPage {
    page: Option<PublicPage>,
    disabled: bool,
}

pub struct PageService {
    repo: Arc<dyn PageRepository>,
    cache: Arc<MemoryCache>,
    settings: Arc<CmsSettings>,
    hooks: Arc<dyn CmsHooks>,
}

impl PageService {
    pub fn new(
        repo: Arc<dyn PageRepository>,
        cache: Arc<MemoryCache>,
        settings: Arc<CmsSettings>,
        hooks: Arc<dyn CmsHooks>,
    ) -> Self {
        Self {
            repo,
            cache,
            settings,
            hooks,
        }
    }

    /// Make the stored pages match `defs`: defined pages are enabled with the
    /// defined title (created when missing), every other page is disabled.
    pub async fn sync_page_defs(&self, defs: &[PageDef]) -> Result<(), PageServiceError> {
        for def in defs {
            match self.repo.get_by_code(&def.code).await? {
                Some(page) => self.repo.update_definition(page.id, &def.title, false).await?,
                None => {
                    let page = self.repo.create(&def.code, &def.title).await?;
                    tracing::info!("Created page {}", page.code);
                }
            }
        }

        let defined: HashSet<&str> = defs.iter().map(|d| d.code.as_str()).collect();
        for page in self.repo.list_all().await? {
            if !defined.contains(page.code.as_str()) && !page.disabled {
                self.repo.update_definition(page.id, &page.title, true).await?;
                tracing::info!("Disabled page {} as it is no longer defined", page.code);
            }
        }

        self.invalidate_all().await;
        Ok(())
    }

    pub async fn list(&self, page: u32) -> Result<PagedResult<Page>, PageServiceError> {
        let params = ListParams::new(page, PAGES_PER_PAGE);
        let items = self.repo.list(&params).await?;
        let total = self.repo.count().await?;
        Ok(PagedResult::new(items, total, &params))
    }

    pub async fn get(&self, id: i64) -> Result<Page, PageServiceError> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| PageServiceError::NotFound(id.to_string()))
    }

    /// The public view of page `code`: its published copy when page
    /// publishing is enabled, else its current content. Disabled pages are
    /// only returned with `allow_disabled`.
    pub async fn get_page_by_code(&self, code: &str, allow_disabled: bool) -> Result<Option<PublicPage>, PageServiceError> {
        let key = keys::page(code);
        let cached = match self.cache.get::<CachedPage>(&key).await {
            Ok(Some(cached)) => cached,
            Ok(None) | Err(_) => {
                let cached = self.load_public(code).await?;
                if let Err(e) = self.cache.set(&key, &cached, self.cache.default_ttl()).await {
                    tracing::warn!("Failed to cache page {}: {}", code, e);
                }
                cached
            }
        };

        if cached.disabled && !allow_disabled {
            return Ok(None);
        }
        Ok(cached.page)
    }

    async fn load_public(&self, code: &str) -> Result<CachedPage, PageServiceError> {
        let Some(page) = self.repo.get_by_code(code).await? else {
            return Ok(CachedPage {
                page: None,
                disabled: false,
            });
        };

        let public = if self.settings.page_publishing_enabled {
            self.repo
                .get_published(page.id)
                .await?
                .map(|published| PublicPage::from_published(&page, &published))
        } else {
            Some(PublicPage::from_draft(&page))
        };
        Ok(CachedPage {
            page: public,
            disabled: page.disabled,
        })
    }

    /// Save new content for a page, always writing a revision
    pub async fn save_content(&self, id: i64, input: SavePageInput, user: &CmsUser) -> Result<Page, PageServiceError> {
        self.get(id).await?;
        let content = input.content.unwrap_or_default();
        let notes = input.revision_notes.as_deref().map(str::trim).filter(|n| !n.is_empty());
        self.store_content(id, &content, notes, user).await
    }

    async fn store_content(
        &self,
        id: i64,
        content: &str,
        notes: Option<&str>,
        user: &CmsUser,
    ) -> Result<Page, PageServiceError> {
        let publishing = self.settings.page_publishing_enabled;
        let page = self
            .repo
            .save_content(PageContentUpdate {
                page_id: id,
                content,
                author_id: user.author_id,
                user_id: user.id,
                notes,
                mark_unpublished: publishing,
            })
            .await?;
        tracing::info!("Saved page {} for user {}", page.code, user.name);

        if publishing {
            self.hooks.page_needs_publishing(&page).await;
        } else {
            self.invalidate(&page.code).await;
        }
        Ok(page)
    }

    /// Revision `revision_id`, or the newest, plus every revision of the page
    pub async fn history(&self, id: i64, revision_id: Option<i64>) -> Result<History<PageRevision>, PageServiceError> {
        self.get(id).await?;
        let revisions = self.repo.list_revisions(id).await?;
        let current = match revision_id {
            Some(rev) => revisions
                .iter()
                .find(|r| r.id == rev)
                .cloned()
                .ok_or_else(|| PageServiceError::NotFound(format!("revision {}", rev)))?,
            None => revisions.first().cloned().ok_or(PageServiceError::NoHistory)?,
        };
        Ok(History { current, revisions })
    }

    pub async fn restore_revision(&self, id: i64, revision_id: i64, user: &CmsUser) -> Result<Page, PageServiceError> {
        let revision = self
            .repo
            .get_revision(id, revision_id)
            .await?
            .ok_or_else(|| PageServiceError::NotFound(format!("revision {}", revision_id)))?;
        let notes = restore_notes(revision.id, revision.timestamp);
        self.store_content(id, &revision.content, Some(&notes), user).await
    }

    /// Copy the page's current title and content to its live copy
    pub async fn publish(
        &self,
        id: i64,
        user: &CmsUser,
        notes: Option<&str>,
    ) -> Result<PublishedPage, PageServiceError> {
        if !self.settings.page_publishing_enabled {
            return Err(PageServiceError::PublishingDisabled);
        }
        let page = self.get(id).await?;
        let notes = notes.map(str::trim).filter(|n| !n.is_empty());
        let published = self.repo.publish(page.id, user.author_id, user.id, notes).await?;
        tracing::info!("Published page {} for user {}", page.code, user.name);
        self.invalidate(&page.code).await;
        Ok(published)
    }

    /// Revisions of the page's live copy, newest first
    pub async fn published_history(&self, id: i64) -> Result<Vec<PublishedPageRevision>, PageServiceError> {
        let published = self.published_record(id).await?;
        Ok(self.repo.list_published_revisions(published.id).await?)
    }

    /// Put a live-copy revision back on the live copy
    pub async fn restore_published(
        &self,
        id: i64,
        revision_id: i64,
        user: &CmsUser,
    ) -> Result<PublishedPage, PageServiceError> {
        let page = self.get(id).await?;
        let published = self.published_record(id).await?;
        let revision = self
            .repo
            .get_published_revision(published.id, revision_id)
            .await?
            .ok_or_else(|| PageServiceError::NotFound(format!("published revision {}", revision_id)))?;

        let notes = restore_notes(revision.id, revision.timestamp);
        let restored = self
            .repo
            .restore_published(published.id, &revision.content, user.id, &notes)
            .await?;
        tracing::info!("Restored published page {} to revision {}", page.code, revision_id);
        self.invalidate(&page.code).await;
        Ok(restored)
    }

    async fn published_record(&self, id: i64) -> Result<PublishedPage, PageServiceError> {
        if !self.settings.page_publishing_enabled {
            return Err(PageServiceError::PublishingDisabled);
        }
        self.get(id).await?;
        self.repo.get_published(id).await?.ok_or(PageServiceError::NoHistory)
    }

    async fn invalidate(&self, code: &str) {
        if let Err(e) = self.cache.delete(&keys::page(code)).await {
            tracing::warn!("Failed to invalidate page cache for {}: {}", code, e);
        }
    }

    async fn invalidate_all(&self) {
        if let Err(e) = self.cache.delete_pattern(keys::PAGE_PATTERN).await {
            tracing::warn!("Failed to invalidate page cache: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxPageRepository, SqlxUserRepository, UserRepository};
    use crate::db::test_database;
    use crate::services::hooks::recording::RecordingHooks;

    struct Fixture {
        service: PageService,
        hooks: Arc<RecordingHooks>,
        user: CmsUser,
    }

    async fn fixture(publishing: bool) -> Fixture {
        let (pool, tables) = test_database().await;
        let user = SqlxUserRepository::new(pool.clone(), tables.clone())
            .create_with_author("Ann", "ann")
            .await
            .unwrap();
        let settings = CmsSettings {
            page_publishing_enabled: publishing,
            ..CmsSettings::default()
        };
        let hooks = Arc::new(RecordingHooks::default());
        let service = PageService::new(
            SqlxPageRepository::boxed(pool, tables),
            Arc::new(MemoryCache::new()),
            Arc::new(settings),
            hooks.clone(),
        );
        service
            .sync_page_defs(&[PageDef::new("about", "About Us"), PageDef::new("contact", "Contact")])
            .await
            .unwrap();
        Fixture { service, hooks, user }
    }

    fn content(text: &str) -> SavePageInput {
        SavePageInput {
            content: Some(text.into()),
            revision_notes: None,
        }
    }

    #[tokio::test]
    async fn test_sync_page_defs() {
        let f = fixture(false).await;
        let listed = f.service.list(1).await.unwrap();
        assert_eq!(listed.total, 2);
        assert_eq!(listed.per_page, PAGES_PER_PAGE);
        assert_eq!(listed.items[0].code, "about");

        f.service
            .sync_page_defs(&[PageDef::new("about", "About")])
            .await
            .unwrap();
        let pages = f.service.list(1).await.unwrap().items;
        assert_eq!(pages[0].title, "About");
        assert!(!pages[0].disabled);
        assert!(pages[1].disabled);

        // a disabled page comes back when defined again
        f.service
            .sync_page_defs(&[PageDef::new("contact", "Contact")])
            .await
            .unwrap();
        let pages = f.service.list(1).await.unwrap().items;
        assert!(pages[0].disabled);
        assert!(!pages[1].disabled);
    }

    #[tokio::test]
    async fn test_public_lookup_without_publishing() {
        let f = fixture(false).await;
        let about = f.service.get_page_by_code("about", true).await.unwrap().unwrap();
        assert_eq!(about.content, "");

        f.service.save_content(1, content("<p>Hello</p>"), &f.user).await.unwrap();
        let about = f.service.get_page_by_code("about", true).await.unwrap().unwrap();
        assert_eq!(about.content, "<p>Hello</p>");
        assert!(f.hooks.events().is_empty());

        f.service.sync_page_defs(&[]).await.unwrap();
        assert!(f.service.get_page_by_code("about", false).await.unwrap().is_none());
        assert!(f.service.get_page_by_code("about", true).await.unwrap().is_some());
        assert!(f.service.get_page_by_code("missing", true).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_null_content_saves_empty() {
        let f = fixture(false).await;
        let page = f
            .service
            .save_content(
                1,
                SavePageInput {
                    content: None,
                    revision_notes: Some("cleared".into()),
                },
                &f.user,
            )
            .await
            .unwrap();
        assert_eq!(page.content, "");
        assert_eq!(page.author_id, Some(f.user.author_id));
        let history = f.service.history(1, None).await.unwrap();
        assert_eq!(history.current.revision_notes.as_deref(), Some("cleared"));
    }

    #[tokio::test]
    async fn test_history_and_restore() {
        let f = fixture(false).await;
        assert!(matches!(f.service.history(1, None).await, Err(PageServiceError::NoHistory)));

        f.service.save_content(1, content("one"), &f.user).await.unwrap();
        f.service.save_content(1, content("two"), &f.user).await.unwrap();
        let history = f.service.history(1, None).await.unwrap();
        assert_eq!(history.current.content, "two");
        let first = history.revisions.last().unwrap().clone();

        let restored = f.service.restore_revision(1, first.id, &f.user).await.unwrap();
        assert_eq!(restored.content, "one");
        let history = f.service.history(1, None).await.unwrap();
        assert_eq!(history.revisions.len(), 3);
        assert_eq!(
            history.current.revision_notes,
            Some(restore_notes(first.id, first.timestamp))
        );
        assert!(matches!(
            f.service.history(1, Some(999)).await,
            Err(PageServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_publishing_flow() {
        let f = fixture(true).await;
        assert!(f.service.get_page_by_code("about", true).await.unwrap().is_none());

        let page = f.service.save_content(1, content("draft"), &f.user).await.unwrap();
        assert!(!page.published);
        assert_eq!(f.hooks.events(), vec!["publish:about".to_string()]);

        let published = f.service.publish(1, &f.user, Some("first")).await.unwrap();
        assert_eq!(published.content, "draft");
        assert_eq!(published.published_by_id, f.user.author_id);
        assert!(f.service.get(1).await.unwrap().published);

        f.service.save_content(1, content("second draft"), &f.user).await.unwrap();
        assert!(!f.service.get(1).await.unwrap().published);
        let live = f.service.get_page_by_code("about", true).await.unwrap().unwrap();
        assert_eq!(live.content, "draft");

        f.service.publish(1, &f.user, None).await.unwrap();
        let history = f.service.published_history(1).await.unwrap();
        assert_eq!(history.len(), 2);
        let first = history.last().unwrap().id;
        let restored = f.service.restore_published(1, first, &f.user).await.unwrap();
        assert_eq!(restored.content, "draft");
        let live = f.service.get_page_by_code("about", true).await.unwrap().unwrap();
        assert_eq!(live.content, "draft");
    }

    #[tokio::test]
    async fn test_publish_needs_publishing_enabled() {
        let f = fixture(false).await;
        assert!(matches!(
            f.service.publish(1, &f.user, None).await,
            Err(PageServiceError::PublishingDisabled)
        ));
        let g = fixture(true).await;
        assert!(matches!(g.service.published_history(2).await, Err(PageServiceError::NoHistory)));
    }
}
