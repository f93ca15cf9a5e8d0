//! Page repository
//!
//! Pages are created from the host's page definitions; editors only change
//! their content. Content saves and publishing each write a revision in the
//! same transaction.

use crate::db::{Backend, DynDatabasePool, Tables};
use crate::models::{ListParams, Page, PageRevision, PublishedPage, PublishedPageRevision};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, SqlitePool};
use std::sync::Arc;

const PAGE_COLUMNS: &str = "id, created, title, code, content, disabled, author_id, published";

/// A content save
#[derive(Debug, Clone)]
pub struct PageContentUpdate<'a> {
    pub page_id: i64,
    pub content: &'a str,
    pub author_id: i64,
    pub user_id: i64,
    pub notes: Option<&'a str>,
    /// Flag the page as differing from its published copy
    pub mark_unpublished: bool,
}

#[async_trait]
pub trait PageRepository: Send + Sync {
    /// Create an enabled page with empty content
    async fn create(&self, code: &str, title: &str) -> Result<Page>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Page>>;

    async fn get_by_code(&self, code: &str) -> Result<Option<Page>>;

    /// One page of pages ordered by code
    async fn list(&self, params: &ListParams) -> Result<Vec<Page>>;

    async fn count(&self) -> Result<i64>;

    async fn list_all(&self) -> Result<Vec<Page>>;

    /// Apply a page definition: title and enabled state
    async fn update_definition(&self, id: i64, title: &str, disabled: bool) -> Result<()>;

    /// Save content and write a page revision
    async fn save_content(&self, update: PageContentUpdate<'_>) -> Result<Page>;

    /// Revisions of a page, newest first
    async fn list_revisions(&self, page_id: i64) -> Result<Vec<PageRevision>>;

    async fn get_revision(&self, page_id: i64, revision_id: i64) -> Result<Option<PageRevision>>;

    async fn get_published(&self, page_id: i64) -> Result<Option<PublishedPage>>;

    /// Copy the page's title and content to its published record, creating
    /// the record on first publish, and write a published-page revision
    async fn publish(&self, page_id: i64, author_id: i64, user_id: i64, notes: Option<&str>) -> Result<PublishedPage>;

    /// Revisions of a published page, newest first
    async fn list_published_revisions(&self, published_page_id: i64) -> Result<Vec<PublishedPageRevision>>;

    async fn get_published_revision(
        &self,
        published_page_id: i64,
        revision_id: i64,
    ) -> Result<Option<PublishedPageRevision>>;

    /// Replace the live content and write a published-page revision
    async fn restore_published(
        &self,
        published_page_id: i64,
        content: &str,
        user_id: i64,
        notes: &str,
    ) -> Result<PublishedPage>;
}

pub struct SqlxPageRepository {
    pool: DynDatabasePool,
    tables: Arc<Tables>,
}

impl SqlxPageRepository {
    pub fn new(pool: DynDatabasePool, tables: Arc<Tables>) -> Self {
        Self { pool, tables }
    }

    pub fn boxed(pool: DynDatabasePool, tables: Arc<Tables>) -> Arc<dyn PageRepository> {
        Arc::new(Self::new(pool, tables))
    }

    fn select(&self) -> String {
        format!("SELECT {} FROM {}", PAGE_COLUMNS, self.tables.page)
    }

    fn published_select(&self) -> String {
        format!(
            "SELECT id, page_id, published, published_by_id, title, content FROM {}",
            self.tables.published_page
        )
    }

    async fn published_by_id(&self, id: i64) -> Result<PublishedPage> {
        let sql = format!("{} WHERE id = ?", self.published_select());
        let published = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query_as::<_, PublishedPage>(&sql).bind(id).fetch_optional(p).await,
            Backend::Mysql(p) => sqlx::query_as::<_, PublishedPage>(&sql).bind(id).fetch_optional(p).await,
        }
        .context("Failed to get published page")?;
        published.ok_or_else(|| anyhow::anyhow!("Published page {} not found", id))
    }
}

#[async_trait]
impl PageRepository for SqlxPageRepository {
    async fn create(&self, code: &str, title: &str) -> Result<Page> {
        let created = Utc::now();
        let sql = format!(
            "INSERT INTO {} (created, title, code, content, disabled, published) VALUES (?, ?, ?, '', ?, ?)",
            self.tables.page
        );
        let id = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(&sql)
                .bind(created)
                .bind(title)
                .bind(code)
                .bind(false)
                .bind(false)
                .execute(p)
                .await
                .context("Failed to create page")?
                .last_insert_rowid(),
            Backend::Mysql(p) => sqlx::query(&sql)
                .bind(created)
                .bind(title)
                .bind(code)
                .bind(false)
                .bind(false)
                .execute(p)
                .await
                .context("Failed to create page")?
                .last_insert_id() as i64,
        };

        Ok(Page {
            id,
            created,
            title: title.to_string(),
            code: code.to_string(),
            content: String::new(),
            disabled: false,
            author_id: None,
            published: false,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Page>> {
        let sql = format!("{} WHERE id = ?", self.select());
        let page = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query_as::<_, Page>(&sql).bind(id).fetch_optional(p).await,
            Backend::Mysql(p) => sqlx::query_as::<_, Page>(&sql).bind(id).fetch_optional(p).await,
        }
        .context("Failed to get page by id")?;
        Ok(page)
    }

    async fn get_by_code(&self, code: &str) -> Result<Option<Page>> {
        let sql = format!("{} WHERE code = ?", self.select());
        let page = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query_as::<_, Page>(&sql).bind(code).fetch_optional(p).await,
            Backend::Mysql(p) => sqlx::query_as::<_, Page>(&sql).bind(code).fetch_optional(p).await,
        }
        .context("Failed to get page by code")?;
        Ok(page)
    }

    async fn list(&self, params: &ListParams) -> Result<Vec<Page>> {
        let sql = format!("{} ORDER BY code LIMIT ? OFFSET ?", self.select());
        let pages = match self.pool.backend() {
            Backend::Sqlite(p) => {
                sqlx::query_as::<_, Page>(&sql)
                    .bind(params.limit())
                    .bind(params.offset())
                    .fetch_all(p)
                    .await
            }
            Backend::Mysql(p) => {
                sqlx::query_as::<_, Page>(&sql)
                    .bind(params.limit())
                    .bind(params.offset())
                    .fetch_all(p)
                    .await
            }
        }
        .context("Failed to list pages")?;
        Ok(pages)
    }

    async fn count(&self) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.tables.page);
        let count: i64 = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query_scalar(&sql).fetch_one(p).await,
            Backend::Mysql(p) => sqlx::query_scalar(&sql).fetch_one(p).await,
        }
        .context("Failed to count pages")?;
        Ok(count)
    }

    async fn list_all(&self) -> Result<Vec<Page>> {
        let sql = format!("{} ORDER BY code", self.select());
        let pages = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query_as::<_, Page>(&sql).fetch_all(p).await,
            Backend::Mysql(p) => sqlx::query_as::<_, Page>(&sql).fetch_all(p).await,
        }
        .context("Failed to list pages")?;
        Ok(pages)
    }

    async fn update_definition(&self, id: i64, title: &str, disabled: bool) -> Result<()> {
        let sql = format!("UPDATE {} SET title = ?, disabled = ? WHERE id = ?", self.tables.page);
        match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(&sql).bind(title).bind(disabled).bind(id).execute(p).await.map(|_| ()),
            Backend::Mysql(p) => sqlx::query(&sql).bind(title).bind(disabled).bind(id).execute(p).await.map(|_| ()),
        }
        .context("Failed to update page definition")?;
        Ok(())
    }

    async fn save_content(&self, update: PageContentUpdate<'_>) -> Result<Page> {
        match self.pool.backend() {
            Backend::Sqlite(p) => save_content_sqlite(p, &self.tables, &update).await?,
            Backend::Mysql(p) => save_content_mysql(p, &self.tables, &update).await?,
        }

        self.get_by_id(update.page_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Page not found after update"))
    }

    async fn list_revisions(&self, page_id: i64) -> Result<Vec<PageRevision>> {
        let sql = format!(
            "SELECT id, page_id, timestamp, user_id, revision_notes, content FROM {} \
             WHERE page_id = ? ORDER BY id DESC",
            self.tables.page_revision
        );
        let revisions = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query_as::<_, PageRevision>(&sql).bind(page_id).fetch_all(p).await,
            Backend::Mysql(p) => sqlx::query_as::<_, PageRevision>(&sql).bind(page_id).fetch_all(p).await,
        }
        .context("Failed to list page revisions")?;
        Ok(revisions)
    }

    async fn get_revision(&self, page_id: i64, revision_id: i64) -> Result<Option<PageRevision>> {
        let sql = format!(
            "SELECT id, page_id, timestamp, user_id, revision_notes, content FROM {} \
             WHERE page_id = ? AND id = ?",
            self.tables.page_revision
        );
        let revision = match self.pool.backend() {
            Backend::Sqlite(p) => {
                sqlx::query_as::<_, PageRevision>(&sql)
                    .bind(page_id)
                    .bind(revision_id)
                    .fetch_optional(p)
                    .await
            }
            Backend::Mysql(p) => {
                sqlx::query_as::<_, PageRevision>(&sql)
                    .bind(page_id)
                    .bind(revision_id)
                    .fetch_optional(p)
                    .await
            }
        }
        .context("Failed to get page revision")?;
        Ok(revision)
    }

    async fn get_published(&self, page_id: i64) -> Result<Option<PublishedPage>> {
        let sql = format!("{} WHERE page_id = ?", self.published_select());
        let published = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query_as::<_, PublishedPage>(&sql).bind(page_id).fetch_optional(p).await,
            Backend::Mysql(p) => sqlx::query_as::<_, PublishedPage>(&sql).bind(page_id).fetch_optional(p).await,
        }
        .context("Failed to get published page")?;
        Ok(published)
    }

    async fn publish(&self, page_id: i64, author_id: i64, user_id: i64, notes: Option<&str>) -> Result<PublishedPage> {
        let id = match self.pool.backend() {
            Backend::Sqlite(p) => publish_sqlite(p, &self.tables, page_id, author_id, user_id, notes).await?,
            Backend::Mysql(p) => publish_mysql(p, &self.tables, page_id, author_id, user_id, notes).await?,
        };
        self.published_by_id(id).await
    }

    async fn list_published_revisions(&self, published_page_id: i64) -> Result<Vec<PublishedPageRevision>> {
        let sql = format!(
            "SELECT id, published_page_id, timestamp, user_id, revision_notes, content FROM {} \
             WHERE published_page_id = ? ORDER BY id DESC",
            self.tables.published_page_revision
        );
        let revisions = match self.pool.backend() {
            Backend::Sqlite(p) => {
                sqlx::query_as::<_, PublishedPageRevision>(&sql)
                    .bind(published_page_id)
                    .fetch_all(p)
                    .await
            }
            Backend::Mysql(p) => {
                sqlx::query_as::<_, PublishedPageRevision>(&sql)
                    .bind(published_page_id)
                    .fetch_all(p)
                    .await
            }
        }
        .context("Failed to list published page revisions")?;
        Ok(revisions)
    }

    async fn get_published_revision(
        &self,
        published_page_id: i64,
        revision_id: i64,
    ) -> Result<Option<PublishedPageRevision>> {
        let sql = format!(
            "SELECT id, published_page_id, timestamp, user_id, revision_notes, content FROM {} \
             WHERE published_page_id = ? AND id = ?",
            self.tables.published_page_revision
        );
        let revision = match self.pool.backend() {
            Backend::Sqlite(p) => {
                sqlx::query_as::<_, PublishedPageRevision>(&sql)
                    .bind(published_page_id)
                    .bind(revision_id)
                    .fetch_optional(p)
                    .await
            }
            Backend::Mysql(p) => {
                sqlx::query_as::<_, PublishedPageRevision>(&sql)
                    .bind(published_page_id)
                    .bind(revision_id)
                    .fetch_optional(p)
                    .await
            }
        }
        .context("Failed to get published page revision")?;
        Ok(revision)
    }

    async fn restore_published(
        &self,
        published_page_id: i64,
        content: &str,
        user_id: i64,
        notes: &str,
    ) -> Result<PublishedPage> {
        match self.pool.backend() {
            Backend::Sqlite(p) => {
                restore_published_sqlite(p, &self.tables, published_page_id, content, user_id, notes).await?
            }
            Backend::Mysql(p) => {
                restore_published_mysql(p, &self.tables, published_page_id, content, user_id, notes).await?
            }
        }
        self.published_by_id(published_page_id).await
    }
}

fn content_update_sql(tables: &Tables, mark_unpublished: bool) -> String {
    if mark_unpublished {
        format!(
            "UPDATE {} SET content = ?, author_id = ?, published = ? WHERE id = ?",
            tables.page
        )
    } else {
        format!("UPDATE {} SET content = ?, author_id = ? WHERE id = ?", tables.page)
    }
}

fn page_revision_sql(tables: &Tables) -> String {
    format!(
        "INSERT INTO {} (page_id, timestamp, user_id, revision_notes, content) VALUES (?, ?, ?, ?, ?)",
        tables.page_revision
    )
}

fn published_revision_sql(tables: &Tables) -> String {
    format!(
        "INSERT INTO {} (published_page_id, timestamp, user_id, revision_notes, content) VALUES (?, ?, ?, ?, ?)",
        tables.published_page_revision
    )
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn save_content_sqlite(pool: &SqlitePool, tables: &Tables, update: &PageContentUpdate<'_>) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let sql = content_update_sql(tables, update.mark_unpublished);
    let mut query = sqlx::query(&sql).bind(update.content).bind(update.author_id);
    if update.mark_unpublished {
        query = query.bind(false);
    }
    query
        .bind(update.page_id)
        .execute(&mut *tx)
        .await
        .context("Failed to save page content")?;

    sqlx::query(&page_revision_sql(tables))
        .bind(update.page_id)
        .bind(Utc::now())
        .bind(update.user_id)
        .bind(update.notes)
        .bind(update.content)
        .execute(&mut *tx)
        .await
        .context("Failed to create page revision")?;

    tx.commit().await.context("Failed to commit transaction")?;
    Ok(())
}

async fn publish_sqlite(
    pool: &SqlitePool,
    tables: &Tables,
    page_id: i64,
    author_id: i64,
    user_id: i64,
    notes: Option<&str>,
) -> Result<i64> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;
    let now = Utc::now();

    let (title, content): (String, String) =
        sqlx::query_as(&format!("SELECT title, content FROM {} WHERE id = ?", tables.page))
            .bind(page_id)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to read page")?
            .ok_or_else(|| anyhow::anyhow!("Page {} not found", page_id))?;

    let existing: Option<i64> =
        sqlx::query_scalar(&format!("SELECT id FROM {} WHERE page_id = ?", tables.published_page))
            .bind(page_id)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to read published page")?;

    let published_id = match existing {
        Some(id) => {
            sqlx::query(&format!(
                "UPDATE {} SET published = ?, published_by_id = ?, title = ?, content = ? WHERE id = ?",
                tables.published_page
            ))
            .bind(now)
            .bind(author_id)
            .bind(&title)
            .bind(&content)
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to update published page")?;
            id
        }
        None => sqlx::query(&format!(
            "INSERT INTO {} (page_id, published, published_by_id, title, content) VALUES (?, ?, ?, ?, ?)",
            tables.published_page
        ))
        .bind(page_id)
        .bind(now)
        .bind(author_id)
        .bind(&title)
        .bind(&content)
        .execute(&mut *tx)
        .await
        .context("Failed to create published page")?
        .last_insert_rowid(),
    };

    sqlx::query(&published_revision_sql(tables))
        .bind(published_id)
        .bind(now)
        .bind(user_id)
        .bind(notes)
        .bind(&content)
        .execute(&mut *tx)
        .await
        .context("Failed to create published page revision")?;

    sqlx::query(&format!("UPDATE {} SET published = ? WHERE id = ?", tables.page))
        .bind(true)
        .bind(page_id)
        .execute(&mut *tx)
        .await
        .context("Failed to mark page published")?;

    tx.commit().await.context("Failed to commit transaction")?;
    Ok(published_id)
}

async fn restore_published_sqlite(
    pool: &SqlitePool,
    tables: &Tables,
    published_page_id: i64,
    content: &str,
    user_id: i64,
    notes: &str,
) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query(&format!("UPDATE {} SET content = ? WHERE id = ?", tables.published_page))
        .bind(content)
        .bind(published_page_id)
        .execute(&mut *tx)
        .await
        .context("Failed to restore published page")?;

    sqlx::query(&published_revision_sql(tables))
        .bind(published_page_id)
        .bind(Utc::now())
        .bind(user_id)
        .bind(notes)
        .bind(content)
        .execute(&mut *tx)
        .await
        .context("Failed to create published page revision")?;

    tx.commit().await.context("Failed to commit transaction")?;
    Ok(())
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn save_content_mysql(pool: &MySqlPool, tables: &Tables, update: &PageContentUpdate<'_>) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let sql = content_update_sql(tables, update.mark_unpublished);
    let mut query = sqlx::query(&sql).bind(update.content).bind(update.author_id);
    if update.mark_unpublished {
        query = query.bind(false);
    }
    query
        .bind(update.page_id)
        .execute(&mut *tx)
        .await
        .context("Failed to save page content")?;

    sqlx::query(&page_revision_sql(tables))
        .bind(update.page_id)
        .bind(Utc::now())
        .bind(update.user_id)
        .bind(update.notes)
        .bind(update.content)
        .execute(&mut *tx)
        .await
        .context("Failed to create page revision")?;

    tx.commit().await.context("Failed to commit transaction")?;
    Ok(())
}

async fn publish_mysql(
    pool: &MySqlPool,
    tables: &Tables,
    page_id: i64,
    author_id: i64,
    user_id: i64,
    notes: Option<&str>,
) -> Result<i64> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;
    let now = Utc::now();

    let (title, content): (String, String) = sqlx::query_as(&format!(
        "SELECT title, content FROM {} WHERE id = ? FOR UPDATE",
        tables.page
    ))
    .bind(page_id)
    .fetch_optional(&mut *tx)
    .await
    .context("Failed to read page")?
    .ok_or_else(|| anyhow::anyhow!("Page {} not found", page_id))?;

    let existing: Option<i64> =
        sqlx::query_scalar(&format!("SELECT id FROM {} WHERE page_id = ?", tables.published_page))
            .bind(page_id)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to read published page")?;

    let published_id = match existing {
        Some(id) => {
            sqlx::query(&format!(
                "UPDATE {} SET published = ?, published_by_id = ?, title = ?, content = ? WHERE id = ?",
                tables.published_page
            ))
            .bind(now)
            .bind(author_id)
            .bind(&title)
            .bind(&content)
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to update published page")?;
            id
        }
        None => sqlx::query(&format!(
            "INSERT INTO {} (page_id, published, published_by_id, title, content) VALUES (?, ?, ?, ?, ?)",
            tables.published_page
        ))
        .bind(page_id)
        .bind(now)
        .bind(author_id)
        .bind(&title)
        .bind(&content)
        .execute(&mut *tx)
        .await
        .context("Failed to create published page")?
        .last_insert_id() as i64,
    };

    sqlx::query(&published_revision_sql(tables))
        .bind(published_id)
        .bind(now)
        .bind(user_id)
        .bind(notes)
        .bind(&content)
        .execute(&mut *tx)
        .await
        .context("Failed to create published page revision")?;

    sqlx::query(&format!("UPDATE {} SET published = ? WHERE id = ?", tables.page))
        .bind(true)
        .bind(page_id)
        .execute(&mut *tx)
        .await
        .context("Failed to mark page published")?;

    tx.commit().await.context("Failed to commit transaction")?;
    Ok(published_id)
}

async fn restore_published_mysql(
    pool: &MySqlPool,
    tables: &Tables,
    published_page_id: i64,
    content: &str,
    user_id: i64,
    notes: &str,
) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query(&format!("UPDATE {} SET content = ? WHERE id = ?", tables.published_page))
        .bind(content)
        .bind(published_page_id)
        .execute(&mut *tx)
        .await
        .context("Failed to restore published page")?;

    sqlx::query(&published_revision_sql(tables))
        .bind(published_page_id)
        .bind(Utc::now())
        .bind(user_id)
        .bind(notes)
        .bind(content)
        .execute(&mut *tx)
        .await
        .context("Failed to create published page revision")?;

    tx.commit().await.context("Failed to commit transaction")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_database;

    async fn setup() -> SqlxPageRepository {
        let (pool, tables) = test_database().await;
        pool.execute("INSERT INTO cms_author (id, name, code) VALUES (1, 'Ann', 'ann')")
            .await
            .unwrap();
        pool.execute("INSERT INTO cms_user (id, name, author_id) VALUES (1, 'ann', 1)")
            .await
            .unwrap();
        SqlxPageRepository::new(pool, tables)
    }

    fn content_update(page_id: i64, content: &str, mark_unpublished: bool) -> PageContentUpdate<'_> {
        PageContentUpdate {
            page_id,
            content,
            author_id: 1,
            user_id: 1,
            notes: None,
            mark_unpublished,
        }
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let repo = setup().await;
        repo.create("terms", "Terms").await.unwrap();
        let about = repo.create("about", "About Us").await.unwrap();
        assert_eq!(about.content, "");
        assert!(!about.disabled);

        let codes: Vec<String> = repo
            .list(&ListParams::new(1, 30))
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.code)
            .collect();
        assert_eq!(codes, vec!["about", "terms"]);
        assert_eq!(repo.count().await.unwrap(), 2);
        assert_eq!(repo.get_by_code("about").await.unwrap(), Some(about));
    }

    #[tokio::test]
    async fn test_update_definition() {
        let repo = setup().await;
        let page = repo.create("about", "About").await.unwrap();
        repo.update_definition(page.id, "About Us", true).await.unwrap();

        let page = repo.get_by_id(page.id).await.unwrap().unwrap();
        assert_eq!(page.title, "About Us");
        assert!(page.disabled);
    }

    #[tokio::test]
    async fn test_save_content_writes_revision() {
        let repo = setup().await;
        let page = repo.create("about", "About").await.unwrap();

        let saved = repo.save_content(content_update(page.id, "<p>One</p>", false)).await.unwrap();
        assert_eq!(saved.content, "<p>One</p>");
        assert_eq!(saved.author_id, Some(1));
        repo.save_content(content_update(page.id, "<p>Two</p>", false)).await.unwrap();

        let revisions = repo.list_revisions(page.id).await.unwrap();
        assert_eq!(revisions.len(), 2);
        assert_eq!(revisions[0].content, "<p>Two</p>");
        assert_eq!(
            repo.get_revision(page.id, revisions[1].id).await.unwrap().map(|r| r.content),
            Some("<p>One</p>".to_string())
        );
    }

    #[tokio::test]
    async fn test_publish_cycle() {
        let repo = setup().await;
        let page = repo.create("about", "About").await.unwrap();
        repo.save_content(content_update(page.id, "<p>Draft</p>", true)).await.unwrap();
        assert!(repo.get_published(page.id).await.unwrap().is_none());

        let first = repo.publish(page.id, 1, 1, Some("go live")).await.unwrap();
        assert_eq!(first.content, "<p>Draft</p>");
        assert!(repo.get_by_id(page.id).await.unwrap().unwrap().published);

        let edited = repo.save_content(content_update(page.id, "<p>Next</p>", true)).await.unwrap();
        assert!(!edited.published);
        assert_eq!(repo.get_published(page.id).await.unwrap().unwrap().content, "<p>Draft</p>");

        let second = repo.publish(page.id, 1, 1, None).await.unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.content, "<p>Next</p>");

        let revisions = repo.list_published_revisions(first.id).await.unwrap();
        assert_eq!(revisions.len(), 2);
        assert_eq!(revisions[1].revision_notes.as_deref(), Some("go live"));

        let restored = repo
            .restore_published(first.id, &revisions[1].content, 1, "Restored")
            .await
            .unwrap();
        assert_eq!(restored.content, "<p>Draft</p>");
        assert_eq!(repo.list_published_revisions(first.id).await.unwrap().len(), 3);
        assert!(repo.get_published_revision(first.id, revisions[0].id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_publish_missing_page_fails() {
        let repo = setup().await;
        assert!(repo.publish(99, 1, 1, None).await.is_err());
    }
}
