//! Post repository
//!
//! Posts, their revisions and the queries behind the public listings.
//! Saving a post always writes a revision in the same transaction.
//!
//! Public queries hide posts without a published date and posts scheduled for
//! the future. Listings include a post once `published <= now`; a lookup by
//! code needs `published < now`.

use crate::db::{Backend, DynDatabasePool, Tables};
use crate::models::{ListParams, Post, PostFilter, PostRevision};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, SqlitePool};
use std::sync::Arc;

const POST_COLUMNS: &str = "p.id, p.post_type, p.created, p.published, p.category_id, p.title, p.code, \
     p.tagline, p.content, p.author_id, p.html_title, p.html_description, p.snippet_title, \
     p.snippet_description, p.snippet_image, p.main_image_url";

/// Which neighbour of a post to fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjacent {
    /// The next newer post
    Next,
    /// The next older post
    Previous,
}

#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn get_by_id(&self, id: i64) -> Result<Option<Post>>;

    async fn get_by_code(
        &self,
        post_type: &str,
        code: &str,
        allow_unpublished: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<Post>>;

    /// One page of posts matching `filter`, newest first
    async fn list(&self, filter: &PostFilter, params: &ListParams, now: DateTime<Utc>) -> Result<Vec<Post>>;

    async fn count(&self, filter: &PostFilter, now: DateTime<Utc>) -> Result<i64>;

    /// Every published post of every type, newest first
    async fn list_published(&self, now: DateTime<Utc>) -> Result<Vec<Post>>;

    async fn adjacent(
        &self,
        post: &Post,
        direction: Adjacent,
        allow_unpublished: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<Post>>;

    /// Case-insensitive title clash within a post type
    async fn title_in_use(&self, post_type: &str, title: &str, exclude_id: Option<i64>) -> Result<bool>;

    async fn code_in_use(&self, post_type: &str, code: &str, exclude_id: Option<i64>) -> Result<bool>;

    /// Insert (`post.id == 0`) or update a post and record a revision of its
    /// title and content for `user_id`
    async fn save_with_revision(&self, post: &Post, user_id: i64, notes: Option<&str>) -> Result<Post>;

    /// Update a post without recording a revision
    async fn update(&self, post: &Post) -> Result<Post>;

    /// Delete a post with its tag links, revisions and comments
    async fn delete_with_dependents(&self, id: i64) -> Result<()>;

    /// Revisions of a post, newest first
    async fn list_revisions(&self, post_id: i64) -> Result<Vec<PostRevision>>;

    async fn get_revision(&self, post_id: i64, revision_id: i64) -> Result<Option<PostRevision>>;

    /// Newest revision timestamp over all published posts
    async fn latest_revision_timestamp(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>>;
}

/// Bind the parameters of [`filter_clause`] in order
macro_rules! bind_filter {
    ($query:expr, $filter:expr, $now:expr) => {
        $query
            .bind($filter.post_type.as_deref())
            .bind($filter.post_type.as_deref())
            .bind($filter.category_code.as_deref())
            .bind($filter.category_code.as_deref())
            .bind($filter.tag_name.as_deref())
            .bind($filter.tag_name.as_deref())
            .bind($filter.allow_unpublished)
            .bind($now)
    };
}

/// Bind every post column except `id`, in table order
macro_rules! bind_post {
    ($query:expr, $post:expr) => {
        $query
            .bind(&$post.post_type)
            .bind($post.created)
            .bind($post.published)
            .bind($post.category_id)
            .bind(&$post.title)
            .bind(&$post.code)
            .bind(&$post.tagline)
            .bind(&$post.content)
            .bind($post.author_id)
            .bind(&$post.html_title)
            .bind(&$post.html_description)
            .bind(&$post.snippet_title)
            .bind(&$post.snippet_description)
            .bind(&$post.snippet_image)
            .bind(&$post.main_image_url)
    };
}

pub struct SqlxPostRepository {
    pool: DynDatabasePool,
    tables: Arc<Tables>,
}

impl SqlxPostRepository {
    pub fn new(pool: DynDatabasePool, tables: Arc<Tables>) -> Self {
        Self { pool, tables }
    }

    pub fn boxed(pool: DynDatabasePool, tables: Arc<Tables>) -> Arc<dyn PostRepository> {
        Arc::new(Self::new(pool, tables))
    }

    fn filter_clause(&self) -> String {
        format!(
            "WHERE (? IS NULL OR p.post_type = ?) \
             AND (? IS NULL OR EXISTS (SELECT 1 FROM {category} c WHERE c.id = p.category_id AND c.code = ?)) \
             AND (? IS NULL OR EXISTS (SELECT 1 FROM {link} pt JOIN {tag} t ON t.id = pt.tag_id \
                  WHERE pt.post_id = p.id AND t.name = ?)) \
             AND (? OR (p.published IS NOT NULL AND p.published <= ?))",
            category = self.tables.category,
            link = self.tables.post_tag,
            tag = self.tables.tag
        )
    }

    fn revision_select(&self) -> String {
        format!(
            "SELECT id, post_id, timestamp, user_id, revision_notes, title, content FROM {}",
            self.tables.post_revision
        )
    }
}

fn insert_sql(tables: &Tables) -> String {
    format!(
        "INSERT INTO {} (post_type, created, published, category_id, title, code, tagline, content, author_id, \
         html_title, html_description, snippet_title, snippet_description, snippet_image, main_image_url) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        tables.post
    )
}

fn update_sql(tables: &Tables) -> String {
    format!(
        "UPDATE {} SET post_type = ?, created = ?, published = ?, category_id = ?, title = ?, code = ?, \
         tagline = ?, content = ?, author_id = ?, html_title = ?, html_description = ?, snippet_title = ?, \
         snippet_description = ?, snippet_image = ?, main_image_url = ? WHERE id = ?",
        tables.post
    )
}

fn revision_insert_sql(tables: &Tables) -> String {
    format!(
        "INSERT INTO {} (post_id, timestamp, user_id, revision_notes, title, content) VALUES (?, ?, ?, ?, ?, ?)",
        tables.post_revision
    )
}

#[async_trait]
impl PostRepository for SqlxPostRepository {
    async fn get_by_id(&self, id: i64) -> Result<Option<Post>> {
        let sql = format!("SELECT {} FROM {} p WHERE p.id = ?", POST_COLUMNS, self.tables.post);
        let post = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query_as::<_, Post>(&sql).bind(id).fetch_optional(p).await,
            Backend::Mysql(p) => sqlx::query_as::<_, Post>(&sql).bind(id).fetch_optional(p).await,
        }
        .context("Failed to get post by id")?;
        Ok(post)
    }

    async fn get_by_code(
        &self,
        post_type: &str,
        code: &str,
        allow_unpublished: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<Post>> {
        let sql = format!(
            "SELECT {} FROM {} p WHERE p.post_type = ? AND p.code = ? \
             AND (? OR (p.published IS NOT NULL AND p.published < ?))",
            POST_COLUMNS, self.tables.post
        );
        let post = match self.pool.backend() {
            Backend::Sqlite(p) => {
                sqlx::query_as::<_, Post>(&sql)
                    .bind(post_type)
                    .bind(code)
                    .bind(allow_unpublished)
                    .bind(now)
                    .fetch_optional(p)
                    .await
            }
            Backend::Mysql(p) => {
                sqlx::query_as::<_, Post>(&sql)
                    .bind(post_type)
                    .bind(code)
                    .bind(allow_unpublished)
                    .bind(now)
                    .fetch_optional(p)
                    .await
            }
        }
        .context("Failed to get post by code")?;
        Ok(post)
    }

    async fn list(&self, filter: &PostFilter, params: &ListParams, now: DateTime<Utc>) -> Result<Vec<Post>> {
        let order = if filter.allow_unpublished {
            "COALESCE(p.published, p.created) DESC, p.id DESC"
        } else {
            "p.published DESC, p.id DESC"
        };
        let sql = format!(
            "SELECT {} FROM {} p {} ORDER BY {} LIMIT ? OFFSET ?",
            POST_COLUMNS,
            self.tables.post,
            self.filter_clause(),
            order
        );
        let posts = match self.pool.backend() {
            Backend::Sqlite(p) => {
                bind_filter!(sqlx::query_as::<_, Post>(&sql), filter, now)
                    .bind(params.limit())
                    .bind(params.offset())
                    .fetch_all(p)
                    .await
            }
            Backend::Mysql(p) => {
                bind_filter!(sqlx::query_as::<_, Post>(&sql), filter, now)
                    .bind(params.limit())
                    .bind(params.offset())
                    .fetch_all(p)
                    .await
            }
        }
        .context("Failed to list posts")?;
        Ok(posts)
    }

    async fn count(&self, filter: &PostFilter, now: DateTime<Utc>) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {} p {}", self.tables.post, self.filter_clause());
        let count: i64 = match self.pool.backend() {
            Backend::Sqlite(p) => bind_filter!(sqlx::query_scalar(&sql), filter, now).fetch_one(p).await,
            Backend::Mysql(p) => bind_filter!(sqlx::query_scalar(&sql), filter, now).fetch_one(p).await,
        }
        .context("Failed to count posts")?;
        Ok(count)
    }

    async fn list_published(&self, now: DateTime<Utc>) -> Result<Vec<Post>> {
        let sql = format!(
            "SELECT {} FROM {} p WHERE p.published IS NOT NULL AND p.published <= ? \
             ORDER BY p.published DESC, p.id DESC",
            POST_COLUMNS, self.tables.post
        );
        let posts = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query_as::<_, Post>(&sql).bind(now).fetch_all(p).await,
            Backend::Mysql(p) => sqlx::query_as::<_, Post>(&sql).bind(now).fetch_all(p).await,
        }
        .context("Failed to list published posts")?;
        Ok(posts)
    }

    async fn adjacent(
        &self,
        post: &Post,
        direction: Adjacent,
        allow_unpublished: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<Post>> {
        let (key, reference) = if allow_unpublished {
            ("COALESCE(p.published, p.created)", post.sort_date())
        } else {
            ("p.published", post.published.unwrap_or(post.created))
        };
        let (op, dir) = match direction {
            Adjacent::Next => (">", "ASC"),
            Adjacent::Previous => ("<", "DESC"),
        };
        let sql = format!(
            "SELECT {cols} FROM {post} p WHERE p.post_type = ? AND p.id <> ? AND {key} {op} ? \
             AND (? OR (p.published IS NOT NULL AND p.published <= ?)) \
             ORDER BY {key} {dir}, p.id {dir} LIMIT 1",
            cols = POST_COLUMNS,
            post = self.tables.post,
            key = key,
            op = op,
            dir = dir
        );
        let found = match self.pool.backend() {
            Backend::Sqlite(p) => {
                sqlx::query_as::<_, Post>(&sql)
                    .bind(&post.post_type)
                    .bind(post.id)
                    .bind(reference)
                    .bind(allow_unpublished)
                    .bind(now)
                    .fetch_optional(p)
                    .await
            }
            Backend::Mysql(p) => {
                sqlx::query_as::<_, Post>(&sql)
                    .bind(&post.post_type)
                    .bind(post.id)
                    .bind(reference)
                    .bind(allow_unpublished)
                    .bind(now)
                    .fetch_optional(p)
                    .await
            }
        }
        .context("Failed to get adjacent post")?;
        Ok(found)
    }

    async fn title_in_use(&self, post_type: &str, title: &str, exclude_id: Option<i64>) -> Result<bool> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE post_type = ? AND LOWER(title) = LOWER(?) AND id <> ?",
            self.tables.post
        );
        let exclude = exclude_id.unwrap_or(0);
        let count: i64 = match self.pool.backend() {
            Backend::Sqlite(p) => {
                sqlx::query_scalar(&sql)
                    .bind(post_type)
                    .bind(title)
                    .bind(exclude)
                    .fetch_one(p)
                    .await
            }
            Backend::Mysql(p) => {
                sqlx::query_scalar(&sql)
                    .bind(post_type)
                    .bind(title)
                    .bind(exclude)
                    .fetch_one(p)
                    .await
            }
        }
        .context("Failed to check post title")?;
        Ok(count > 0)
    }

    async fn code_in_use(&self, post_type: &str, code: &str, exclude_id: Option<i64>) -> Result<bool> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE post_type = ? AND code = ? AND id <> ?",
            self.tables.post
        );
        let exclude = exclude_id.unwrap_or(0);
        let count: i64 = match self.pool.backend() {
            Backend::Sqlite(p) => {
                sqlx::query_scalar(&sql)
                    .bind(post_type)
                    .bind(code)
                    .bind(exclude)
                    .fetch_one(p)
                    .await
            }
            Backend::Mysql(p) => {
                sqlx::query_scalar(&sql)
                    .bind(post_type)
                    .bind(code)
                    .bind(exclude)
                    .fetch_one(p)
                    .await
            }
        }
        .context("Failed to check post code")?;
        Ok(count > 0)
    }

    async fn save_with_revision(&self, post: &Post, user_id: i64, notes: Option<&str>) -> Result<Post> {
        match self.pool.backend() {
            Backend::Sqlite(p) => save_post_sqlite(p, &self.tables, post, user_id, notes).await,
            Backend::Mysql(p) => save_post_mysql(p, &self.tables, post, user_id, notes).await,
        }
    }

    async fn update(&self, post: &Post) -> Result<Post> {
        let sql = update_sql(&self.tables);
        match self.pool.backend() {
            Backend::Sqlite(p) => bind_post!(sqlx::query(&sql), post).bind(post.id).execute(p).await.map(|_| ()),
            Backend::Mysql(p) => bind_post!(sqlx::query(&sql), post).bind(post.id).execute(p).await.map(|_| ()),
        }
        .context("Failed to update post")?;

        self.get_by_id(post.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Post not found after update"))
    }

    async fn delete_with_dependents(&self, id: i64) -> Result<()> {
        match self.pool.backend() {
            Backend::Sqlite(p) => delete_post_sqlite(p, &self.tables, id).await,
            Backend::Mysql(p) => delete_post_mysql(p, &self.tables, id).await,
        }
    }

    async fn list_revisions(&self, post_id: i64) -> Result<Vec<PostRevision>> {
        let sql = format!("{} WHERE post_id = ? ORDER BY id DESC", self.revision_select());
        let revisions = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query_as::<_, PostRevision>(&sql).bind(post_id).fetch_all(p).await,
            Backend::Mysql(p) => sqlx::query_as::<_, PostRevision>(&sql).bind(post_id).fetch_all(p).await,
        }
        .context("Failed to list post revisions")?;
        Ok(revisions)
    }

    async fn get_revision(&self, post_id: i64, revision_id: i64) -> Result<Option<PostRevision>> {
        let sql = format!("{} WHERE post_id = ? AND id = ?", self.revision_select());
        let revision = match self.pool.backend() {
            Backend::Sqlite(p) => {
                sqlx::query_as::<_, PostRevision>(&sql)
                    .bind(post_id)
                    .bind(revision_id)
                    .fetch_optional(p)
                    .await
            }
            Backend::Mysql(p) => {
                sqlx::query_as::<_, PostRevision>(&sql)
                    .bind(post_id)
                    .bind(revision_id)
                    .fetch_optional(p)
                    .await
            }
        }
        .context("Failed to get post revision")?;
        Ok(revision)
    }

    async fn latest_revision_timestamp(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        let sql = format!(
            "SELECT MAX(r.timestamp) FROM {} r JOIN {} p ON p.id = r.post_id \
             WHERE p.published IS NOT NULL AND p.published <= ?",
            self.tables.post_revision, self.tables.post
        );
        let latest: Option<DateTime<Utc>> = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query_scalar(&sql).bind(now).fetch_one(p).await,
            Backend::Mysql(p) => sqlx::query_scalar(&sql).bind(now).fetch_one(p).await,
        }
        .context("Failed to get latest revision timestamp")?;
        Ok(latest)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn save_post_sqlite(
    pool: &SqlitePool,
    tables: &Tables,
    post: &Post,
    user_id: i64,
    notes: Option<&str>,
) -> Result<Post> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let id = if post.id == 0 {
        bind_post!(sqlx::query(&insert_sql(tables)), post)
            .execute(&mut *tx)
            .await
            .context("Failed to create post")?
            .last_insert_rowid()
    } else {
        bind_post!(sqlx::query(&update_sql(tables)), post)
            .bind(post.id)
            .execute(&mut *tx)
            .await
            .context("Failed to update post")?;
        post.id
    };

    sqlx::query(&revision_insert_sql(tables))
        .bind(id)
        .bind(Utc::now())
        .bind(user_id)
        .bind(notes)
        .bind(&post.title)
        .bind(&post.content)
        .execute(&mut *tx)
        .await
        .context("Failed to create post revision")?;

    tx.commit().await.context("Failed to commit transaction")?;

    Ok(Post { id, ..post.clone() })
}

async fn delete_post_sqlite(pool: &SqlitePool, tables: &Tables, id: i64) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    for sql in delete_statements(tables) {
        sqlx::query(&sql)
            .bind(id)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to delete post: {}", sql))?;
    }

    tx.commit().await.context("Failed to commit transaction")?;
    Ok(())
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn save_post_mysql(
    pool: &MySqlPool,
    tables: &Tables,
    post: &Post,
    user_id: i64,
    notes: Option<&str>,
) -> Result<Post> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let id = if post.id == 0 {
        bind_post!(sqlx::query(&insert_sql(tables)), post)
            .execute(&mut *tx)
            .await
            .context("Failed to create post")?
            .last_insert_id() as i64
    } else {
        bind_post!(sqlx::query(&update_sql(tables)), post)
            .bind(post.id)
            .execute(&mut *tx)
            .await
            .context("Failed to update post")?;
        post.id
    };

    sqlx::query(&revision_insert_sql(tables))
        .bind(id)
        .bind(Utc::now())
        .bind(user_id)
        .bind(notes)
        .bind(&post.title)
        .bind(&post.content)
        .execute(&mut *tx)
        .await
        .context("Failed to create post revision")?;

    tx.commit().await.context("Failed to commit transaction")?;

    Ok(Post { id, ..post.clone() })
}

async fn delete_post_mysql(pool: &MySqlPool, tables: &Tables, id: i64) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    for sql in delete_statements(tables) {
        sqlx::query(&sql)
            .bind(id)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to delete post: {}", sql))?;
    }

    tx.commit().await.context("Failed to commit transaction")?;
    Ok(())
}

/// Statements that remove a post, each taking the post id
fn delete_statements(tables: &Tables) -> [String; 5] {
    [
        format!("DELETE FROM {} WHERE post_id = ?", tables.post_tag),
        format!("DELETE FROM {} WHERE post_id = ?", tables.post_revision),
        // InnoDB checks the self reference row by row
        format!("UPDATE {} SET reply_to_id = NULL WHERE post_id = ?", tables.comment),
        format!("DELETE FROM {} WHERE post_id = ?", tables.comment),
        format!("DELETE FROM {} WHERE id = ?", tables.post),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxTagRepository, TagRepository};
    use crate::db::test_database;
    use chrono::{Duration, TimeZone};

    struct Fixture {
        pool: DynDatabasePool,
        tables: Arc<Tables>,
        repo: SqlxPostRepository,
    }

    async fn setup() -> Fixture {
        let (pool, tables) = test_database().await;
        for sql in [
            "INSERT INTO cms_author (id, name, code) VALUES (1, 'Ann', 'ann')",
            "INSERT INTO cms_user (id, name, author_id) VALUES (1, 'ann', 1)",
            "INSERT INTO cms_category (id, post_type, name, code) VALUES (1, 'news', 'Local', 'local')",
            "INSERT INTO cms_category (id, post_type, name, code) VALUES (2, 'news', 'World', 'world')",
        ] {
            pool.execute(sql).await.unwrap();
        }
        Fixture {
            repo: SqlxPostRepository::new(pool.clone(), tables.clone()),
            pool,
            tables,
        }
    }

    fn draft(title: &str, code: &str) -> Post {
        Post {
            id: 0,
            post_type: "news".into(),
            created: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
            published: None,
            category_id: 1,
            title: title.into(),
            code: code.into(),
            tagline: "tagline".into(),
            content: "<p>body</p>".into(),
            author_id: 1,
            html_title: None,
            html_description: None,
            snippet_title: None,
            snippet_description: None,
            snippet_image: None,
            main_image_url: None,
        }
    }

    async fn published(f: &Fixture, title: &str, code: &str, at: DateTime<Utc>) -> Post {
        let mut post = draft(title, code);
        post.published = Some(at);
        f.repo.save_with_revision(&post, 1, None).await.unwrap()
    }

    #[tokio::test]
    async fn test_save_writes_revision() {
        let f = setup().await;
        let post = f.repo.save_with_revision(&draft("Hello", "hello"), 1, Some("first")).await.unwrap();
        assert!(post.id > 0);

        let mut edited = post.clone();
        edited.content = "<p>changed</p>".into();
        f.repo.save_with_revision(&edited, 1, None).await.unwrap();

        let revisions = f.repo.list_revisions(post.id).await.unwrap();
        assert_eq!(revisions.len(), 2);
        assert_eq!(revisions[0].content, "<p>changed</p>");
        assert_eq!(revisions[1].revision_notes.as_deref(), Some("first"));
        assert_eq!(
            f.repo.get_revision(post.id, revisions[1].id).await.unwrap(),
            Some(revisions[1].clone())
        );
        assert!(f.repo.get_revision(post.id + 1, revisions[1].id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_published_visibility() {
        let f = setup().await;
        let now = Utc::now();
        published(&f, "Old", "old", now - Duration::days(2)).await;
        published(&f, "Future", "future", now + Duration::days(2)).await;
        f.repo.save_with_revision(&draft("Draft", "draft"), 1, None).await.unwrap();

        let public = PostFilter::published("news");
        let listed = f.repo.list(&public, &ListParams::default(), now).await.unwrap();
        assert_eq!(listed.iter().map(|p| p.code.as_str()).collect::<Vec<_>>(), vec!["old"]);
        assert_eq!(f.repo.count(&public, now).await.unwrap(), 1);

        let editor = PostFilter {
            allow_unpublished: true,
            ..PostFilter::default()
        };
        assert_eq!(f.repo.count(&editor, now).await.unwrap(), 3);

        assert!(f.repo.get_by_code("news", "future", false, now).await.unwrap().is_none());
        assert!(f.repo.get_by_code("news", "future", true, now).await.unwrap().is_some());
        assert!(f.repo.get_by_code("news", "old", false, now).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_filter_by_category_and_tag() {
        let f = setup().await;
        let now = Utc::now();
        let a = published(&f, "A", "a", now - Duration::hours(3)).await;
        let mut b = draft("B", "b");
        b.category_id = 2;
        b.published = Some(now - Duration::hours(2));
        let b = f.repo.save_with_revision(&b, 1, None).await.unwrap();

        let tags = SqlxTagRepository::new(f.pool.clone(), f.tables.clone());
        let tag = tags.create("news", "fete", "fete").await.unwrap();
        tags.attach(b.id, tag.id).await.unwrap();

        let by_category = PostFilter {
            category_code: Some("local".into()),
            ..PostFilter::published("news")
        };
        let listed = f.repo.list(&by_category, &ListParams::default(), now).await.unwrap();
        assert_eq!(listed, vec![a]);

        let by_tag = PostFilter {
            tag_name: Some("fete".into()),
            ..PostFilter::published("news")
        };
        let listed = f.repo.list(&by_tag, &ListParams::default(), now).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, b.id);
    }

    #[tokio::test]
    async fn test_paging_and_order() {
        let f = setup().await;
        let now = Utc::now();
        for i in 0..5 {
            published(&f, &format!("Post {}", i), &format!("post-{}", i), now - Duration::hours(10 - i)).await;
        }
        let filter = PostFilter::published("news");
        let first = f.repo.list(&filter, &ListParams::new(1, 2), now).await.unwrap();
        assert_eq!(first.iter().map(|p| p.code.as_str()).collect::<Vec<_>>(), vec!["post-4", "post-3"]);
        let last = f.repo.list(&filter, &ListParams::new(3, 2), now).await.unwrap();
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].code, "post-0");
    }

    #[tokio::test]
    async fn test_adjacent_posts() {
        let f = setup().await;
        let now = Utc::now();
        let older = published(&f, "Older", "older", now - Duration::days(3)).await;
        let middle = published(&f, "Middle", "middle", now - Duration::days(2)).await;
        let newer = published(&f, "Newer", "newer", now - Duration::days(1)).await;
        published(&f, "Scheduled", "scheduled", now + Duration::days(1)).await;

        let next = f.repo.adjacent(&middle, Adjacent::Next, false, now).await.unwrap();
        assert_eq!(next.map(|p| p.id), Some(newer.id));
        let prev = f.repo.adjacent(&middle, Adjacent::Previous, false, now).await.unwrap();
        assert_eq!(prev.map(|p| p.id), Some(older.id));

        assert!(f.repo.adjacent(&newer, Adjacent::Next, false, now).await.unwrap().is_none());
        let with_scheduled = f.repo.adjacent(&newer, Adjacent::Next, true, now).await.unwrap();
        assert_eq!(with_scheduled.map(|p| p.code), Some("scheduled".to_string()));
    }

    #[tokio::test]
    async fn test_title_and_code_checks() {
        let f = setup().await;
        let post = f.repo.save_with_revision(&draft("Summer Fete", "summer-fete"), 1, None).await.unwrap();

        assert!(f.repo.title_in_use("news", "summer FETE", None).await.unwrap());
        assert!(!f.repo.title_in_use("news", "summer fete", Some(post.id)).await.unwrap());
        assert!(!f.repo.title_in_use("letter", "Summer Fete", None).await.unwrap());
        assert!(f.repo.code_in_use("news", "summer-fete", None).await.unwrap());
        assert!(!f.repo.code_in_use("news", "summer-fete", Some(post.id)).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_removes_dependents() {
        let f = setup().await;
        let post = published(&f, "Doomed", "doomed", Utc::now() - Duration::days(1)).await;
        let tags = SqlxTagRepository::new(f.pool.clone(), f.tables.clone());
        let tag = tags.create("news", "x", "x").await.unwrap();
        tags.attach(post.id, tag.id).await.unwrap();
        f.pool
            .execute(&format!(
                "INSERT INTO cms_comment (id, post_id, timestamp, approved, content, deleted) \
                 VALUES (1, {id}, '2024-01-01T00:00:00+00:00', 1, 'a', 0)",
                id = post.id
            ))
            .await
            .unwrap();
        f.pool
            .execute(&format!(
                "INSERT INTO cms_comment (id, post_id, timestamp, approved, content, deleted, reply_to_id) \
                 VALUES (2, {id}, '2024-01-01T00:00:00+00:00', 1, 'b', 0, 1)",
                id = post.id
            ))
            .await
            .unwrap();

        f.repo.delete_with_dependents(post.id).await.unwrap();

        assert!(f.repo.get_by_id(post.id).await.unwrap().is_none());
        assert!(f.repo.list_revisions(post.id).await.unwrap().is_empty());
        assert_eq!(tags.count_posts(tag.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_latest_revision_timestamp() {
        let f = setup().await;
        let now = Utc::now();
        assert!(f.repo.latest_revision_timestamp(now).await.unwrap().is_none());

        f.repo.save_with_revision(&draft("Draft", "draft"), 1, None).await.unwrap();
        assert!(f.repo.latest_revision_timestamp(now).await.unwrap().is_none());

        published(&f, "Live", "live", now - Duration::days(1)).await;
        assert!(f.repo.latest_revision_timestamp(Utc::now()).await.unwrap().is_some());
    }
}
