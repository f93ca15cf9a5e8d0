//! Comment repository
//!
//! Comments are soft deleted through the `deleted` flag; rows only go away
//! together with their post.

use crate::db::{Backend, DynDatabasePool, Tables};
use crate::models::{Comment, ListParams};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

const COMMENT_COLUMNS: &str = "id, post_id, author_name, author_email, author_ip, author_user_agent, \
     author_id, author_user_id, edited_by_id, edited_by_user_id, timestamp, approved, content, \
     original_content, edit_timestamp, deleted, reply_to_id";

/// Bind every comment column except `id`, in table order
macro_rules! bind_comment {
    ($query:expr, $c:expr) => {
        $query
            .bind($c.post_id)
            .bind(&$c.author_name)
            .bind(&$c.author_email)
            .bind(&$c.author_ip)
            .bind(&$c.author_user_agent)
            .bind($c.author_id)
            .bind($c.author_user_id)
            .bind($c.edited_by_id)
            .bind($c.edited_by_user_id)
            .bind($c.timestamp)
            .bind($c.approved)
            .bind(&$c.content)
            .bind(&$c.original_content)
            .bind($c.edit_timestamp)
            .bind($c.deleted)
            .bind($c.reply_to_id)
    };
}

#[async_trait]
pub trait CommentRepository: Send + Sync {
    /// Insert `comment`, ignoring its `id`
    async fn create(&self, comment: &Comment) -> Result<Comment>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>>;

    /// Every comment on a post, oldest first
    async fn list_for_post(&self, post_id: i64) -> Result<Vec<Comment>>;

    /// Newest first; `pending_only` keeps comments awaiting approval
    async fn list(&self, pending_only: bool, params: &ListParams) -> Result<Vec<Comment>>;

    async fn count(&self, pending_only: bool) -> Result<i64>;

    async fn update(&self, comment: &Comment) -> Result<Comment>;

    /// Time of the newest comment from `ip` on a post
    async fn last_from_ip(&self, post_id: i64, ip: &str) -> Result<Option<DateTime<Utc>>>;

    /// Approved comments that are not deleted
    async fn count_approved_for_post(&self, post_id: i64) -> Result<i64>;
}

pub struct SqlxCommentRepository {
    pool: DynDatabasePool,
    tables: Arc<Tables>,
}

impl SqlxCommentRepository {
    pub fn new(pool: DynDatabasePool, tables: Arc<Tables>) -> Self {
        Self { pool, tables }
    }

    pub fn boxed(pool: DynDatabasePool, tables: Arc<Tables>) -> Arc<dyn CommentRepository> {
        Arc::new(Self::new(pool, tables))
    }

    fn select(&self) -> String {
        format!("SELECT {} FROM {}", COMMENT_COLUMNS, self.tables.comment)
    }
}

fn pending_clause(pending_only: bool) -> &'static str {
    if pending_only {
        "WHERE approved = 0 AND deleted = 0"
    } else {
        ""
    }
}

#[async_trait]
impl CommentRepository for SqlxCommentRepository {
    async fn create(&self, comment: &Comment) -> Result<Comment> {
        let sql = format!(
            "INSERT INTO {} (post_id, author_name, author_email, author_ip, author_user_agent, author_id, \
             author_user_id, edited_by_id, edited_by_user_id, timestamp, approved, content, original_content, \
             edit_timestamp, deleted, reply_to_id) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.tables.comment
        );
        let id = match self.pool.backend() {
            Backend::Sqlite(p) => bind_comment!(sqlx::query(&sql), comment)
                .execute(p)
                .await
                .context("Failed to create comment")?
                .last_insert_rowid(),
            Backend::Mysql(p) => bind_comment!(sqlx::query(&sql), comment)
                .execute(p)
                .await
                .context("Failed to create comment")?
                .last_insert_id() as i64,
        };

        Ok(Comment { id, ..comment.clone() })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>> {
        let sql = format!("{} WHERE id = ?", self.select());
        let comment = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query_as::<_, Comment>(&sql).bind(id).fetch_optional(p).await,
            Backend::Mysql(p) => sqlx::query_as::<_, Comment>(&sql).bind(id).fetch_optional(p).await,
        }
        .context("Failed to get comment by id")?;
        Ok(comment)
    }

    async fn list_for_post(&self, post_id: i64) -> Result<Vec<Comment>> {
        let sql = format!("{} WHERE post_id = ? ORDER BY timestamp, id", self.select());
        let comments = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query_as::<_, Comment>(&sql).bind(post_id).fetch_all(p).await,
            Backend::Mysql(p) => sqlx::query_as::<_, Comment>(&sql).bind(post_id).fetch_all(p).await,
        }
        .context("Failed to list comments for post")?;
        Ok(comments)
    }

    async fn list(&self, pending_only: bool, params: &ListParams) -> Result<Vec<Comment>> {
        let sql = format!(
            "{} {} ORDER BY timestamp DESC, id DESC LIMIT ? OFFSET ?",
            self.select(),
            pending_clause(pending_only)
        );
        let comments = match self.pool.backend() {
            Backend::Sqlite(p) => {
                sqlx::query_as::<_, Comment>(&sql)
                    .bind(params.limit())
                    .bind(params.offset())
                    .fetch_all(p)
                    .await
            }
            Backend::Mysql(p) => {
                sqlx::query_as::<_, Comment>(&sql)
                    .bind(params.limit())
                    .bind(params.offset())
                    .fetch_all(p)
                    .await
            }
        }
        .context("Failed to list comments")?;
        Ok(comments)
    }

    async fn count(&self, pending_only: bool) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} {}",
            self.tables.comment,
            pending_clause(pending_only)
        );
        let count: i64 = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query_scalar(&sql).fetch_one(p).await,
            Backend::Mysql(p) => sqlx::query_scalar(&sql).fetch_one(p).await,
        }
        .context("Failed to count comments")?;
        Ok(count)
    }

    async fn update(&self, comment: &Comment) -> Result<Comment> {
        let sql = format!(
            "UPDATE {} SET post_id = ?, author_name = ?, author_email = ?, author_ip = ?, author_user_agent = ?, \
             author_id = ?, author_user_id = ?, edited_by_id = ?, edited_by_user_id = ?, timestamp = ?, \
             approved = ?, content = ?, original_content = ?, edit_timestamp = ?, deleted = ?, reply_to_id = ? \
             WHERE id = ?",
            self.tables.comment
        );
        match self.pool.backend() {
            Backend::Sqlite(p) => bind_comment!(sqlx::query(&sql), comment)
                .bind(comment.id)
                .execute(p)
                .await
                .map(|_| ()),
            Backend::Mysql(p) => bind_comment!(sqlx::query(&sql), comment)
                .bind(comment.id)
                .execute(p)
                .await
                .map(|_| ()),
        }
        .context("Failed to update comment")?;

        self.get_by_id(comment.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Comment not found after update"))
    }

    async fn last_from_ip(&self, post_id: i64, ip: &str) -> Result<Option<DateTime<Utc>>> {
        let sql = format!(
            "SELECT timestamp FROM {} WHERE post_id = ? AND author_ip = ? ORDER BY timestamp DESC LIMIT 1",
            self.tables.comment
        );
        let last: Option<DateTime<Utc>> = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query_scalar(&sql).bind(post_id).bind(ip).fetch_optional(p).await,
            Backend::Mysql(p) => sqlx::query_scalar(&sql).bind(post_id).bind(ip).fetch_optional(p).await,
        }
        .context("Failed to get last comment time")?;
        Ok(last)
    }

    async fn count_approved_for_post(&self, post_id: i64) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE post_id = ? AND approved = 1 AND deleted = 0",
            self.tables.comment
        );
        let count: i64 = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query_scalar(&sql).bind(post_id).fetch_one(p).await,
            Backend::Mysql(p) => sqlx::query_scalar(&sql).bind(post_id).fetch_one(p).await,
        }
        .context("Failed to count approved comments")?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_database;
    use chrono::{Duration, TimeZone};

    async fn setup() -> SqlxCommentRepository {
        let (pool, tables) = test_database().await;
        for sql in [
            "INSERT INTO cms_author (id, name, code) VALUES (1, 'Ann', 'ann')",
            "INSERT INTO cms_category (id, post_type, name, code) VALUES (1, 'post', 'News', 'news')",
            "INSERT INTO cms_post (id, post_type, created, category_id, title, code, tagline, content, author_id) \
             VALUES (1, 'post', '2024-01-01T00:00:00+00:00', 1, 'Hello', 'hello', 'Hi', '', 1)",
        ] {
            pool.execute(sql).await.unwrap();
        }
        SqlxCommentRepository::new(pool, tables)
    }

    fn visitor_comment(at: DateTime<Utc>, approved: bool) -> Comment {
        Comment {
            id: 0,
            post_id: 1,
            author_name: Some("Bob".into()),
            author_email: Some("bob@example.com".into()),
            author_ip: Some("10.0.0.1".into()),
            author_user_agent: Some("test".into()),
            author_id: None,
            author_user_id: None,
            edited_by_id: None,
            edited_by_user_id: None,
            timestamp: at,
            approved,
            content: "<p>Nice</p>".into(),
            original_content: None,
            edit_timestamp: None,
            deleted: false,
            reply_to_id: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_list_for_post() {
        let repo = setup().await;
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let later = repo.create(&visitor_comment(base + Duration::minutes(5), true)).await.unwrap();
        let first = repo.create(&visitor_comment(base, false)).await.unwrap();

        let listed = repo.list_for_post(1).await.unwrap();
        assert_eq!(listed, vec![first.clone(), later]);
        assert_eq!(repo.get_by_id(first.id).await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn test_pending_listing() {
        let repo = setup().await;
        let now = Utc::now();
        repo.create(&visitor_comment(now, true)).await.unwrap();
        let pending = repo.create(&visitor_comment(now, false)).await.unwrap();
        let mut deleted = visitor_comment(now, false);
        deleted.deleted = true;
        repo.create(&deleted).await.unwrap();

        assert_eq!(repo.count(false).await.unwrap(), 3);
        assert_eq!(repo.count(true).await.unwrap(), 1);
        assert_eq!(repo.list(true, &ListParams::default()).await.unwrap(), vec![pending]);
    }

    #[tokio::test]
    async fn test_update_and_approved_count() {
        let repo = setup().await;
        let comment = repo.create(&visitor_comment(Utc::now(), false)).await.unwrap();
        assert_eq!(repo.count_approved_for_post(1).await.unwrap(), 0);

        let approved = repo
            .update(&Comment {
                approved: true,
                ..comment.clone()
            })
            .await
            .unwrap();
        assert!(approved.approved);
        assert_eq!(repo.count_approved_for_post(1).await.unwrap(), 1);

        repo.update(&Comment {
            deleted: true,
            ..approved
        })
        .await
        .unwrap();
        assert_eq!(repo.count_approved_for_post(1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_last_from_ip() {
        let repo = setup().await;
        assert!(repo.last_from_ip(1, "10.0.0.1").await.unwrap().is_none());

        let at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        repo.create(&visitor_comment(at, false)).await.unwrap();
        repo.create(&visitor_comment(at - Duration::hours(1), false)).await.unwrap();

        assert_eq!(repo.last_from_ip(1, "10.0.0.1").await.unwrap(), Some(at));
        assert!(repo.last_from_ip(1, "10.0.0.2").await.unwrap().is_none());
    }
}
