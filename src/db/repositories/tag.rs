//! Tag repository
//!
//! Tags belong to a post type and are linked to posts through the
//! `{p}_post_{p}_tag` association table.

use crate::db::{Backend, DynDatabasePool, Tables};
use crate::models::Tag;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait TagRepository: Send + Sync {
    async fn create(&self, post_type: &str, name: &str, code: &str) -> Result<Tag>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Tag>>;

    async fn get_by_code(&self, post_type: &str, code: &str) -> Result<Option<Tag>>;

    async fn get_by_name(&self, post_type: &str, name: &str) -> Result<Option<Tag>>;

    /// Tags ordered by name, optionally limited to one post type
    async fn list(&self, post_type: Option<&str>) -> Result<Vec<Tag>>;

    /// Tags attached to a post, ordered by name
    async fn list_for_post(&self, post_id: i64) -> Result<Vec<Tag>>;

    /// Link a tag to a post; linking twice is a no-op
    async fn attach(&self, post_id: i64, tag_id: i64) -> Result<()>;

    async fn detach(&self, post_id: i64, tag_id: i64) -> Result<()>;

    async fn count_posts(&self, tag_id: i64) -> Result<i64>;

    async fn delete(&self, id: i64) -> Result<()>;
}

pub struct SqlxTagRepository {
    pool: DynDatabasePool,
    tables: Arc<Tables>,
}

impl SqlxTagRepository {
    pub fn new(pool: DynDatabasePool, tables: Arc<Tables>) -> Self {
        Self { pool, tables }
    }

    pub fn boxed(pool: DynDatabasePool, tables: Arc<Tables>) -> Arc<dyn TagRepository> {
        Arc::new(Self::new(pool, tables))
    }

    fn select(&self) -> String {
        format!(
            "SELECT id, post_type, name, code, tag_type, external_code FROM {}",
            self.tables.tag
        )
    }

    async fn fetch_one_by(&self, post_type: &str, column: &str, value: &str) -> Result<Option<Tag>> {
        let sql = format!("{} WHERE post_type = ? AND {} = ?", self.select(), column);
        let tag = match self.pool.backend() {
            Backend::Sqlite(p) => {
                sqlx::query_as::<_, Tag>(&sql)
                    .bind(post_type)
                    .bind(value)
                    .fetch_optional(p)
                    .await
            }
            Backend::Mysql(p) => {
                sqlx::query_as::<_, Tag>(&sql)
                    .bind(post_type)
                    .bind(value)
                    .fetch_optional(p)
                    .await
            }
        }
        .with_context(|| format!("Failed to get tag by {}", column))?;
        Ok(tag)
    }
}

#[async_trait]
impl TagRepository for SqlxTagRepository {
    async fn create(&self, post_type: &str, name: &str, code: &str) -> Result<Tag> {
        let sql = format!("INSERT INTO {} (post_type, name, code) VALUES (?, ?, ?)", self.tables.tag);
        let id = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(&sql)
                .bind(post_type)
                .bind(name)
                .bind(code)
                .execute(p)
                .await
                .context("Failed to create tag")?
                .last_insert_rowid(),
            Backend::Mysql(p) => sqlx::query(&sql)
                .bind(post_type)
                .bind(name)
                .bind(code)
                .execute(p)
                .await
                .context("Failed to create tag")?
                .last_insert_id() as i64,
        };

        Ok(Tag {
            id,
            post_type: post_type.to_string(),
            name: name.to_string(),
            code: code.to_string(),
            tag_type: None,
            external_code: None,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Tag>> {
        let sql = format!("{} WHERE id = ?", self.select());
        let tag = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query_as::<_, Tag>(&sql).bind(id).fetch_optional(p).await,
            Backend::Mysql(p) => sqlx::query_as::<_, Tag>(&sql).bind(id).fetch_optional(p).await,
        }
        .context("Failed to get tag by id")?;
        Ok(tag)
    }

    async fn get_by_code(&self, post_type: &str, code: &str) -> Result<Option<Tag>> {
        self.fetch_one_by(post_type, "code", code).await
    }

    async fn get_by_name(&self, post_type: &str, name: &str) -> Result<Option<Tag>> {
        self.fetch_one_by(post_type, "name", name).await
    }

    async fn list(&self, post_type: Option<&str>) -> Result<Vec<Tag>> {
        let sql = format!("{} WHERE (? IS NULL OR post_type = ?) ORDER BY name", self.select());
        let tags = match self.pool.backend() {
            Backend::Sqlite(p) => {
                sqlx::query_as::<_, Tag>(&sql)
                    .bind(post_type)
                    .bind(post_type)
                    .fetch_all(p)
                    .await
            }
            Backend::Mysql(p) => {
                sqlx::query_as::<_, Tag>(&sql)
                    .bind(post_type)
                    .bind(post_type)
                    .fetch_all(p)
                    .await
            }
        }
        .context("Failed to list tags")?;
        Ok(tags)
    }

    async fn list_for_post(&self, post_id: i64) -> Result<Vec<Tag>> {
        let sql = format!(
            "SELECT t.id, t.post_type, t.name, t.code, t.tag_type, t.external_code \
             FROM {tag} t JOIN {link} pt ON pt.tag_id = t.id \
             WHERE pt.post_id = ? ORDER BY t.name",
            tag = self.tables.tag,
            link = self.tables.post_tag
        );
        let tags = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query_as::<_, Tag>(&sql).bind(post_id).fetch_all(p).await,
            Backend::Mysql(p) => sqlx::query_as::<_, Tag>(&sql).bind(post_id).fetch_all(p).await,
        }
        .context("Failed to list tags for post")?;
        Ok(tags)
    }

    async fn attach(&self, post_id: i64, tag_id: i64) -> Result<()> {
        match self.pool.backend() {
            Backend::Sqlite(p) => {
                let sql = format!(
                    "INSERT OR IGNORE INTO {} (post_id, tag_id) VALUES (?, ?)",
                    self.tables.post_tag
                );
                sqlx::query(&sql).bind(post_id).bind(tag_id).execute(p).await.map(|_| ())
            }
            Backend::Mysql(p) => {
                let sql = format!(
                    "INSERT IGNORE INTO {} (post_id, tag_id) VALUES (?, ?)",
                    self.tables.post_tag
                );
                sqlx::query(&sql).bind(post_id).bind(tag_id).execute(p).await.map(|_| ())
            }
        }
        .context("Failed to add tag to post")?;
        Ok(())
    }

    async fn detach(&self, post_id: i64, tag_id: i64) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE post_id = ? AND tag_id = ?", self.tables.post_tag);
        match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(&sql).bind(post_id).bind(tag_id).execute(p).await.map(|_| ()),
            Backend::Mysql(p) => sqlx::query(&sql).bind(post_id).bind(tag_id).execute(p).await.map(|_| ()),
        }
        .context("Failed to remove tag from post")?;
        Ok(())
    }

    async fn count_posts(&self, tag_id: i64) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE tag_id = ?", self.tables.post_tag);
        let count: i64 = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query_scalar(&sql).bind(tag_id).fetch_one(p).await,
            Backend::Mysql(p) => sqlx::query_scalar(&sql).bind(tag_id).fetch_one(p).await,
        }
        .context("Failed to count posts for tag")?;
        Ok(count)
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE id = ?", self.tables.tag);
        match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(&sql).bind(id).execute(p).await.map(|_| ()),
            Backend::Mysql(p) => sqlx::query(&sql).bind(id).execute(p).await.map(|_| ()),
        }
        .context("Failed to delete tag")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_database;

    async fn setup() -> (DynDatabasePool, SqlxTagRepository, i64) {
        let (pool, tables) = test_database().await;
        pool.execute("INSERT INTO cms_author (id, name, code) VALUES (1, 'Ann', 'ann')")
            .await
            .unwrap();
        pool.execute("INSERT INTO cms_category (id, post_type, name, code) VALUES (1, 'post', 'News', 'news')")
            .await
            .unwrap();
        pool.execute(
            "INSERT INTO cms_post (id, post_type, created, category_id, title, code, tagline, content, author_id) \
             VALUES (1, 'post', '2024-01-01T00:00:00+00:00', 1, 'Hello', 'hello', 'Hi', '', 1)",
        )
        .await
        .unwrap();
        (pool.clone(), SqlxTagRepository::new(pool, tables), 1)
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let (_pool, repo, _) = setup().await;
        let tag = repo.create("post", "Garden Party", "garden-party").await.unwrap();

        assert_eq!(repo.get_by_code("post", "garden-party").await.unwrap(), Some(tag.clone()));
        assert_eq!(repo.get_by_name("post", "Garden Party").await.unwrap(), Some(tag.clone()));
        assert!(repo.get_by_code("news", "garden-party").await.unwrap().is_none());
        assert_eq!(repo.get_by_id(tag.id).await.unwrap(), Some(tag));
    }

    #[tokio::test]
    async fn test_attach_is_idempotent() {
        let (_pool, repo, post_id) = setup().await;
        let tag = repo.create("post", "fete", "fete").await.unwrap();

        repo.attach(post_id, tag.id).await.unwrap();
        repo.attach(post_id, tag.id).await.unwrap();
        assert_eq!(repo.count_posts(tag.id).await.unwrap(), 1);
        assert_eq!(repo.list_for_post(post_id).await.unwrap(), vec![tag.clone()]);

        repo.detach(post_id, tag.id).await.unwrap();
        assert_eq!(repo.count_posts(tag.id).await.unwrap(), 0);
        assert!(repo.list_for_post(post_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_by_post_type() {
        let (_pool, repo, _) = setup().await;
        repo.create("post", "zebra", "zebra").await.unwrap();
        repo.create("post", "apple", "apple").await.unwrap();
        repo.create("letter", "mango", "mango").await.unwrap();

        let all: Vec<String> = repo.list(None).await.unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(all, vec!["apple", "mango", "zebra"]);
        assert_eq!(repo.list(Some("post")).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_delete() {
        let (_pool, repo, _) = setup().await;
        let tag = repo.create("post", "gone", "gone").await.unwrap();
        repo.delete(tag.id).await.unwrap();
        assert!(repo.get_by_id(tag.id).await.unwrap().is_none());
    }
}
