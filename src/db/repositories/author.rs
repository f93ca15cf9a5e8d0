//! Author repository
//!
//! Authors are the public bylines of posts, pages and editor comments. Every
//! CMS user owns exactly one author.

use crate::db::{Backend, DynDatabasePool, Tables};
use crate::models::Author;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait AuthorRepository: Send + Sync {
    async fn create(&self, name: &str, code: &str) -> Result<Author>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Author>>;

    async fn get_by_code(&self, code: &str) -> Result<Option<Author>>;

    async fn get_by_name(&self, name: &str) -> Result<Option<Author>>;

    /// All authors ordered by name
    async fn list(&self) -> Result<Vec<Author>>;

    async fn update(&self, id: i64, name: &str, code: &str) -> Result<Author>;

    async fn delete(&self, id: i64) -> Result<()>;

    /// Whether another author already uses `name` or `code`
    async fn name_or_code_in_use(&self, name: &str, code: &str, exclude_id: Option<i64>) -> Result<bool>;

    /// Rows in users, posts, pages, published pages and comments pointing at this author
    async fn count_references(&self, id: i64) -> Result<i64>;
}

pub struct SqlxAuthorRepository {
    pool: DynDatabasePool,
    tables: Arc<Tables>,
}

impl SqlxAuthorRepository {
    pub fn new(pool: DynDatabasePool, tables: Arc<Tables>) -> Self {
        Self { pool, tables }
    }

    pub fn boxed(pool: DynDatabasePool, tables: Arc<Tables>) -> Arc<dyn AuthorRepository> {
        Arc::new(Self::new(pool, tables))
    }

    async fn fetch_one_by(&self, column: &str, value: &str) -> Result<Option<Author>> {
        let sql = format!("SELECT id, name, code FROM {} WHERE {} = ?", self.tables.author, column);
        let author = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query_as::<_, Author>(&sql).bind(value).fetch_optional(p).await,
            Backend::Mysql(p) => sqlx::query_as::<_, Author>(&sql).bind(value).fetch_optional(p).await,
        }
        .with_context(|| format!("Failed to get author by {}", column))?;
        Ok(author)
    }
}

#[async_trait]
impl AuthorRepository for SqlxAuthorRepository {
    async fn create(&self, name: &str, code: &str) -> Result<Author> {
        let sql = format!("INSERT INTO {} (name, code) VALUES (?, ?)", self.tables.author);
        let id = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(&sql)
                .bind(name)
                .bind(code)
                .execute(p)
                .await
                .context("Failed to create author")?
                .last_insert_rowid(),
            Backend::Mysql(p) => sqlx::query(&sql)
                .bind(name)
                .bind(code)
                .execute(p)
                .await
                .context("Failed to create author")?
                .last_insert_id() as i64,
        };

        Ok(Author {
            id,
            name: name.to_string(),
            code: code.to_string(),
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Author>> {
        let sql = format!("SELECT id, name, code FROM {} WHERE id = ?", self.tables.author);
        let author = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query_as::<_, Author>(&sql).bind(id).fetch_optional(p).await,
            Backend::Mysql(p) => sqlx::query_as::<_, Author>(&sql).bind(id).fetch_optional(p).await,
        }
        .context("Failed to get author by id")?;
        Ok(author)
    }

    async fn get_by_code(&self, code: &str) -> Result<Option<Author>> {
        self.fetch_one_by("code", code).await
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Author>> {
        self.fetch_one_by("name", name).await
    }

    async fn list(&self) -> Result<Vec<Author>> {
        let sql = format!("SELECT id, name, code FROM {} ORDER BY name", self.tables.author);
        let authors = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query_as::<_, Author>(&sql).fetch_all(p).await,
            Backend::Mysql(p) => sqlx::query_as::<_, Author>(&sql).fetch_all(p).await,
        }
        .context("Failed to list authors")?;
        Ok(authors)
    }

    async fn update(&self, id: i64, name: &str, code: &str) -> Result<Author> {
        let sql = format!("UPDATE {} SET name = ?, code = ? WHERE id = ?", self.tables.author);
        match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(&sql).bind(name).bind(code).bind(id).execute(p).await.map(|_| ()),
            Backend::Mysql(p) => sqlx::query(&sql).bind(name).bind(code).bind(id).execute(p).await.map(|_| ()),
        }
        .context("Failed to update author")?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Author not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE id = ?", self.tables.author);
        match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(&sql).bind(id).execute(p).await.map(|_| ()),
            Backend::Mysql(p) => sqlx::query(&sql).bind(id).execute(p).await.map(|_| ()),
        }
        .context("Failed to delete author")?;
        Ok(())
    }

    async fn name_or_code_in_use(&self, name: &str, code: &str, exclude_id: Option<i64>) -> Result<bool> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE (name = ? OR code = ?) AND id <> ?",
            self.tables.author
        );
        let exclude = exclude_id.unwrap_or(0);
        let count: i64 = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query_scalar(&sql).bind(name).bind(code).bind(exclude).fetch_one(p).await,
            Backend::Mysql(p) => sqlx::query_scalar(&sql).bind(name).bind(code).bind(exclude).fetch_one(p).await,
        }
        .context("Failed to check author name")?;
        Ok(count > 0)
    }

    async fn count_references(&self, id: i64) -> Result<i64> {
        let t = &self.tables;
        let sql = format!(
            "SELECT (SELECT COUNT(*) FROM {user} WHERE author_id = ?) \
             + (SELECT COUNT(*) FROM {post} WHERE author_id = ?) \
             + (SELECT COUNT(*) FROM {page} WHERE author_id = ?) \
             + (SELECT COUNT(*) FROM {published} WHERE published_by_id = ?) \
             + (SELECT COUNT(*) FROM {comment} WHERE author_id = ? OR edited_by_id = ?)",
            user = t.user,
            post = t.post,
            page = t.page,
            published = t.published_page,
            comment = t.comment
        );
        let count: i64 = match self.pool.backend() {
            Backend::Sqlite(p) => {
                sqlx::query_scalar(&sql)
                    .bind(id)
                    .bind(id)
                    .bind(id)
                    .bind(id)
                    .bind(id)
                    .bind(id)
                    .fetch_one(p)
                    .await
            }
            Backend::Mysql(p) => {
                sqlx::query_scalar(&sql)
                    .bind(id)
                    .bind(id)
                    .bind(id)
                    .bind(id)
                    .bind(id)
                    .bind(id)
                    .fetch_one(p)
                    .await
            }
        }
        .context("Failed to count author references")?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_database;

    async fn setup_test_repo() -> SqlxAuthorRepository {
        let (pool, tables) = test_database().await;
        SqlxAuthorRepository::new(pool, tables)
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let repo = setup_test_repo().await;
        let created = repo.create("Jane Doe", "jane-doe").await.unwrap();
        assert!(created.id > 0);

        assert_eq!(repo.get_by_id(created.id).await.unwrap(), Some(created.clone()));
        assert_eq!(repo.get_by_code("jane-doe").await.unwrap(), Some(created.clone()));
        assert_eq!(repo.get_by_name("Jane Doe").await.unwrap(), Some(created));
        assert!(repo.get_by_code("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_name_is_rejected() {
        let repo = setup_test_repo().await;
        repo.create("Jane Doe", "jane-doe").await.unwrap();
        assert!(repo.create("Jane Doe", "jane-2").await.is_err());
    }

    #[tokio::test]
    async fn test_name_or_code_in_use() {
        let repo = setup_test_repo().await;
        let jane = repo.create("Jane Doe", "jane-doe").await.unwrap();

        assert!(repo.name_or_code_in_use("Other", "jane-doe", None).await.unwrap());
        assert!(repo.name_or_code_in_use("Jane Doe", "other", None).await.unwrap());
        assert!(!repo.name_or_code_in_use("Jane Doe", "jane-doe", Some(jane.id)).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_list_delete() {
        let repo = setup_test_repo().await;
        let b = repo.create("Bob", "bob").await.unwrap();
        repo.create("Alice", "alice").await.unwrap();

        let renamed = repo.update(b.id, "Zed", "zed").await.unwrap();
        assert_eq!(renamed.code, "zed");

        let names: Vec<String> = repo.list().await.unwrap().into_iter().map(|a| a.name).collect();
        assert_eq!(names, vec!["Alice", "Zed"]);

        assert_eq!(repo.count_references(b.id).await.unwrap(), 0);
        repo.delete(b.id).await.unwrap();
        assert!(repo.get_by_id(b.id).await.unwrap().is_none());
    }
}
