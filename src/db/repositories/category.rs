//! Category repository
//!
//! Categories are scoped to a post type: `(post_type, name)` and
//! `(post_type, code)` are each unique.

use crate::db::{Backend, DynDatabasePool, Tables};
use crate::models::Category;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait CategoryRepository: Send + Sync {
    async fn create(&self, post_type: &str, name: &str, code: &str) -> Result<Category>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>>;

    async fn get_by_code(&self, post_type: &str, code: &str) -> Result<Option<Category>>;

    /// All categories ordered by name, then post type
    async fn list(&self) -> Result<Vec<Category>>;

    async fn list_for_post_type(&self, post_type: &str) -> Result<Vec<Category>>;

    async fn count_for_post_type(&self, post_type: &str) -> Result<i64>;

    async fn update(&self, id: i64, name: &str, code: &str) -> Result<Category>;

    async fn delete(&self, id: i64) -> Result<()>;

    /// Whether another category of `post_type` already has `name` or `code`
    async fn name_or_code_in_use(
        &self,
        post_type: &str,
        name: &str,
        code: &str,
        exclude_id: Option<i64>,
    ) -> Result<bool>;

    /// Number of posts in the category
    async fn count_posts(&self, id: i64) -> Result<i64>;
}

pub struct SqlxCategoryRepository {
    pool: DynDatabasePool,
    tables: Arc<Tables>,
}

impl SqlxCategoryRepository {
    pub fn new(pool: DynDatabasePool, tables: Arc<Tables>) -> Self {
        Self { pool, tables }
    }

    pub fn boxed(pool: DynDatabasePool, tables: Arc<Tables>) -> Arc<dyn CategoryRepository> {
        Arc::new(Self::new(pool, tables))
    }

    fn select(&self) -> String {
        format!("SELECT id, post_type, name, code FROM {}", self.tables.category)
    }
}

#[async_trait]
impl CategoryRepository for SqlxCategoryRepository {
    async fn create(&self, post_type: &str, name: &str, code: &str) -> Result<Category> {
        let sql = format!(
            "INSERT INTO {} (post_type, name, code) VALUES (?, ?, ?)",
            self.tables.category
        );
        let id = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(&sql)
                .bind(post_type)
                .bind(name)
                .bind(code)
                .execute(p)
                .await
                .context("Failed to create category")?
                .last_insert_rowid(),
            Backend::Mysql(p) => sqlx::query(&sql)
                .bind(post_type)
                .bind(name)
                .bind(code)
                .execute(p)
                .await
                .context("Failed to create category")?
                .last_insert_id() as i64,
        };

        Ok(Category {
            id,
            post_type: post_type.to_string(),
            name: name.to_string(),
            code: code.to_string(),
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>> {
        let sql = format!("{} WHERE id = ?", self.select());
        let category = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query_as::<_, Category>(&sql).bind(id).fetch_optional(p).await,
            Backend::Mysql(p) => sqlx::query_as::<_, Category>(&sql).bind(id).fetch_optional(p).await,
        }
        .context("Failed to get category by id")?;
        Ok(category)
    }

    async fn get_by_code(&self, post_type: &str, code: &str) -> Result<Option<Category>> {
        let sql = format!("{} WHERE post_type = ? AND code = ?", self.select());
        let category = match self.pool.backend() {
            Backend::Sqlite(p) => {
                sqlx::query_as::<_, Category>(&sql)
                    .bind(post_type)
                    .bind(code)
                    .fetch_optional(p)
                    .await
            }
            Backend::Mysql(p) => {
                sqlx::query_as::<_, Category>(&sql)
                    .bind(post_type)
                    .bind(code)
                    .fetch_optional(p)
                    .await
            }
        }
        .context("Failed to get category by code")?;
        Ok(category)
    }

    async fn list(&self) -> Result<Vec<Category>> {
        let sql = format!("{} ORDER BY name, post_type", self.select());
        let categories = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query_as::<_, Category>(&sql).fetch_all(p).await,
            Backend::Mysql(p) => sqlx::query_as::<_, Category>(&sql).fetch_all(p).await,
        }
        .context("Failed to list categories")?;
        Ok(categories)
    }

    async fn list_for_post_type(&self, post_type: &str) -> Result<Vec<Category>> {
        let sql = format!("{} WHERE post_type = ? ORDER BY name", self.select());
        let categories = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query_as::<_, Category>(&sql).bind(post_type).fetch_all(p).await,
            Backend::Mysql(p) => sqlx::query_as::<_, Category>(&sql).bind(post_type).fetch_all(p).await,
        }
        .context("Failed to list categories for post type")?;
        Ok(categories)
    }

    async fn count_for_post_type(&self, post_type: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE post_type = ?", self.tables.category);
        let count: i64 = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query_scalar(&sql).bind(post_type).fetch_one(p).await,
            Backend::Mysql(p) => sqlx::query_scalar(&sql).bind(post_type).fetch_one(p).await,
        }
        .context("Failed to count categories")?;
        Ok(count)
    }

    async fn update(&self, id: i64, name: &str, code: &str) -> Result<Category> {
        let sql = format!("UPDATE {} SET name = ?, code = ? WHERE id = ?", self.tables.category);
        match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(&sql).bind(name).bind(code).bind(id).execute(p).await.map(|_| ()),
            Backend::Mysql(p) => sqlx::query(&sql).bind(name).bind(code).bind(id).execute(p).await.map(|_| ()),
        }
        .context("Failed to update category")?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Category not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE id = ?", self.tables.category);
        match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(&sql).bind(id).execute(p).await.map(|_| ()),
            Backend::Mysql(p) => sqlx::query(&sql).bind(id).execute(p).await.map(|_| ()),
        }
        .context("Failed to delete category")?;
        Ok(())
    }

    async fn name_or_code_in_use(
        &self,
        post_type: &str,
        name: &str,
        code: &str,
        exclude_id: Option<i64>,
    ) -> Result<bool> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE post_type = ? AND (name = ? OR code = ?) AND id <> ?",
            self.tables.category
        );
        let exclude = exclude_id.unwrap_or(0);
        let count: i64 = match self.pool.backend() {
            Backend::Sqlite(p) => {
                sqlx::query_scalar(&sql)
                    .bind(post_type)
                    .bind(name)
                    .bind(code)
                    .bind(exclude)
                    .fetch_one(p)
                    .await
            }
            Backend::Mysql(p) => {
                sqlx::query_scalar(&sql)
                    .bind(post_type)
                    .bind(name)
                    .bind(code)
                    .bind(exclude)
                    .fetch_one(p)
                    .await
            }
        }
        .context("Failed to check category name and code")?;
        Ok(count > 0)
    }

    async fn count_posts(&self, id: i64) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE category_id = ?", self.tables.post);
        let count: i64 = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query_scalar(&sql).bind(id).fetch_one(p).await,
            Backend::Mysql(p) => sqlx::query_scalar(&sql).bind(id).fetch_one(p).await,
        }
        .context("Failed to count posts in category")?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_database;

    async fn setup_test_repo() -> SqlxCategoryRepository {
        let (pool, tables) = test_database().await;
        SqlxCategoryRepository::new(pool, tables)
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let repo = setup_test_repo().await;
        let created = repo.create("news", "Local News", "local-news").await.unwrap();
        assert!(created.id > 0);

        assert_eq!(repo.get_by_id(created.id).await.unwrap(), Some(created.clone()));
        assert_eq!(repo.get_by_code("news", "local-news").await.unwrap(), Some(created));
        assert!(repo.get_by_code("letter", "local-news").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_uniqueness_is_per_post_type() {
        let repo = setup_test_repo().await;
        repo.create("news", "General", "general").await.unwrap();
        repo.create("letter", "General", "general").await.unwrap();
        assert!(repo.create("news", "General", "other").await.is_err());

        assert!(repo.name_or_code_in_use("news", "Other", "general", None).await.unwrap());
        assert!(!repo.name_or_code_in_use("event", "General", "general", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_order_and_counts() {
        let repo = setup_test_repo().await;
        repo.create("news", "Sport", "sport").await.unwrap();
        repo.create("letter", "Arts", "arts").await.unwrap();
        repo.create("news", "Arts", "arts").await.unwrap();

        let listed: Vec<(String, String)> = repo
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|c| (c.name, c.post_type))
            .collect();
        assert_eq!(
            listed,
            vec![
                ("Arts".to_string(), "letter".to_string()),
                ("Arts".to_string(), "news".to_string()),
                ("Sport".to_string(), "news".to_string()),
            ]
        );
        assert_eq!(repo.count_for_post_type("news").await.unwrap(), 2);
        assert_eq!(repo.list_for_post_type("letter").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let repo = setup_test_repo().await;
        let created = repo.create("news", "Sport", "sport").await.unwrap();

        let updated = repo.update(created.id, "Sports", "sports").await.unwrap();
        assert_eq!(updated.name, "Sports");
        assert_eq!(updated.post_type, "news");
        assert!(!repo.name_or_code_in_use("news", "Sports", "sports", Some(created.id)).await.unwrap());

        assert_eq!(repo.count_posts(created.id).await.unwrap(), 0);
        repo.delete(created.id).await.unwrap();
        assert!(repo.get_by_id(created.id).await.unwrap().is_none());
    }
}
