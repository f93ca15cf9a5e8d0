//! CMS user repository
//!
//! A CMS user is the editing identity behind revisions and moderation. Users
//! are created together with their author in one transaction.

use crate::db::{Backend, DynDatabasePool, Tables};
use crate::models::CmsUser;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, SqlitePool};
use std::sync::Arc;

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create an author called `name` with `author_code` and a user linked to it
    async fn create_with_author(&self, name: &str, author_code: &str) -> Result<CmsUser>;

    async fn get_by_id(&self, id: i64) -> Result<Option<CmsUser>>;

    async fn get_by_name(&self, name: &str) -> Result<Option<CmsUser>>;

    async fn list(&self) -> Result<Vec<CmsUser>>;
}

pub struct SqlxUserRepository {
    pool: DynDatabasePool,
    tables: Arc<Tables>,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool, tables: Arc<Tables>) -> Self {
        Self { pool, tables }
    }

    pub fn boxed(pool: DynDatabasePool, tables: Arc<Tables>) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool, tables))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create_with_author(&self, name: &str, author_code: &str) -> Result<CmsUser> {
        match self.pool.backend() {
            Backend::Sqlite(p) => create_user_sqlite(p, &self.tables, name, author_code).await,
            Backend::Mysql(p) => create_user_mysql(p, &self.tables, name, author_code).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<CmsUser>> {
        let sql = format!("SELECT id, name, author_id FROM {} WHERE id = ?", self.tables.user);
        let user = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query_as::<_, CmsUser>(&sql).bind(id).fetch_optional(p).await,
            Backend::Mysql(p) => sqlx::query_as::<_, CmsUser>(&sql).bind(id).fetch_optional(p).await,
        }
        .context("Failed to get user by id")?;
        Ok(user)
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<CmsUser>> {
        let sql = format!("SELECT id, name, author_id FROM {} WHERE name = ?", self.tables.user);
        let user = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query_as::<_, CmsUser>(&sql).bind(name).fetch_optional(p).await,
            Backend::Mysql(p) => sqlx::query_as::<_, CmsUser>(&sql).bind(name).fetch_optional(p).await,
        }
        .context("Failed to get user by name")?;
        Ok(user)
    }

    async fn list(&self) -> Result<Vec<CmsUser>> {
        let sql = format!("SELECT id, name, author_id FROM {} ORDER BY name", self.tables.user);
        let users = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query_as::<_, CmsUser>(&sql).fetch_all(p).await,
            Backend::Mysql(p) => sqlx::query_as::<_, CmsUser>(&sql).fetch_all(p).await,
        }
        .context("Failed to list users")?;
        Ok(users)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_user_sqlite(pool: &SqlitePool, tables: &Tables, name: &str, author_code: &str) -> Result<CmsUser> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let author_id = sqlx::query(&format!("INSERT INTO {} (name, code) VALUES (?, ?)", tables.author))
        .bind(name)
        .bind(author_code)
        .execute(&mut *tx)
        .await
        .context("Failed to create author for user")?
        .last_insert_rowid();

    let id = sqlx::query(&format!("INSERT INTO {} (name, author_id) VALUES (?, ?)", tables.user))
        .bind(name)
        .bind(author_id)
        .execute(&mut *tx)
        .await
        .context("Failed to create user")?
        .last_insert_rowid();

    tx.commit().await.context("Failed to commit transaction")?;

    Ok(CmsUser {
        id,
        name: name.to_string(),
        author_id,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_user_mysql(pool: &MySqlPool, tables: &Tables, name: &str, author_code: &str) -> Result<CmsUser> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let author_id = sqlx::query(&format!("INSERT INTO {} (name, code) VALUES (?, ?)", tables.author))
        .bind(name)
        .bind(author_code)
        .execute(&mut *tx)
        .await
        .context("Failed to create author for user")?
        .last_insert_id() as i64;

    let id = sqlx::query(&format!("INSERT INTO {} (name, author_id) VALUES (?, ?)", tables.user))
        .bind(name)
        .bind(author_id)
        .execute(&mut *tx)
        .await
        .context("Failed to create user")?
        .last_insert_id() as i64;

    tx.commit().await.context("Failed to commit transaction")?;

    Ok(CmsUser {
        id,
        name: name.to_string(),
        author_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{AuthorRepository, SqlxAuthorRepository};
    use crate::db::test_database;

    #[tokio::test]
    async fn test_create_with_author() {
        let (pool, tables) = test_database().await;
        let repo = SqlxUserRepository::new(pool.clone(), tables.clone());
        let authors = SqlxAuthorRepository::new(pool, tables);

        let user = repo.create_with_author("Jane Doe", "jane-doe").await.unwrap();
        let author = authors.get_by_id(user.author_id).await.unwrap().unwrap();
        assert_eq!(author.name, "Jane Doe");
        assert_eq!(author.code, "jane-doe");

        assert_eq!(repo.get_by_name("Jane Doe").await.unwrap(), Some(user.clone()));
        assert_eq!(repo.get_by_id(user.id).await.unwrap(), Some(user));
    }

    #[tokio::test]
    async fn test_failed_user_rolls_back_author() {
        let (pool, tables) = test_database().await;
        let repo = SqlxUserRepository::new(pool.clone(), tables.clone());
        let authors = SqlxAuthorRepository::new(pool.clone(), tables);

        let other = authors.create("Someone Else", "someone-else").await.unwrap();
        pool.execute(&format!("INSERT INTO cms_user (name, author_id) VALUES ('Sam', {})", other.id))
            .await
            .unwrap();

        // the author insert succeeds, the user insert clashes on name
        assert!(repo.create_with_author("Sam", "sam").await.is_err());
        assert!(authors.get_by_code("sam").await.unwrap().is_none());
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }
}
