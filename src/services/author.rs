//! Author service
//!
//! Authors are the public names posts and pages are credited to. Codes are
//! derived from names; an author stays while anything points at it.

use crate::db::repositories::AuthorRepository;
use crate::models::{Author, AuthorInput};
use crate::services::text::make_code;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum AuthorServiceError {
    #[error("Author not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct AuthorService {
    repo: Arc<dyn AuthorRepository>,
}

impl AuthorService {
    pub fn new(repo: Arc<dyn AuthorRepository>) -> Self {
        Self { repo }
    }

    pub async fn list(&self) -> Result<Vec<Author>, AuthorServiceError> {
        Ok(self.repo.list().await?)
    }

    pub async fn get(&self, id: i64) -> Result<Author, AuthorServiceError> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| AuthorServiceError::NotFound(id.to_string()))
    }

    /// Look up several authors at once, skipping ids that do not exist
    pub async fn get_many(&self, ids: impl IntoIterator<Item = i64>) -> Result<Vec<Author>, AuthorServiceError> {
        let mut authors: Vec<Author> = Vec::new();
        for id in ids {
            if authors.iter().any(|a| a.id == id) {
                continue;
            }
            if let Some(author) = self.repo.get_by_id(id).await? {
                authors.push(author);
            }
        }
        Ok(authors)
    }

    pub async fn create(&self, input: AuthorInput) -> Result<Author, AuthorServiceError> {
        let (name, code) = Self::name_and_code(&input)?;
        if self.repo.name_or_code_in_use(&name, &code, None).await? {
            return Err(AuthorServiceError::Conflict(
                "An author with this name already exists".to_string(),
            ));
        }
        let author = self.repo.create(&name, &code).await?;
        tracing::info!("Created author {} ({})", author.name, author.code);
        Ok(author)
    }

    pub async fn rename(&self, id: i64, input: AuthorInput) -> Result<Author, AuthorServiceError> {
        self.get(id).await?;
        let (name, code) = Self::name_and_code(&input)?;
        if self.repo.name_or_code_in_use(&name, &code, Some(id)).await? {
            return Err(AuthorServiceError::Conflict(
                "An author with this name already exists".to_string(),
            ));
        }
        Ok(self.repo.update(id, &name, &code).await?)
    }

    /// Delete an author nothing refers to
    pub async fn delete(&self, id: i64) -> Result<(), AuthorServiceError> {
        let author = self.get(id).await?;
        if self.repo.count_references(id).await? > 0 {
            return Err(AuthorServiceError::Conflict(format!(
                "{} can't be deleted as they are still credited on content",
                author.name
            )));
        }
        self.repo.delete(id).await?;
        tracing::info!("Deleted author {}", author.code);
        Ok(())
    }

    fn name_and_code(input: &AuthorInput) -> Result<(String, String), AuthorServiceError> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(AuthorServiceError::ValidationError("Name is required".to_string()));
        }
        let code = make_code(name, true);
        if code.is_empty() {
            return Err(AuthorServiceError::ValidationError(
                "Name must contain letters or digits".to_string(),
            ));
        }
        Ok((name.to_string(), code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxAuthorRepository, SqlxUserRepository, UserRepository};
    use crate::db::test_database;

    fn input(name: &str) -> AuthorInput {
        AuthorInput { name: name.to_string() }
    }

    #[tokio::test]
    async fn test_create_derives_code() {
        let (pool, tables) = test_database().await;
        let service = AuthorService::new(SqlxAuthorRepository::boxed(pool, tables));

        let author = service.create(input("  Mary O'Brien ")).await.unwrap();
        assert_eq!(author.name, "Mary O'Brien");
        assert_eq!(author.code, "mary-o-brien");

        assert!(matches!(service.create(input("Mary O'Brien")).await, Err(AuthorServiceError::Conflict(_))));
        assert!(matches!(service.create(input("  ")).await, Err(AuthorServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_rename() {
        let (pool, tables) = test_database().await;
        let service = AuthorService::new(SqlxAuthorRepository::boxed(pool, tables));
        let author = service.create(input("Ann")).await.unwrap();
        service.create(input("Bob")).await.unwrap();

        let renamed = service.rename(author.id, input("Annie")).await.unwrap();
        assert_eq!(renamed.code, "annie");
        assert!(matches!(service.rename(author.id, input("Bob")).await, Err(AuthorServiceError::Conflict(_))));
        assert!(matches!(service.rename(999, input("X")).await, Err(AuthorServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_refused_while_referenced() {
        let (pool, tables) = test_database().await;
        let users = SqlxUserRepository::new(pool.clone(), tables.clone());
        let service = AuthorService::new(SqlxAuthorRepository::boxed(pool, tables));

        let user = users.create_with_author("Ann", "ann").await.unwrap();
        assert!(matches!(service.delete(user.author_id).await, Err(AuthorServiceError::Conflict(_))));

        let loose = service.create(input("Loose")).await.unwrap();
        service.delete(loose.id).await.unwrap();
        assert!(matches!(service.get(loose.id).await, Err(AuthorServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_get_many_skips_missing() {
        let (pool, tables) = test_database().await;
        let service = AuthorService::new(SqlxAuthorRepository::boxed(pool, tables));
        let ann = service.create(input("Ann")).await.unwrap();

        let found = service.get_many([ann.id, 42, ann.id]).await.unwrap();
        assert_eq!(found, vec![ann]);
    }
}
