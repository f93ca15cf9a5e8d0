//! CMS user service
//!
//! Users are created together with their author so every revision and
//! moderation action can be credited.

use crate::db::repositories::{AuthorRepository, UserRepository};
use crate::models::CmsUser;
use crate::services::text::make_code;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    #[error("User not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct UserService {
    users: Arc<dyn UserRepository>,
    authors: Arc<dyn AuthorRepository>,
}

impl UserService {
    pub fn new(users: Arc<dyn UserRepository>, authors: Arc<dyn AuthorRepository>) -> Self {
        Self { users, authors }
    }

    /// Create a user called `name` with an author of the same name
    pub async fn create_user(&self, name: &str) -> Result<CmsUser, UserServiceError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(UserServiceError::ValidationError("Name is required".to_string()));
        }
        let code = make_code(name, true);
        if code.is_empty() {
            return Err(UserServiceError::ValidationError(
                "Name must contain letters or digits".to_string(),
            ));
        }
        if self.users.get_by_name(name).await?.is_some() {
            return Err(UserServiceError::Conflict(format!("User {} already exists", name)));
        }
        if self.authors.name_or_code_in_use(name, &code, None).await? {
            return Err(UserServiceError::Conflict(format!(
                "An author called {} already exists",
                name
            )));
        }

        let user = self.users.create_with_author(name, &code).await?;
        tracing::info!("Created CMS user {} (author {})", user.name, user.author_id);
        Ok(user)
    }

    /// Existing user called `name`, else a new one
    pub async fn ensure_user(&self, name: &str) -> Result<CmsUser, UserServiceError> {
        match self.users.get_by_name(name.trim()).await? {
            Some(user) => Ok(user),
            None => self.create_user(name).await,
        }
    }

    pub async fn get(&self, id: i64) -> Result<CmsUser, UserServiceError> {
        self.users
            .get_by_id(id)
            .await?
            .ok_or_else(|| UserServiceError::NotFound(id.to_string()))
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Option<CmsUser>, UserServiceError> {
        Ok(self.users.get_by_name(name).await?)
    }

    pub async fn list(&self) -> Result<Vec<CmsUser>, UserServiceError> {
        Ok(self.users.list().await?)
    }
}
