//! Category service
//!
//! Every post belongs to exactly one category of its post type, so a post
//! type needs a category before it can have posts and a category can only
//! go once its posts have moved elsewhere.

use crate::config::CmsSettings;
use crate::db::repositories::CategoryRepository;
use crate::models::{Category, CreateCategoryInput, UpdateCategoryInput};
use crate::services::text::{is_valid_code, make_code};
use std::sync::Arc;

const NAME_OR_CODE_IN_USE: &str = "Either the name or the code is already in use for this post type";
const CATEGORY_IN_USE: &str = "This category can't be deleted as some posts are using this category";

#[derive(Debug, thiserror::Error)]
pub enum CategoryServiceError {
    #[error("Category not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct CategoryService {
    repo: Arc<dyn CategoryRepository>,
    settings: Arc<CmsSettings>,
}

impl CategoryService {
    pub fn new(repo: Arc<dyn CategoryRepository>, settings: Arc<CmsSettings>) -> Self {
        Self { repo, settings }
    }

    /// All categories ordered by name, then post type
    pub async fn list(&self) -> Result<Vec<Category>, CategoryServiceError> {
        Ok(self.repo.list().await?)
    }

    pub async fn list_for_post_type(&self, post_type: &str) -> Result<Vec<Category>, CategoryServiceError> {
        Ok(self.repo.list_for_post_type(post_type).await?)
    }

    pub async fn get(&self, id: i64) -> Result<Category, CategoryServiceError> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| CategoryServiceError::NotFound(id.to_string()))
    }

    pub async fn get_by_code(&self, post_type: &str, code: &str) -> Result<Option<Category>, CategoryServiceError> {
        Ok(self.repo.get_by_code(post_type, code).await?)
    }

    pub async fn has_categories(&self, post_type: &str) -> Result<bool, CategoryServiceError> {
        Ok(self.repo.count_for_post_type(post_type).await? > 0)
    }

    pub async fn create(&self, input: CreateCategoryInput) -> Result<Category, CategoryServiceError> {
        if !self.settings.is_post_type(&input.post_type) {
            return Err(CategoryServiceError::ValidationError(format!(
                "Unknown post type: {}",
                input.post_type
            )));
        }
        let (name, code) = Self::name_and_code(&input.name, input.code.as_deref())?;
        if self
            .repo
            .name_or_code_in_use(&input.post_type, &name, &code, None)
            .await?
        {
            return Err(CategoryServiceError::Conflict(NAME_OR_CODE_IN_USE.to_string()));
        }

        let category = self.repo.create(&input.post_type, &name, &code).await?;
        tracing::info!("Created {} category {}", category.post_type, category.code);
        Ok(category)
    }

    /// Rename the category `code` of `post_type`; its post type never changes
    pub async fn update(
        &self,
        post_type: &str,
        code: &str,
        input: UpdateCategoryInput,
    ) -> Result<Category, CategoryServiceError> {
        let existing = self
            .repo
            .get_by_code(post_type, code)
            .await?
            .ok_or_else(|| CategoryServiceError::NotFound(format!("{}/{}", post_type, code)))?;

        let (name, new_code) = Self::name_and_code(&input.name, input.code.as_deref())?;
        if self
            .repo
            .name_or_code_in_use(post_type, &name, &new_code, Some(existing.id))
            .await?
        {
            return Err(CategoryServiceError::Conflict(NAME_OR_CODE_IN_USE.to_string()));
        }

        Ok(self.repo.update(existing.id, &name, &new_code).await?)
    }

    pub async fn delete(&self, id: i64) -> Result<(), CategoryServiceError> {
        let category = self.get(id).await?;
        if self.repo.count_posts(id).await? > 0 {
            return Err(CategoryServiceError::Conflict(CATEGORY_IN_USE.to_string()));
        }
        self.repo.delete(id).await?;
        tracing::info!("Deleted {} category {}", category.post_type, category.code);
        Ok(())
    }

    /// Trimmed name plus the given code, or one made from the name
    fn name_and_code(name: &str, code: Option<&str>) -> Result<(String, String), CategoryServiceError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CategoryServiceError::ValidationError("Name is required".to_string()));
        }
        let code = match code.map(str::trim).filter(|c| !c.is_empty()) {
            Some(code) => code.to_string(),
            None => make_code(name, true),
        };
        if code.is_empty() {
            return Err(CategoryServiceError::ValidationError("Code is required".to_string()));
        }
        if !is_valid_code(&code) {
            return Err(CategoryServiceError::ValidationError(
                "Code may only contain lower-case letters, digits and hyphens".to_string(),
            ));
        }
        Ok((name.to_string(), code))
    }
}
