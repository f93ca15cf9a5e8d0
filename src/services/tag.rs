//! Tag service
//!
//! Tags are added to a post as a comma-separated list of names. Each name is
//! matched by code within the post's type and created when new; a tag left
//! without posts after removal is deleted.

use crate::db::repositories::TagRepository;
use crate::models::{Post, Tag};
use crate::services::text::make_code;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum TagServiceError {
    #[error("Tag not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct TagService {
    repo: Arc<dyn TagRepository>,
}

/// Trimmed, non-empty names from a comma-separated list
pub fn split_tag_names(names: &str) -> Vec<&str> {
    names.split(',').map(str::trim).filter(|n| !n.is_empty()).collect()
}

impl TagService {
    pub fn new(repo: Arc<dyn TagRepository>) -> Self {
        Self { repo }
    }

    pub async fn list(&self, post_type: Option<&str>) -> Result<Vec<Tag>, TagServiceError> {
        Ok(self.repo.list(post_type).await?)
    }

    pub async fn list_for_post(&self, post_id: i64) -> Result<Vec<Tag>, TagServiceError> {
        Ok(self.repo.list_for_post(post_id).await?)
    }

    pub async fn get_by_name(&self, post_type: &str, name: &str) -> Result<Option<Tag>, TagServiceError> {
        Ok(self.repo.get_by_name(post_type, name).await?)
    }

    /// Attach every tag named in `names` to `post`. Unknown tags are created
    /// only when `can_create` is set.
    pub async fn add_tags(&self, post: &Post, names: &str, can_create: bool) -> Result<Vec<Tag>, TagServiceError> {
        let names = split_tag_names(names);
        if names.is_empty() {
            return Err(TagServiceError::ValidationError("Enter at least one tag".to_string()));
        }

        for name in names {
            let code = make_code(name, false);
            let tag = match self.repo.get_by_code(&post.post_type, &code).await? {
                Some(tag) => tag,
                None if can_create => {
                    let tag = self.repo.create(&post.post_type, name, &code).await?;
                    tracing::info!("Created {} tag {}", tag.post_type, tag.code);
                    tag
                }
                None => {
                    return Err(TagServiceError::Forbidden(format!(
                        "You don't have permission to create the tag {}",
                        name
                    )))
                }
            };
            self.repo.attach(post.id, tag.id).await?;
        }

        Ok(self.repo.list_for_post(post.id).await?)
    }

    /// Detach the tag `code` from `post`, deleting it when no posts remain
    pub async fn remove_tag(&self, post: &Post, code: &str) -> Result<Vec<Tag>, TagServiceError> {
        let tag = self
            .repo
            .get_by_code(&post.post_type, code)
            .await?
            .ok_or_else(|| TagServiceError::NotFound(code.to_string()))?;

        self.repo.detach(post.id, tag.id).await?;
        if self.repo.count_posts(tag.id).await? == 0 {
            self.repo.delete(tag.id).await?;
            tracing::debug!("Deleted unused tag {}", tag.code);
        }

        Ok(self.repo.list_for_post(post.id).await?)
    }
}
