//! Category model
//!
//! Categories are flat and scoped to a post type: the same name can exist
//! once per post type.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category {
    pub id: i64,
    pub post_type: String,
    pub name: String,
    pub code: String,
}

/// Input for creating a category
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCategoryInput {
    pub post_type: String,
    pub name: String,
    /// Derived from the name when omitted
    #[serde(default)]
    pub code: Option<String>,
}

/// Input for editing a category; the post type cannot change
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateCategoryInput {
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
}
