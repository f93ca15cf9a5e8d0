//! Tag model

use serde::{Deserialize, Serialize};

use crate::services::text::titlecase;

/// A tag scoped to a post type.
///
/// Tag codes keep leading and trailing hyphens (`make_code(name, false)`), so
/// `C++` and `C` do not collide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tag {
    pub id: i64,
    pub post_type: String,
    pub name: String,
    pub code: String,
    /// Free-form grouping supplied by importers
    pub tag_type: Option<String>,
    /// Identifier in an external system
    pub external_code: Option<String>,
}

impl Tag {
    /// Name for display in headings
    pub fn title_name(&self) -> String {
        titlecase(&self.name)
    }
}
