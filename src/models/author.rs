//! Author model
//!
//! Authors are the public identity on posts, published pages and admin
//! comments. Every CMS user is linked to exactly one author.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Author {
    pub id: i64,
    pub name: String,
    /// URL-safe form of the name, unique across authors
    pub code: String,
}

/// Input for creating or renaming an author
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorInput {
    pub name: String,
}
