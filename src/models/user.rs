//! CMS user model

use serde::{Deserialize, Serialize};

/// A user that can log in to the editor. Revisions record which user made
/// them; the linked author is what the public sees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CmsUser {
    pub id: i64,
    pub name: String,
    pub author_id: i64,
}
