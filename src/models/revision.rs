//! Revision models
//!
//! Every save writes a revision; revisions are never edited. Restoring one
//! writes a new revision that notes where the content came from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PostRevision {
    pub id: i64,
    pub post_id: i64,
    pub timestamp: DateTime<Utc>,
    pub user_id: i64,
    pub revision_notes: Option<String>,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PageRevision {
    pub id: i64,
    pub page_id: i64,
    pub timestamp: DateTime<Utc>,
    pub user_id: i64,
    pub revision_notes: Option<String>,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PublishedPageRevision {
    pub id: i64,
    pub published_page_id: i64,
    pub timestamp: DateTime<Utc>,
    pub user_id: i64,
    pub revision_notes: Option<String>,
    pub content: String,
}

/// Notes written on the revision a restore creates
pub fn restore_notes(revision_id: i64, timestamp: DateTime<Utc>) -> String {
    format!(
        "Restored revision {} from {}",
        revision_id,
        timestamp.format("%Y-%m-%d %H:%M:%S")
    )
}

/// Revision being viewed plus the others for navigation
#[derive(Debug, Clone, Serialize)]
pub struct History<R> {
    pub current: R,
    pub revisions: Vec<R>,
}
