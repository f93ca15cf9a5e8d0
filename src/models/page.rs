//! Page models
//!
//! Pages are declared by the host (see [`PageDef`](crate::config::PageDef))
//! and only their content is edited. With page publishing enabled, visitors
//! see the [`PublishedPage`] copy until an editor publishes again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Page {
    pub id: i64,
    pub created: DateTime<Utc>,
    pub title: String,
    pub code: String,
    pub content: String,
    /// Set for pages whose definition was removed
    pub disabled: bool,
    pub author_id: Option<i64>,
    /// False while the draft differs from the published copy
    pub published: bool,
}

/// Live copy of a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PublishedPage {
    pub id: i64,
    pub page_id: i64,
    pub published: DateTime<Utc>,
    pub published_by_id: i64,
    pub title: String,
    pub content: String,
}

/// What visitors get for a page code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicPage {
    pub code: String,
    pub title: String,
    pub content: String,
    pub published: Option<DateTime<Utc>>,
}

impl PublicPage {
    pub fn from_draft(page: &Page) -> Self {
        Self {
            code: page.code.clone(),
            title: page.title.clone(),
            content: page.content.clone(),
            published: None,
        }
    }

    pub fn from_published(page: &Page, published: &PublishedPage) -> Self {
        Self {
            code: page.code.clone(),
            title: published.title.clone(),
            content: published.content.clone(),
            published: Some(published.published),
        }
    }
}

/// Editor input for page content
#[derive(Debug, Clone, Deserialize)]
pub struct SavePageInput {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub revision_notes: Option<String>,
}
