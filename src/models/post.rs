//! Post model
//!
//! A post belongs to one post type, one category and one author. Its
//! publication state is derived from the nullable `published` timestamp:
//! - `None`: draft
//! - in the future: scheduled
//! - in the past: published

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Author, Category, Tag};
use crate::services::text::{first_paragraph_text, image_sources};

const DATE_FORMAT: &str = "%d/%m/%Y %H:%M";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: i64,
    pub post_type: String,
    pub created: DateTime<Utc>,
    pub published: Option<DateTime<Utc>>,
    pub category_id: i64,
    pub title: String,
    pub code: String,
    pub tagline: String,
    pub content: String,
    pub author_id: i64,
    pub html_title: Option<String>,
    pub html_description: Option<String>,
    pub snippet_title: Option<String>,
    pub snippet_description: Option<String>,
    pub snippet_image: Option<String>,
    pub main_image_url: Option<String>,
}

/// Where a post stands relative to a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublicationState {
    Draft,
    Scheduled,
    Published,
}

impl Post {
    /// Text of the first paragraph of the content
    pub fn description(&self) -> String {
        first_paragraph_text(&self.content)
    }

    /// Main image first, then every image in the content
    pub fn images(&self) -> Vec<String> {
        let mut images = Vec::new();
        if let Some(url) = self.main_image_url.as_deref().filter(|u| !u.is_empty()) {
            images.push(url.to_string());
        }
        images.extend(image_sources(&self.content));
        images
    }

    pub fn html_title_or_default(&self) -> String {
        non_empty(&self.html_title).unwrap_or_else(|| self.title.clone())
    }

    pub fn html_description_or_default(&self) -> String {
        non_empty(&self.html_description).unwrap_or_else(|| self.description())
    }

    pub fn snippet_title_or_default(&self) -> String {
        non_empty(&self.snippet_title).unwrap_or_else(|| self.title.clone())
    }

    pub fn snippet_description_or_default(&self) -> String {
        non_empty(&self.snippet_description).unwrap_or_else(|| self.tagline.clone())
    }

    /// Snippet image, else the site-wide placeholder. `None` means the
    /// post has nothing to show and no placeholder is configured.
    pub fn snippet_image_or_default(&self, missing_image_url: Option<&str>) -> Option<String> {
        non_empty(&self.snippet_image).or_else(|| missing_image_url.map(str::to_string))
    }

    pub fn publication_state(&self, now: DateTime<Utc>) -> PublicationState {
        match self.published {
            None => PublicationState::Draft,
            Some(published) if published > now => PublicationState::Scheduled,
            Some(_) => PublicationState::Published,
        }
    }

    pub fn is_published(&self, now: DateTime<Utc>) -> bool {
        self.publication_state(now) == PublicationState::Published
    }

    pub fn is_scheduled(&self, now: DateTime<Utc>) -> bool {
        self.publication_state(now) == PublicationState::Scheduled
    }

    /// Human-readable publication status
    pub fn published_label(&self, now: DateTime<Utc>) -> String {
        match (self.publication_state(now), self.published) {
            (PublicationState::Scheduled, Some(at)) => {
                format!("Scheduled to be published on {}", at.format(DATE_FORMAT))
            }
            (PublicationState::Published, Some(at)) => at.format(DATE_FORMAT).to_string(),
            _ => "Not published".to_string(),
        }
    }

    /// Date used to order posts when drafts are included
    pub fn sort_date(&self) -> DateTime<Utc> {
        self.published.unwrap_or(self.created)
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}

/// Post together with the rows it references
#[derive(Debug, Clone, Serialize)]
pub struct PostDetail {
    #[serde(flatten)]
    pub post: Post,
    pub category: Category,
    pub author: Author,
    pub tags: Vec<Tag>,
    pub description: String,
    pub state: PublicationState,
    pub published_label: String,
}

impl PostDetail {
    pub fn new(post: Post, category: Category, author: Author, tags: Vec<Tag>, now: DateTime<Utc>) -> Self {
        Self {
            description: post.description(),
            state: post.publication_state(now),
            published_label: post.published_label(now),
            post,
            category,
            author,
            tags,
        }
    }
}

/// Filter for post listings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostFilter {
    pub post_type: Option<String>,
    pub category_code: Option<String>,
    pub tag_name: Option<String>,
    /// Include drafts and scheduled posts
    #[serde(default)]
    pub allow_unpublished: bool,
}

impl PostFilter {
    pub fn published(post_type: impl Into<String>) -> Self {
        Self {
            post_type: Some(post_type.into()),
            ..Self::default()
        }
    }
}

/// Editor input for creating or editing a post
#[derive(Debug, Clone, Deserialize)]
pub struct SavePostInput {
    pub title: String,
    pub tagline: String,
    pub category_id: i64,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub main_image_url: Option<String>,
    /// Requested publication flag; ignored without publish permission
    #[serde(default)]
    pub published: bool,
    #[serde(default)]
    pub revision_notes: Option<String>,
}

/// SEO fields
#[derive(Debug, Clone, Deserialize)]
pub struct PostSeoInput {
    #[serde(default)]
    pub html_title: Option<String>,
    #[serde(default)]
    pub html_description: Option<String>,
    /// Only honoured when codes are editable
    #[serde(default)]
    pub code: Option<String>,
}

/// Snippet title and description
#[derive(Debug, Clone, Deserialize)]
pub struct SnippetInput {
    pub snippet_title: String,
    #[serde(default)]
    pub snippet_description: Option<String>,
    /// Remote image to import as the snippet image
    #[serde(default)]
    pub image_url: Option<String>,
}
