//! Comment model
//!
//! Comments come from two places: visitors (escaped, held for moderation)
//! and editors posting as their author (stored as HTML, approved at once).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Author;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub author_ip: Option<String>,
    pub author_user_agent: Option<String>,
    /// Set when an editor posted as their author
    pub author_id: Option<i64>,
    pub author_user_id: Option<i64>,
    pub edited_by_id: Option<i64>,
    pub edited_by_user_id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub approved: bool,
    pub content: String,
    /// Content before the first moderator edit
    pub original_content: Option<String>,
    pub edit_timestamp: Option<DateTime<Utc>>,
    pub deleted: bool,
    pub reply_to_id: Option<i64>,
}

/// Who is looking at a comment list
#[derive(Debug, Clone, Default)]
pub struct CommentViewer {
    pub is_moderator: bool,
    /// Email the visitor last commented with (from their cookie)
    pub email: Option<String>,
}

impl CommentViewer {
    pub fn moderator() -> Self {
        Self {
            is_moderator: true,
            email: None,
        }
    }

    pub fn visitor(email: Option<String>) -> Self {
        Self {
            is_moderator: false,
            email: email.filter(|e| !e.is_empty()),
        }
    }
}

impl Comment {
    /// Moderators see everything. Everyone else sees approved comments that
    /// are not deleted, plus their own comments still awaiting approval.
    pub fn is_visible_to(&self, viewer: &CommentViewer) -> bool {
        if viewer.is_moderator {
            return true;
        }
        if self.deleted {
            return false;
        }
        if self.approved {
            return true;
        }
        match (&viewer.email, &self.author_email) {
            (Some(viewer_email), Some(author_email)) => viewer_email == author_email,
            _ => false,
        }
    }

    /// Name shown next to the comment
    pub fn display_name(&self, author: Option<&Author>) -> String {
        match author {
            Some(author) => author.name.clone(),
            None => self.author_name.clone().unwrap_or_default(),
        }
    }

    pub fn is_edited(&self) -> bool {
        self.edit_timestamp.is_some()
    }
}

/// Gravatar URL for an email
pub fn gravatar_url(email: Option<&str>) -> String {
    match email.map(str::trim).filter(|e| !e.is_empty()) {
        Some(e) => {
            let hash = format!("{:x}", md5::compute(e.to_lowercase()));
            format!("https://www.gravatar.com/avatar/{}?d=mp&s=80", hash)
        }
        None => "https://www.gravatar.com/avatar/?d=mp&s=80".to_string(),
    }
}

/// Public view of a comment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentView {
    pub id: i64,
    pub reply_to_id: Option<i64>,
    pub author_name: String,
    pub avatar_url: String,
    pub timestamp: DateTime<Utc>,
    pub content: String,
    pub approved: bool,
    pub edited: bool,
}

impl CommentView {
    pub fn new(comment: &Comment, author: Option<&Author>) -> Self {
        Self {
            id: comment.id,
            reply_to_id: comment.reply_to_id,
            author_name: comment.display_name(author),
            avatar_url: gravatar_url(comment.author_email.as_deref()),
            timestamp: comment.timestamp,
            content: comment.content.clone(),
            approved: comment.approved,
            edited: comment.is_edited(),
        }
    }
}

/// A comment submission from the public form
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommentSubmission {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub content: String,
    /// Raw reply target; must parse as an integer when present
    #[serde(default)]
    pub reply_to: Option<String>,
    /// Honeypot field hidden from humans
    #[serde(default)]
    pub nickname: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(approved: bool, deleted: bool, email: Option<&str>) -> Comment {
        Comment {
            id: 1,
            post_id: 1,
            author_name: Some("Ann".into()),
            author_email: email.map(str::to_string),
            author_ip: None,
            author_user_agent: None,
            author_id: None,
            author_user_id: None,
            edited_by_id: None,
            edited_by_user_id: None,
            timestamp: Utc::now(),
            approved,
            content: "<p>hi</p>".into(),
            original_content: None,
            edit_timestamp: None,
            deleted,
            reply_to_id: None,
        }
    }

    #[test]
    fn test_visibility_rules() {
        let stranger = CommentViewer::visitor(None);
        let ann = CommentViewer::visitor(Some("ann@example.com".into()));
        let moderator = CommentViewer::moderator();

        let approved = comment(true, false, Some("ann@example.com"));
        assert!(approved.is_visible_to(&stranger));

        let pending = comment(false, false, Some("ann@example.com"));
        assert!(!pending.is_visible_to(&stranger));
        assert!(pending.is_visible_to(&ann));
        assert!(pending.is_visible_to(&moderator));

        let deleted = comment(true, true, Some("ann@example.com"));
        assert!(!deleted.is_visible_to(&ann));
        assert!(deleted.is_visible_to(&moderator));
    }

    #[test]
    fn test_empty_cookie_sees_nothing_pending() {
        let pending = comment(false, false, None);
        assert!(!pending.is_visible_to(&CommentViewer::visitor(Some(String::new()))));
    }

    #[test]
    fn test_display_name_prefers_author() {
        let c = comment(true, false, None);
        assert_eq!(c.display_name(None), "Ann");
        let author = Author { id: 3, name: "Editor Ed".into(), code: "editor-ed".into() };
        assert_eq!(c.display_name(Some(&author)), "Editor Ed");
    }

    #[test]
    fn test_gravatar_url() {
        assert_eq!(
            gravatar_url(Some(" Ann@Example.com ")),
            format!("https://www.gravatar.com/avatar/{:x}?d=mp&s=80", md5::compute("ann@example.com"))
        );
        assert!(gravatar_url(None).ends_with("/avatar/?d=mp&s=80"));
    }
}
