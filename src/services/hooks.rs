//! Notification hooks
//!
//! Events the host may want to react to. Every hook defaults to doing
//! nothing; hooks run after the change is committed and cannot fail it.

use async_trait::async_trait;

use crate::models::{Comment, Page, Post};

#[async_trait]
pub trait CmsHooks: Send + Sync {
    /// A comment was stored, approved or not
    async fn comment_added(&self, _comment: &Comment, _post: &Post) {}

    /// An approved comment answers `parent`
    async fn comment_reply(&self, _comment: &Comment, _parent: &Comment, _post: &Post) {}

    /// Page content changed while page publishing is enabled
    async fn page_needs_publishing(&self, _page: &Page) {}
}

/// Ignores every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl CmsHooks for NoHooks {}
