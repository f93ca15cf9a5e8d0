//! Access control
//!
//! The host decides who may do what. [`AccessControl`] has a default answer
//! for every permission so a host only overrides what it cares about; the
//! derived permissions (tagging, tag management, publishing pages, posting
//! comments as admin) follow their parent permission unless overridden.

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::models::CmsUser;

/// Every permission the editor checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ViewEditor,
    EditPage,
    PublishPage,
    EditPost,
    EditPostSeo,
    TagPost,
    ManageTags,
    DeletePost,
    PublishPost,
    EditCategory,
    PostCommentsAsAdmin,
    ModerateComments,
    AccessFileManager,
    ManageAuthors,
}

impl Permission {
    pub const ALL: [Permission; 14] = [
        Permission::ViewEditor,
        Permission::EditPage,
        Permission::PublishPage,
        Permission::EditPost,
        Permission::EditPostSeo,
        Permission::TagPost,
        Permission::ManageTags,
        Permission::DeletePost,
        Permission::PublishPost,
        Permission::EditCategory,
        Permission::PostCommentsAsAdmin,
        Permission::ModerateComments,
        Permission::AccessFileManager,
        Permission::ManageAuthors,
    ];
}

/// The caller of one request, as resolved by [`AccessControl::logged_in_user`]
#[derive(Debug, Clone, Default)]
pub struct AccessContext {
    pub user: Option<CmsUser>,
}

impl AccessContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn for_user(user: CmsUser) -> Self {
        Self { user: Some(user) }
    }
}

/// Host-supplied access policy
#[async_trait]
pub trait AccessControl: Send + Sync {
    /// CMS user behind a request
    async fn logged_in_user(&self, _headers: &HeaderMap) -> Option<CmsUser> {
        None
    }

    fn can_view_editor(&self, _ctx: &AccessContext) -> bool {
        true
    }

    fn can_edit_page(&self, _ctx: &AccessContext) -> bool {
        true
    }

    fn can_publish_page(&self, ctx: &AccessContext) -> bool {
        self.can_edit_page(ctx)
    }

    fn can_edit_post(&self, _ctx: &AccessContext) -> bool {
        true
    }

    fn can_edit_post_seo(&self, _ctx: &AccessContext) -> bool {
        true
    }

    fn can_tag_post(&self, ctx: &AccessContext) -> bool {
        self.can_edit_post(ctx)
    }

    fn can_manage_tags(&self, ctx: &AccessContext) -> bool {
        self.can_tag_post(ctx)
    }

    fn can_delete_post(&self, _ctx: &AccessContext) -> bool {
        false
    }

    fn can_publish_post(&self, _ctx: &AccessContext) -> bool {
        true
    }

    fn can_edit_category(&self, _ctx: &AccessContext) -> bool {
        true
    }

    fn can_post_comments_as_admin(&self, ctx: &AccessContext) -> bool {
        self.can_moderate_comments(ctx) || self.can_edit_post(ctx)
    }

    fn can_moderate_comments(&self, _ctx: &AccessContext) -> bool {
        true
    }

    fn can_access_file_manager(&self, _ctx: &AccessContext) -> bool {
        true
    }

    fn can_manage_authors(&self, _ctx: &AccessContext) -> bool {
        true
    }

    /// Dispatch a permission to its check
    fn allows(&self, ctx: &AccessContext, permission: Permission) -> bool {
        match permission {
            Permission::ViewEditor => self.can_view_editor(ctx),
            Permission::EditPage => self.can_edit_page(ctx),
            Permission::PublishPage => self.can_publish_page(ctx),
            Permission::EditPost => self.can_edit_post(ctx),
            Permission::EditPostSeo => self.can_edit_post_seo(ctx),
            Permission::TagPost => self.can_tag_post(ctx),
            Permission::ManageTags => self.can_manage_tags(ctx),
            Permission::DeletePost => self.can_delete_post(ctx),
            Permission::PublishPost => self.can_publish_post(ctx),
            Permission::EditCategory => self.can_edit_category(ctx),
            Permission::PostCommentsAsAdmin => self.can_post_comments_as_admin(ctx),
            Permission::ModerateComments => self.can_moderate_comments(ctx),
            Permission::AccessFileManager => self.can_access_file_manager(ctx),
            Permission::ManageAuthors => self.can_manage_authors(ctx),
        }
    }
}

/// Every default answer and nobody logged in
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAccessControl;

impl AccessControl for DefaultAccessControl {}

/// Bearer-token access: the holder of `token` is logged in as `user` and may
/// do everything except the denied permissions. Everyone else gets nothing.
#[derive(Debug, Clone)]
pub struct TokenAccessControl {
    token: String,
    user: CmsUser,
    denied: HashSet<Permission>,
}

impl TokenAccessControl {
    pub fn new(token: impl Into<String>, user: CmsUser, denied: impl IntoIterator<Item = Permission>) -> Self {
        Self {
            token: token.into(),
            user,
            denied: denied.into_iter().collect(),
        }
    }

    fn granted(&self, ctx: &AccessContext, permission: Permission) -> bool {
        ctx.user.as_ref().map_or(false, |u| u.id == self.user.id) && !self.denied.contains(&permission)
    }
}

#[async_trait]
impl AccessControl for TokenAccessControl {
    async fn logged_in_user(&self, headers: &HeaderMap) -> Option<CmsUser> {
        let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
        let token = value.strip_prefix("Bearer ")?;
        (token.trim() == self.token).then(|| self.user.clone())
    }

    fn can_view_editor(&self, ctx: &AccessContext) -> bool {
        self.granted(ctx, Permission::ViewEditor)
    }

    fn can_edit_page(&self, ctx: &AccessContext) -> bool {
        self.granted(ctx, Permission::EditPage)
    }

    fn can_publish_page(&self, ctx: &AccessContext) -> bool {
        self.granted(ctx, Permission::PublishPage) && self.can_edit_page(ctx)
    }

    fn can_edit_post(&self, ctx: &AccessContext) -> bool {
        self.granted(ctx, Permission::EditPost)
    }

    fn can_edit_post_seo(&self, ctx: &AccessContext) -> bool {
        self.granted(ctx, Permission::EditPostSeo)
    }

    fn can_tag_post(&self, ctx: &AccessContext) -> bool {
        self.granted(ctx, Permission::TagPost) && self.can_edit_post(ctx)
    }

    fn can_manage_tags(&self, ctx: &AccessContext) -> bool {
        self.granted(ctx, Permission::ManageTags) && self.can_tag_post(ctx)
    }

    fn can_delete_post(&self, ctx: &AccessContext) -> bool {
        self.granted(ctx, Permission::DeletePost)
    }

    fn can_publish_post(&self, ctx: &AccessContext) -> bool {
        self.granted(ctx, Permission::PublishPost)
    }

    fn can_edit_category(&self, ctx: &AccessContext) -> bool {
        self.granted(ctx, Permission::EditCategory)
    }

    fn can_post_comments_as_admin(&self, ctx: &AccessContext) -> bool {
        self.granted(ctx, Permission::PostCommentsAsAdmin)
            && (self.can_moderate_comments(ctx) || self.can_edit_post(ctx))
    }

    fn can_moderate_comments(&self, ctx: &AccessContext) -> bool {
        self.granted(ctx, Permission::ModerateComments)
    }

    fn can_access_file_manager(&self, ctx: &AccessContext) -> bool {
        self.granted(ctx, Permission::AccessFileManager)
    }

    fn can_manage_authors(&self, ctx: &AccessContext) -> bool {
        self.granted(ctx, Permission::ManageAuthors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn editor() -> CmsUser {
        CmsUser {
            id: 7,
            name: "editor".into(),
            author_id: 3,
        }
    }

    #[test]
    fn test_default_answers() {
        let access = DefaultAccessControl;
        let ctx = AccessContext::anonymous();
        for permission in Permission::ALL {
            let expected = permission != Permission::DeletePost;
            assert_eq!(access.allows(&ctx, permission), expected, "{:?}", permission);
        }
    }

    struct NoPostEditing;

    impl AccessControl for NoPostEditing {
        fn can_edit_post(&self, _ctx: &AccessContext) -> bool {
            false
        }
        fn can_moderate_comments(&self, _ctx: &AccessContext) -> bool {
            false
        }
    }

    #[test]
    fn test_derived_permissions_follow_parents() {
        let access = NoPostEditing;
        let ctx = AccessContext::anonymous();
        assert!(!access.can_tag_post(&ctx));
        assert!(!access.can_manage_tags(&ctx));
        assert!(!access.can_post_comments_as_admin(&ctx));
        assert!(access.can_publish_page(&ctx));
    }

    #[tokio::test]
    async fn test_token_resolves_user() {
        let access = TokenAccessControl::new("s3cret", editor(), []);
        let mut headers = HeaderMap::new();
        assert!(access.logged_in_user(&headers).await.is_none());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer wrong"));
        assert!(access.logged_in_user(&headers).await.is_none());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer s3cret"));
        assert_eq!(access.logged_in_user(&headers).await, Some(editor()));
    }

    #[test]
    fn test_token_grants_all_but_denied() {
        let access = TokenAccessControl::new("s3cret", editor(), [Permission::EditPost]);
        let ctx = AccessContext::for_user(editor());
        assert!(access.can_view_editor(&ctx));
        assert!(access.can_delete_post(&ctx));
        assert!(!access.can_edit_post(&ctx));
        assert!(!access.can_tag_post(&ctx));
        assert!(access.can_post_comments_as_admin(&ctx));

        let anonymous = AccessContext::anonymous();
        assert!(Permission::ALL.iter().all(|p| !access.allows(&anonymous, *p)));
    }
}
