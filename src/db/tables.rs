//! Prefixed table names
//!
//! Every CMS table lives under a configurable prefix so the schema can share a
//! database with the host application. The prefix is validated by
//! [`CmsSettings::validate`](crate::config::CmsSettings::validate) before it is
//! ever spliced into SQL.

/// Table names for one prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tables {
    pub prefix: String,
    pub author: String,
    pub user: String,
    pub category: String,
    pub tag: String,
    pub post: String,
    pub post_tag: String,
    pub post_revision: String,
    pub page: String,
    pub page_revision: String,
    pub published_page: String,
    pub published_page_revision: String,
    pub comment: String,
    pub version_history: String,
}

impl Tables {
    pub fn new(prefix: &str) -> Self {
        let t = |name: &str| format!("{}_{}", prefix, name);
        Self {
            prefix: prefix.to_string(),
            author: t("author"),
            user: t("user"),
            category: t("category"),
            tag: t("tag"),
            post: t("post"),
            // association table keeps the historical `{p}_post_{p}_tag` name
            post_tag: format!("{}_post_{}_tag", prefix, prefix),
            post_revision: t("post_revision"),
            page: t("page"),
            page_revision: t("page_revision"),
            published_page: t("published_page"),
            published_page_revision: t("published_page_revision"),
            comment: t("comment"),
            version_history: t("version_history"),
        }
    }

    /// Tables in an order where every foreign key points backwards.
    pub fn creation_order(&self) -> [&str; 13] {
        [
            self.version_history.as_str(),
            self.author.as_str(),
            self.user.as_str(),
            self.category.as_str(),
            self.tag.as_str(),
            self.post.as_str(),
            self.post_tag.as_str(),
            self.post_revision.as_str(),
            self.page.as_str(),
            self.page_revision.as_str(),
            self.published_page.as_str(),
            self.published_page_revision.as_str(),
            self.comment.as_str(),
        ]
    }
}

impl Default for Tables {
    fn default() -> Self {
        Self::new("cms")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prefix() {
        let tables = Tables::default();
        assert_eq!(tables.post, "cms_post");
        assert_eq!(tables.post_tag, "cms_post_cms_tag");
        assert_eq!(tables.version_history, "cms_version_history");
    }

    #[test]
    fn test_custom_prefix() {
        let tables = Tables::new("site");
        assert_eq!(tables.post_tag, "site_post_site_tag");
        assert!(tables.creation_order().iter().all(|t| t.starts_with("site_")));
    }
}
