//! Data models
//!
//! Database entities for the CMS schema plus the inputs and views built
//! from them. Entities derive `sqlx::FromRow` so one struct maps rows from
//! either backend.

mod author;
mod category;
mod comment;
mod page;
mod pagination;
mod post;
mod revision;
mod tag;
mod user;
mod version;

pub use author::{Author, AuthorInput};
pub use category::{Category, CreateCategoryInput, UpdateCategoryInput};
pub use comment::{gravatar_url, Comment, CommentSubmission, CommentView, CommentViewer};
pub use page::{Page, PublicPage, PublishedPage, SavePageInput};
pub use pagination::{ListParams, PagedResult};
pub use post::{Post, PostDetail, PostFilter, PostSeoInput, PublicationState, SavePostInput, SnippetInput};
pub use revision::{restore_notes, History, PageRevision, PostRevision, PublishedPageRevision};
pub use tag::Tag;
pub use user::CmsUser;
pub use version::{SchemaVersion, VersionHistory};
