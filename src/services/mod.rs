//! Services layer - business rules
//!
//! Services sit between the HTTP handlers and the repositories. They
//! validate input, coordinate repositories and the cache, fire hooks and
//! report failures through one error enum per entity.

pub mod access;
pub mod author;
pub mod category;
pub mod comment;
pub mod email;
pub mod feed;
pub mod hooks;
pub mod page;
pub mod post;
pub mod snippet;
pub mod tag;
pub mod text;
pub mod user;

pub use access::{AccessContext, AccessControl, DefaultAccessControl, Permission, TokenAccessControl};
pub use author::{AuthorService, AuthorServiceError};
pub use category::{CategoryService, CategoryServiceError};
pub use comment::{CommentOrigin, CommentService, CommentServiceError, PostComments};
pub use email::EmailNotifier;
pub use feed::{FeedError, FeedService};
pub use hooks::{CmsHooks, NoHooks};
pub use page::{PageService, PageServiceError};
pub use post::{PostService, PostServiceError};
pub use snippet::{SnippetImageError, SnippetStore};
pub use tag::{TagService, TagServiceError};
pub use user::{UserService, UserServiceError};
