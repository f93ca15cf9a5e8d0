//! Database repositories
//!
//! One repository per entity. Each is a trait plus an sqlx implementation
//! that runs the same SQL against SQLite or MySQL and resolves table names
//! through [`Tables`](crate::db::Tables).

pub mod author;
pub mod category;
pub mod comment;
pub mod page;
pub mod post;
pub mod tag;
pub mod user;

pub use author::{AuthorRepository, SqlxAuthorRepository};
pub use category::{CategoryRepository, SqlxCategoryRepository};
pub use comment::{CommentRepository, SqlxCommentRepository};
pub use page::{PageContentUpdate, PageRepository, SqlxPageRepository};
pub use post::{Adjacent, PostRepository, SqlxPostRepository};
pub use tag::{SqlxTagRepository, TagRepository};
pub use user::{SqlxUserRepository, UserRepository};
