//! pagewright - an embeddable CMS for axum applications
//!
//! Editable pages with optional publishing, posts with categories and tags,
//! moderated comments, revision history and an RSS feed, stored through sqlx
//! in SQLite or MySQL. Build a [`Cms`] over a pool, then mount its editor and
//! public routers in the host application.

pub mod api;
pub mod cache;
pub mod cms;
pub mod config;
pub mod db;
pub mod models;
pub mod services;

pub use cms::{Cms, CmsBuilder};
