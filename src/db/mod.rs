//! Database layer
//!
//! The CMS stores everything in the host's database, SQLite or MySQL, under a
//! configurable table prefix.
//!
//! - [`pool`]: one `DatabasePool` trait over both backends
//! - [`tables`]: prefixed table names
//! - [`schema`]: `CREATE TABLE IF NOT EXISTS` for the current schema
//! - [`migrations`]: version check and in-place upgrades of older schemas
//! - [`repositories`]: SQL for each entity
//!
//! # Usage
//!
//! ```ignore
//! use pagewright::config::DatabaseConfig;
//! use pagewright::db::{create_pool, migrations, Tables};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::ensure_schema(&pool, &Tables::new("cms")).await?;
//! pool.ping().await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;
pub mod schema;
pub mod tables;

pub use pool::{
    create_pool, create_test_pool, Backend, DatabasePool, DynDatabasePool, MysqlDatabase, SqliteDatabase,
};
pub use tables::Tables;

/// In-memory database with every CMS table created
#[cfg(test)]
pub(crate) async fn test_database() -> (DynDatabasePool, std::sync::Arc<Tables>) {
    let pool = create_test_pool().await.expect("Failed to create test pool");
    let tables = std::sync::Arc::new(Tables::default());
    migrations::ensure_schema(&pool, &tables)
        .await
        .expect("Failed to create schema");
    (pool, tables)
}
