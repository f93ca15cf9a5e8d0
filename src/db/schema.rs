//! Schema definition
//!
//! `CREATE TABLE IF NOT EXISTS` statements for the current schema version,
//! one set per backend. Table names are written as `{p}_name` and expanded
//! with the configured prefix. Existing tables are never altered here; that
//! is the job of [`migrations`](super::migrations).

use anyhow::{Context, Result};

use super::tables::Tables;
use super::DynDatabasePool;
use crate::config::DatabaseDriver;

/// (table suffix, DDL) in creation order
const SQLITE_TABLES: &[(&str, &str)] = &[
    (
        "version_history",
        r#"CREATE TABLE IF NOT EXISTS {p}_version_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp DATETIME NOT NULL,
            major_version INTEGER NOT NULL,
            minor_version INTEGER NOT NULL
        )"#,
    ),
    (
        "author",
        r#"CREATE TABLE IF NOT EXISTS {p}_author (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name VARCHAR(255) NOT NULL UNIQUE,
            code VARCHAR(255) NOT NULL UNIQUE
        )"#,
    ),
    (
        "user",
        r#"CREATE TABLE IF NOT EXISTS {p}_user (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name VARCHAR(255) NOT NULL UNIQUE,
            author_id INTEGER NOT NULL UNIQUE REFERENCES {p}_author(id)
        )"#,
    ),
    (
        "category",
        r#"CREATE TABLE IF NOT EXISTS {p}_category (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            post_type VARCHAR(100) NOT NULL,
            name VARCHAR(255) NOT NULL,
            code VARCHAR(255) NOT NULL,
            UNIQUE (post_type, name),
            UNIQUE (post_type, code)
        )"#,
    ),
    (
        "tag",
        r#"CREATE TABLE IF NOT EXISTS {p}_tag (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            post_type VARCHAR(100) NOT NULL,
            name VARCHAR(255) NOT NULL,
            code VARCHAR(255) NOT NULL,
            tag_type VARCHAR(100),
            external_code VARCHAR(255),
            UNIQUE (post_type, name),
            UNIQUE (post_type, code)
        )"#,
    ),
    (
        "post",
        r#"CREATE TABLE IF NOT EXISTS {p}_post (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            post_type VARCHAR(100) NOT NULL,
            created DATETIME NOT NULL,
            published DATETIME,
            category_id INTEGER NOT NULL REFERENCES {p}_category(id),
            title VARCHAR(255) NOT NULL,
            code VARCHAR(255) NOT NULL,
            tagline TEXT NOT NULL,
            content TEXT NOT NULL,
            author_id INTEGER NOT NULL REFERENCES {p}_author(id),
            html_title VARCHAR(255),
            html_description TEXT,
            snippet_title VARCHAR(255),
            snippet_description TEXT,
            snippet_image VARCHAR(500),
            main_image_url VARCHAR(500),
            UNIQUE (post_type, title),
            UNIQUE (post_type, code)
        )"#,
    ),
    (
        "post_tag",
        r#"CREATE TABLE IF NOT EXISTS {p}_post_{p}_tag (
            post_id INTEGER NOT NULL REFERENCES {p}_post(id),
            tag_id INTEGER NOT NULL REFERENCES {p}_tag(id),
            PRIMARY KEY (post_id, tag_id)
        )"#,
    ),
    (
        "post_revision",
        r#"CREATE TABLE IF NOT EXISTS {p}_post_revision (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            post_id INTEGER NOT NULL REFERENCES {p}_post(id),
            timestamp DATETIME NOT NULL,
            user_id INTEGER NOT NULL REFERENCES {p}_user(id),
            revision_notes TEXT,
            title VARCHAR(255) NOT NULL,
            content TEXT NOT NULL
        )"#,
    ),
    (
        "page",
        r#"CREATE TABLE IF NOT EXISTS {p}_page (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            created DATETIME NOT NULL,
            title VARCHAR(255) NOT NULL UNIQUE,
            code VARCHAR(255) NOT NULL UNIQUE,
            content TEXT NOT NULL,
            disabled BOOLEAN NOT NULL,
            author_id INTEGER REFERENCES {p}_author(id),
            published BOOLEAN NOT NULL
        )"#,
    ),
    (
        "page_revision",
        r#"CREATE TABLE IF NOT EXISTS {p}_page_revision (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            page_id INTEGER NOT NULL REFERENCES {p}_page(id),
            timestamp DATETIME NOT NULL,
            user_id INTEGER NOT NULL REFERENCES {p}_user(id),
            revision_notes TEXT,
            content TEXT NOT NULL
        )"#,
    ),
    (
        "published_page",
        r#"CREATE TABLE IF NOT EXISTS {p}_published_page (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            page_id INTEGER NOT NULL UNIQUE REFERENCES {p}_page(id),
            published DATETIME NOT NULL,
            published_by_id INTEGER NOT NULL REFERENCES {p}_author(id),
            title VARCHAR(255) NOT NULL,
            content TEXT NOT NULL
        )"#,
    ),
    (
        "published_page_revision",
        r#"CREATE TABLE IF NOT EXISTS {p}_published_page_revision (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            published_page_id INTEGER NOT NULL REFERENCES {p}_published_page(id),
            timestamp DATETIME NOT NULL,
            user_id INTEGER NOT NULL REFERENCES {p}_user(id),
            revision_notes TEXT,
            content TEXT NOT NULL
        )"#,
    ),
    (
        "comment",
        r#"CREATE TABLE IF NOT EXISTS {p}_comment (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            post_id INTEGER NOT NULL REFERENCES {p}_post(id),
            author_name VARCHAR(255),
            author_email VARCHAR(255),
            author_ip VARCHAR(64),
            author_user_agent TEXT,
            author_id INTEGER REFERENCES {p}_author(id),
            author_user_id INTEGER REFERENCES {p}_user(id),
            edited_by_id INTEGER REFERENCES {p}_author(id),
            edited_by_user_id INTEGER REFERENCES {p}_user(id),
            timestamp DATETIME NOT NULL,
            approved BOOLEAN NOT NULL,
            content TEXT NOT NULL,
            original_content TEXT,
            edit_timestamp DATETIME,
            deleted BOOLEAN NOT NULL,
            reply_to_id INTEGER REFERENCES {p}_comment(id)
        )"#,
    ),
];

const MYSQL_TABLES: &[(&str, &str)] = &[
    (
        "version_history",
        r#"CREATE TABLE IF NOT EXISTS {p}_version_history (
            id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
            timestamp DATETIME(6) NOT NULL,
            major_version BIGINT NOT NULL,
            minor_version BIGINT NOT NULL
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4"#,
    ),
    (
        "author",
        r#"CREATE TABLE IF NOT EXISTS {p}_author (
            id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
            name VARCHAR(255) NOT NULL UNIQUE,
            code VARCHAR(255) NOT NULL UNIQUE
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4"#,
    ),
    (
        "user",
        r#"CREATE TABLE IF NOT EXISTS {p}_user (
            id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
            name VARCHAR(255) NOT NULL UNIQUE,
            author_id BIGINT NOT NULL UNIQUE,
            FOREIGN KEY (author_id) REFERENCES {p}_author(id)
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4"#,
    ),
    (
        "category",
        r#"CREATE TABLE IF NOT EXISTS {p}_category (
            id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
            post_type VARCHAR(100) NOT NULL,
            name VARCHAR(255) NOT NULL,
            code VARCHAR(255) NOT NULL,
            UNIQUE (post_type, name),
            UNIQUE (post_type, code)
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4"#,
    ),
    (
        "tag",
        r#"CREATE TABLE IF NOT EXISTS {p}_tag (
            id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
            post_type VARCHAR(100) NOT NULL,
            name VARCHAR(255) NOT NULL,
            code VARCHAR(255) NOT NULL,
            tag_type VARCHAR(100),
            external_code VARCHAR(255),
            UNIQUE (post_type, name),
            UNIQUE (post_type, code)
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4"#,
    ),
    (
        "post",
        r#"CREATE TABLE IF NOT EXISTS {p}_post (
            id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
            post_type VARCHAR(100) NOT NULL,
            created DATETIME(6) NOT NULL,
            published DATETIME(6),
            category_id BIGINT NOT NULL,
            title VARCHAR(255) NOT NULL,
            code VARCHAR(255) NOT NULL,
            tagline TEXT NOT NULL,
            content MEDIUMTEXT NOT NULL,
            author_id BIGINT NOT NULL,
            html_title VARCHAR(255),
            html_description TEXT,
            snippet_title VARCHAR(255),
            snippet_description TEXT,
            snippet_image VARCHAR(500),
            main_image_url VARCHAR(500),
            UNIQUE (post_type, title),
            UNIQUE (post_type, code),
            FOREIGN KEY (category_id) REFERENCES {p}_category(id),
            FOREIGN KEY (author_id) REFERENCES {p}_author(id)
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4"#,
    ),
    (
        "post_tag",
        r#"CREATE TABLE IF NOT EXISTS {p}_post_{p}_tag (
            post_id BIGINT NOT NULL,
            tag_id BIGINT NOT NULL,
            PRIMARY KEY (post_id, tag_id),
            FOREIGN KEY (post_id) REFERENCES {p}_post(id),
            FOREIGN KEY (tag_id) REFERENCES {p}_tag(id)
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4"#,
    ),
    (
        "post_revision",
        r#"CREATE TABLE IF NOT EXISTS {p}_post_revision (
            id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
            post_id BIGINT NOT NULL,
            timestamp DATETIME(6) NOT NULL,
            user_id BIGINT NOT NULL,
            revision_notes TEXT,
            title VARCHAR(255) NOT NULL,
            content MEDIUMTEXT NOT NULL,
            FOREIGN KEY (post_id) REFERENCES {p}_post(id),
            FOREIGN KEY (user_id) REFERENCES {p}_user(id)
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4"#,
    ),
    (
        "page",
        r#"CREATE TABLE IF NOT EXISTS {p}_page (
            id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
            created DATETIME(6) NOT NULL,
            title VARCHAR(255) NOT NULL UNIQUE,
            code VARCHAR(255) NOT NULL UNIQUE,
            content MEDIUMTEXT NOT NULL,
            disabled BOOLEAN NOT NULL,
            author_id BIGINT,
            published BOOLEAN NOT NULL,
            FOREIGN KEY (author_id) REFERENCES {p}_author(id)
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4"#,
    ),
    (
        "page_revision",
        r#"CREATE TABLE IF NOT EXISTS {p}_page_revision (
            id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
            page_id BIGINT NOT NULL,
            timestamp DATETIME(6) NOT NULL,
            user_id BIGINT NOT NULL,
            revision_notes TEXT,
            content MEDIUMTEXT NOT NULL,
            FOREIGN KEY (page_id) REFERENCES {p}_page(id),
            FOREIGN KEY (user_id) REFERENCES {p}_user(id)
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4"#,
    ),
    (
        "published_page",
        r#"CREATE TABLE IF NOT EXISTS {p}_published_page (
            id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
            page_id BIGINT NOT NULL UNIQUE,
            published DATETIME(6) NOT NULL,
            published_by_id BIGINT NOT NULL,
            title VARCHAR(255) NOT NULL,
            content MEDIUMTEXT NOT NULL,
            FOREIGN KEY (page_id) REFERENCES {p}_page(id),
            FOREIGN KEY (published_by_id) REFERENCES {p}_author(id)
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4"#,
    ),
    (
        "published_page_revision",
        r#"CREATE TABLE IF NOT EXISTS {p}_published_page_revision (
            id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
            published_page_id BIGINT NOT NULL,
            timestamp DATETIME(6) NOT NULL,
            user_id BIGINT NOT NULL,
            revision_notes TEXT,
            content MEDIUMTEXT NOT NULL,
            FOREIGN KEY (published_page_id) REFERENCES {p}_published_page(id),
            FOREIGN KEY (user_id) REFERENCES {p}_user(id)
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4"#,
    ),
    (
        "comment",
        r#"CREATE TABLE IF NOT EXISTS {p}_comment (
            id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
            post_id BIGINT NOT NULL,
            author_name VARCHAR(255),
            author_email VARCHAR(255),
            author_ip VARCHAR(64),
            author_user_agent TEXT,
            author_id BIGINT,
            author_user_id BIGINT,
            edited_by_id BIGINT,
            edited_by_user_id BIGINT,
            timestamp DATETIME(6) NOT NULL,
            approved BOOLEAN NOT NULL,
            content TEXT NOT NULL,
            original_content TEXT,
            edit_timestamp DATETIME(6),
            deleted BOOLEAN NOT NULL,
            reply_to_id BIGINT,
            FOREIGN KEY (post_id) REFERENCES {p}_post(id),
            FOREIGN KEY (author_id) REFERENCES {p}_author(id),
            FOREIGN KEY (author_user_id) REFERENCES {p}_user(id),
            FOREIGN KEY (edited_by_id) REFERENCES {p}_author(id),
            FOREIGN KEY (edited_by_user_id) REFERENCES {p}_user(id),
            FOREIGN KEY (reply_to_id) REFERENCES {p}_comment(id)
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4"#,
    ),
];

fn definitions(driver: DatabaseDriver) -> &'static [(&'static str, &'static str)] {
    match driver {
        DatabaseDriver::Sqlite => SQLITE_TABLES,
        DatabaseDriver::Mysql => MYSQL_TABLES,
    }
}

fn expand(ddl: &str, tables: &Tables) -> String {
    ddl.replace("{p}", &tables.prefix)
}

/// DDL for one table, by suffix (`"comment"`, `"post_tag"`, ...)
pub fn table_ddl(driver: DatabaseDriver, tables: &Tables, suffix: &str) -> Option<String> {
    definitions(driver)
        .iter()
        .find(|(name, _)| *name == suffix)
        .map(|(_, ddl)| expand(ddl, tables))
}

/// Create every table that does not exist yet
pub async fn create_all(pool: &DynDatabasePool, tables: &Tables) -> Result<()> {
    for (name, ddl) in definitions(pool.driver()) {
        pool.execute(&expand(ddl, tables))
            .await
            .with_context(|| format!("Failed to create table {}_{}", tables.prefix, name))?;
    }
    tracing::debug!("CMS tables present with prefix '{}'", tables.prefix);
    Ok(())
}

/// Drop every CMS table
pub async fn drop_all(pool: &DynDatabasePool, tables: &Tables) -> Result<()> {
    for table in tables.creation_order().iter().rev() {
        pool.execute(&format!("DROP TABLE IF EXISTS {}", table))
            .await
            .with_context(|| format!("Failed to drop table {}", table))?;
    }
    tracing::info!("Dropped CMS tables with prefix '{}'", tables.prefix);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::db::Backend;

    async fn table_names(pool: &DynDatabasePool) -> Vec<String> {
        let Backend::Sqlite(sqlite) = pool.backend() else {
            panic!("sqlite expected");
        };
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name")
            .fetch_all(sqlite)
            .await
            .unwrap()
    }

    #[test]
    fn test_definitions_follow_creation_order() {
        let tables = Tables::default();
        let expected: Vec<String> = tables.creation_order().iter().map(|t| t.to_string()).collect();
        for driver in [DatabaseDriver::Sqlite, DatabaseDriver::Mysql] {
            let created: Vec<String> = definitions(driver)
                .iter()
                .map(|(name, _)| match *name {
                    "post_tag" => tables.post_tag.clone(),
                    other => format!("{}_{}", tables.prefix, other),
                })
                .collect();
            assert_eq!(created, expected);
        }
    }

    #[tokio::test]
    async fn test_create_all_is_repeatable() {
        let pool = create_test_pool().await.unwrap();
        let tables = Tables::default();
        create_all(&pool, &tables).await.unwrap();
        create_all(&pool, &tables).await.unwrap();

        let names = table_names(&pool).await;
        assert_eq!(names.len(), 13);
        assert!(names.contains(&"cms_post_cms_tag".to_string()));
    }

    #[tokio::test]
    async fn test_prefixes_do_not_collide() {
        let pool = create_test_pool().await.unwrap();
        create_all(&pool, &Tables::new("cms")).await.unwrap();
        create_all(&pool, &Tables::new("blog")).await.unwrap();
        assert_eq!(table_names(&pool).await.len(), 26);

        drop_all(&pool, &Tables::new("blog")).await.unwrap();
        let names = table_names(&pool).await;
        assert_eq!(names.len(), 13);
        assert!(names.iter().all(|n| n.starts_with("cms_")));
    }

    #[test]
    fn test_table_ddl_lookup() {
        let tables = Tables::new("site");
        let ddl = table_ddl(DatabaseDriver::Mysql, &tables, "comment").unwrap();
        assert!(ddl.contains("CREATE TABLE IF NOT EXISTS site_comment"));
        assert!(ddl.contains("REFERENCES site_comment(id)"));
        assert!(table_ddl(DatabaseDriver::Sqlite, &tables, "nope").is_none());
    }
}
