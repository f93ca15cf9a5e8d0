//! Version-gated schema migrations
//!
//! The schema version is the newest row of `{p}_version_history`. When it is
//! behind [`SchemaVersion::CURRENT`], [`update_database`] walks forward one
//! minor version at a time and records each version it reaches.
//!
//! Every step is a list of [`SchemaChange`]s that are safe to repeat: adding a
//! column that already exists fails with [`MigrationError::ColumnAlreadyExists`],
//! dropping one that is gone fails with [`MigrationError::ColumnDoesNotExist`],
//! and the step runner treats both as already applied.
//!
//! # Usage
//!
//! ```ignore
//! use pagewright::db::{create_pool, migrations, Tables};
//!
//! let pool = create_pool(&config).await?;
//! let version = migrations::ensure_schema(&pool, &Tables::default()).await?;
//! ```

use anyhow::{anyhow, Context};
use chrono::Utc;
use sqlx::sqlite::SqliteConnection;
use sqlx::{Connection, MySqlPool, Row, SqlitePool};
use std::fmt;
use thiserror::Error;

use super::schema;
use super::tables::Tables;
use super::{Backend, DynDatabasePool};
use crate::config::DatabaseDriver;
use crate::models::{SchemaVersion, VersionHistory};
use crate::services::text::make_code;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Column {table}.{column} already exists")]
    ColumnAlreadyExists { table: String, column: String },

    #[error("Column {table}.{column} does not exist")]
    ColumnDoesNotExist { table: String, column: String },

    #[error("No version history found in {0}")]
    NoVersionHistory(String),

    #[error("Database schema {database} is newer than this library ({library})")]
    DatabaseNewer {
        database: SchemaVersion,
        library: SchemaVersion,
    },

    #[error("Can't update a database with schema major version {0}")]
    UnsupportedMajorVersion(i64),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Column types used by schema changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    VarChar(u32),
    BigInt,
    Boolean,
}

impl ColumnType {
    fn sql(self, driver: DatabaseDriver) -> String {
        match (self, driver) {
            (ColumnType::VarChar(len), _) => format!("VARCHAR({})", len),
            (ColumnType::BigInt, DatabaseDriver::Sqlite) => "INTEGER".to_string(),
            (ColumnType::BigInt, DatabaseDriver::Mysql) => "BIGINT".to_string(),
            (ColumnType::Boolean, _) => "BOOLEAN".to_string(),
        }
    }
}

/// Definition of a column being added
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub sql_type: ColumnType,
    pub not_null: bool,
    pub default: Option<String>,
    /// Table whose `id` this column references
    pub references: Option<String>,
}

impl ColumnDef {
    pub fn nullable(sql_type: ColumnType) -> Self {
        Self {
            sql_type,
            not_null: false,
            default: None,
            references: None,
        }
    }

    pub fn not_null_with_default(sql_type: ColumnType, default: &str) -> Self {
        Self {
            sql_type,
            not_null: true,
            default: Some(default.to_string()),
            references: None,
        }
    }

    pub fn references(mut self, table: &str) -> Self {
        self.references = Some(table.to_string());
        self
    }

    fn sql(&self, driver: DatabaseDriver) -> String {
        let mut sql = self.sql_type.sql(driver);
        if self.not_null {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = &self.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        // MySQL ignores inline REFERENCES, so it gets a named constraint instead
        if let (DatabaseDriver::Sqlite, Some(target)) = (driver, &self.references) {
            sql.push_str(&format!(" REFERENCES {}(id)", target));
        }
        sql
    }
}

/// One alteration of an existing table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaChange {
    AddColumn {
        table: String,
        column: String,
        def: ColumnDef,
    },
    RenameColumn {
        table: String,
        from: String,
        to: String,
    },
    DropColumn {
        table: String,
        column: String,
    },
    SetNotNull {
        table: String,
        column: String,
    },
    DropDefault {
        table: String,
        column: String,
    },
}

impl SchemaChange {
    pub fn add_column(table: &str, column: &str, def: ColumnDef) -> Self {
        Self::AddColumn {
            table: table.to_string(),
            column: column.to_string(),
            def,
        }
    }

    pub fn rename_column(table: &str, from: &str, to: &str) -> Self {
        Self::RenameColumn {
            table: table.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn drop_column(table: &str, column: &str) -> Self {
        Self::DropColumn {
            table: table.to_string(),
            column: column.to_string(),
        }
    }

    pub fn set_not_null(table: &str, column: &str) -> Self {
        Self::SetNotNull {
            table: table.to_string(),
            column: column.to_string(),
        }
    }

    pub fn drop_default(table: &str, column: &str) -> Self {
        Self::DropDefault {
            table: table.to_string(),
            column: column.to_string(),
        }
    }

    fn table(&self) -> &str {
        match self {
            Self::AddColumn { table, .. }
            | Self::RenameColumn { table, .. }
            | Self::DropColumn { table, .. }
            | Self::SetNotNull { table, .. }
            | Self::DropDefault { table, .. } => table,
        }
    }

    /// Column that must exist before the change
    fn source_column(&self) -> &str {
        match self {
            Self::AddColumn { column, .. } => column,
            Self::RenameColumn { from, .. } => from,
            Self::DropColumn { column, .. }
            | Self::SetNotNull { column, .. }
            | Self::DropDefault { column, .. } => column,
        }
    }

    /// Column that must not exist before the change
    fn created_column(&self) -> &str {
        match self {
            Self::RenameColumn { to, .. } => to,
            other => other.source_column(),
        }
    }

    fn already_exists(&self) -> MigrationError {
        MigrationError::ColumnAlreadyExists {
            table: self.table().to_string(),
            column: self.created_column().to_string(),
        }
    }

    fn does_not_exist(&self) -> MigrationError {
        MigrationError::ColumnDoesNotExist {
            table: self.table().to_string(),
            column: self.source_column().to_string(),
        }
    }
}

impl fmt::Display for SchemaChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddColumn { table, column, .. } => write!(f, "add column {}.{}", table, column),
            Self::RenameColumn { table, from, to } => {
                write!(f, "rename column {}.{} to {}", table, from, to)
            }
            Self::DropColumn { table, column } => write!(f, "drop column {}.{}", table, column),
            Self::SetNotNull { table, column } => write!(f, "set {}.{} NOT NULL", table, column),
            Self::DropDefault { table, column } => write!(f, "drop default of {}.{}", table, column),
        }
    }
}

/// Map backend messages for existing / missing columns onto typed errors
fn classify(err: sqlx::Error, change: &SchemaChange) -> MigrationError {
    if let sqlx::Error::Database(db) = &err {
        let message = db.message().to_lowercase();
        if message.contains("duplicate column") {
            return change.already_exists();
        }
        if message.contains("no such column")
            || message.contains("unknown column")
            || message.contains("check that column/key exists")
        {
            return change.does_not_exist();
        }
    }
    MigrationError::Database(err)
}

/// Apply one schema change
pub async fn apply(pool: &DynDatabasePool, change: &SchemaChange) -> Result<(), MigrationError> {
    match pool.backend() {
        Backend::Sqlite(p) => apply_sqlite(p, change).await,
        Backend::Mysql(p) => apply_mysql(p, change).await,
    }
}

/// Apply a change, treating "already exists" / "does not exist" as done
async fn apply_step(pool: &DynDatabasePool, change: SchemaChange) -> Result<(), MigrationError> {
    match apply(pool, &change).await {
        Ok(()) => {
            tracing::debug!("Applied schema change: {}", change);
            Ok(())
        }
        Err(err @ (MigrationError::ColumnAlreadyExists { .. } | MigrationError::ColumnDoesNotExist { .. })) => {
            tracing::info!("Skipping schema change ({}): {}", change, err);
            Ok(())
        }
        Err(err) => Err(err),
    }
}

async fn apply_sqlite(pool: &SqlitePool, change: &SchemaChange) -> Result<(), MigrationError> {
    match change {
        SchemaChange::AddColumn { table, column, def } => {
            let sql = format!(
                "ALTER TABLE {} ADD COLUMN {} {}",
                table,
                column,
                def.sql(DatabaseDriver::Sqlite)
            );
            sqlx::query(&sql)
                .execute(pool)
                .await
                .map_err(|e| classify(e, change))?;
        }
        SchemaChange::RenameColumn { table, from, to } => {
            let sql = format!("ALTER TABLE {} RENAME COLUMN {} TO {}", table, from, to);
            sqlx::query(&sql)
                .execute(pool)
                .await
                .map_err(|e| classify(e, change))?;
        }
        SchemaChange::DropColumn { table, column } => {
            rebuild_sqlite_table(pool, table, |def| {
                if def.drop_column(column) {
                    Ok(())
                } else {
                    Err(change.does_not_exist())
                }
            })
            .await?;
        }
        SchemaChange::SetNotNull { table, column } => {
            rebuild_sqlite_table(pool, table, |def| {
                let col = def.column_mut(column).ok_or_else(|| change.does_not_exist())?;
                col.not_null = true;
                Ok(())
            })
            .await?;
        }
        SchemaChange::DropDefault { table, column } => {
            rebuild_sqlite_table(pool, table, |def| {
                let col = def.column_mut(column).ok_or_else(|| change.does_not_exist())?;
                col.default = None;
                Ok(())
            })
            .await?;
        }
    }
    Ok(())
}

async fn apply_mysql(pool: &MySqlPool, change: &SchemaChange) -> Result<(), MigrationError> {
    match change {
        SchemaChange::AddColumn { table, column, def } => {
            let mut sql = format!(
                "ALTER TABLE {} ADD COLUMN {} {}",
                table,
                column,
                def.sql(DatabaseDriver::Mysql)
            );
            if let Some(target) = &def.references {
                sql.push_str(&format!(
                    ", ADD CONSTRAINT fk_{}_{} FOREIGN KEY ({}) REFERENCES {}(id)",
                    table, column, column, target
                ));
            }
            sqlx::query(&sql)
                .execute(pool)
                .await
                .map_err(|e| classify(e, change))?;
        }
        SchemaChange::RenameColumn { table, from, to } => {
            let sql = format!("ALTER TABLE {} RENAME COLUMN {} TO {}", table, from, to);
            sqlx::query(&sql)
                .execute(pool)
                .await
                .map_err(|e| classify(e, change))?;
        }
        SchemaChange::DropColumn { table, column } => {
            // MySQL refuses to drop a column a foreign key still uses
            for constraint in mysql_foreign_keys(pool, table, column).await? {
                let sql = format!("ALTER TABLE {} DROP FOREIGN KEY {}", table, constraint);
                sqlx::query(&sql).execute(pool).await?;
            }
            let sql = format!("ALTER TABLE {} DROP COLUMN {}", table, column);
            sqlx::query(&sql)
                .execute(pool)
                .await
                .map_err(|e| classify(e, change))?;
        }
        SchemaChange::SetNotNull { table, column } => {
            let column_type = mysql_column_type(pool, table, column)
                .await?
                .ok_or_else(|| change.does_not_exist())?;
            let sql = format!("ALTER TABLE {} MODIFY COLUMN {} {} NOT NULL", table, column, column_type);
            sqlx::query(&sql)
                .execute(pool)
                .await
                .map_err(|e| classify(e, change))?;
        }
        SchemaChange::DropDefault { table, column } => {
            let sql = format!("ALTER TABLE {} ALTER COLUMN {} DROP DEFAULT", table, column);
            sqlx::query(&sql)
                .execute(pool)
                .await
                .map_err(|e| classify(e, change))?;
        }
    }
    Ok(())
}

async fn mysql_column_type(pool: &MySqlPool, table: &str, column: &str) -> Result<Option<String>, MigrationError> {
    let column_type = sqlx::query_scalar(
        "SELECT CAST(COLUMN_TYPE AS CHAR) FROM information_schema.COLUMNS \
         WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? AND COLUMN_NAME = ?",
    )
    .bind(table)
    .bind(column)
    .fetch_optional(pool)
    .await?;
    Ok(column_type)
}

async fn mysql_foreign_keys(pool: &MySqlPool, table: &str, column: &str) -> Result<Vec<String>, MigrationError> {
    let names = sqlx::query_scalar(
        "SELECT CAST(CONSTRAINT_NAME AS CHAR) FROM information_schema.KEY_COLUMN_USAGE \
         WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? AND COLUMN_NAME = ? \
         AND REFERENCED_TABLE_NAME IS NOT NULL",
    )
    .bind(table)
    .bind(column)
    .fetch_all(pool)
    .await?;
    Ok(names)
}

// ---------------------------------------------------------------------------
// SQLite table rebuild
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
struct SqliteColumn {
    name: String,
    decl_type: String,
    not_null: bool,
    default: Option<String>,
    pk: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SqliteForeignKey {
    from: String,
    table: String,
    to: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SqliteIndex {
    sql: String,
    columns: Vec<String>,
}

/// Table definition as reported by SQLite's pragmas
#[derive(Debug, Clone, PartialEq, Eq)]
struct SqliteTableDef {
    name: String,
    columns: Vec<SqliteColumn>,
    foreign_keys: Vec<SqliteForeignKey>,
    uniques: Vec<Vec<String>>,
    indexes: Vec<SqliteIndex>,
    autoincrement: bool,
}

impl SqliteTableDef {
    fn column_mut(&mut self, name: &str) -> Option<&mut SqliteColumn> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    fn drop_column(&mut self, name: &str) -> bool {
        let before = self.columns.len();
        self.columns.retain(|c| c.name != name);
        if self.columns.len() == before {
            return false;
        }
        self.foreign_keys.retain(|fk| fk.from != name);
        self.uniques.retain(|cols| !cols.iter().any(|c| c == name));
        self.indexes.retain(|idx| !idx.columns.iter().any(|c| c == name));
        true
    }

    fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    fn create_sql(&self, table_name: &str) -> String {
        let mut pk: Vec<&SqliteColumn> = self.columns.iter().filter(|c| c.pk > 0).collect();
        pk.sort_by_key(|c| c.pk);

        let mut parts = Vec::new();
        for col in &self.columns {
            let mut part = format!("\"{}\"", col.name);
            if !col.decl_type.is_empty() {
                part.push(' ');
                part.push_str(&col.decl_type);
            }
            if pk.len() == 1 && col.pk == 1 {
                part.push_str(" PRIMARY KEY");
                if self.autoincrement {
                    part.push_str(" AUTOINCREMENT");
                }
            }
            if col.not_null {
                part.push_str(" NOT NULL");
            }
            if let Some(default) = &col.default {
                part.push_str(" DEFAULT ");
                part.push_str(default);
            }
            parts.push(part);
        }
        if pk.len() > 1 {
            parts.push(format!("PRIMARY KEY ({})", quote_list(pk.iter().map(|c| c.name.as_str()))));
        }
        for unique in &self.uniques {
            parts.push(format!("UNIQUE ({})", quote_list(unique.iter().map(String::as_str))));
        }
        for fk in &self.foreign_keys {
            match &fk.to {
                Some(to) => parts.push(format!(
                    "FOREIGN KEY (\"{}\") REFERENCES \"{}\" (\"{}\")",
                    fk.from, fk.table, to
                )),
                None => parts.push(format!("FOREIGN KEY (\"{}\") REFERENCES \"{}\"", fk.from, fk.table)),
            }
        }

        format!("CREATE TABLE \"{}\" (\n    {}\n)", table_name, parts.join(",\n    "))
    }
}

fn quote_list<'a>(names: impl Iterator<Item = &'a str>) -> String {
    names.map(|n| format!("\"{}\"", n)).collect::<Vec<_>>().join(", ")
}

async fn load_sqlite_table(conn: &mut SqliteConnection, table: &str) -> Result<Option<SqliteTableDef>, MigrationError> {
    let create_sql: Option<String> =
        sqlx::query_scalar("SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(table)
            .fetch_optional(&mut *conn)
            .await?;
    let Some(create_sql) = create_sql else {
        return Ok(None);
    };

    let mut columns = Vec::new();
    for row in sqlx::query(&format!("PRAGMA table_info(\"{}\")", table))
        .fetch_all(&mut *conn)
        .await?
    {
        columns.push(SqliteColumn {
            name: row.try_get("name")?,
            decl_type: row.try_get("type")?,
            not_null: row.try_get::<i64, _>("notnull")? != 0,
            default: row.try_get("dflt_value")?,
            pk: row.try_get("pk")?,
        });
    }

    let mut foreign_keys = Vec::new();
    for row in sqlx::query(&format!("PRAGMA foreign_key_list(\"{}\")", table))
        .fetch_all(&mut *conn)
        .await?
    {
        foreign_keys.push(SqliteForeignKey {
            from: row.try_get("from")?,
            table: row.try_get("table")?,
            to: row.try_get("to")?,
        });
    }

    let mut uniques = Vec::new();
    let mut indexes = Vec::new();
    for row in sqlx::query(&format!("PRAGMA index_list(\"{}\")", table))
        .fetch_all(&mut *conn)
        .await?
    {
        let name: String = row.try_get("name")?;
        let origin: String = row.try_get("origin")?;
        let mut index_columns = Vec::new();
        for info in sqlx::query(&format!("PRAGMA index_info(\"{}\")", name))
            .fetch_all(&mut *conn)
            .await?
        {
            if let Some(column) = info.try_get::<Option<String>, _>("name")? {
                index_columns.push(column);
            }
        }
        match origin.as_str() {
            "u" => uniques.push(index_columns),
            "c" => {
                let sql: Option<String> =
                    sqlx::query_scalar("SELECT sql FROM sqlite_master WHERE type = 'index' AND name = ?")
                        .bind(&name)
                        .fetch_optional(&mut *conn)
                        .await?;
                if let Some(sql) = sql {
                    indexes.push(SqliteIndex {
                        sql,
                        columns: index_columns,
                    });
                }
            }
            _ => {}
        }
    }
    // index_list reports newest first
    uniques.reverse();
    indexes.reverse();

    Ok(Some(SqliteTableDef {
        name: table.to_string(),
        columns,
        foreign_keys,
        uniques,
        indexes,
        autoincrement: create_sql.to_uppercase().contains("AUTOINCREMENT"),
    }))
}

/// Rebuild `table` with an edited definition: create the new table, copy the
/// shared columns, drop the old table and rename. Runs on one connection with
/// foreign key enforcement off.
async fn rebuild_sqlite_table<F>(pool: &SqlitePool, table: &str, edit: F) -> Result<(), MigrationError>
where
    F: FnOnce(&mut SqliteTableDef) -> Result<(), MigrationError>,
{
    let mut conn = pool.acquire().await?;
    let current = load_sqlite_table(&mut conn, table)
        .await?
        .ok_or_else(|| anyhow!("Table {} does not exist", table))?;

    let mut target = current.clone();
    edit(&mut target)?;
    if target == current {
        return Ok(());
    }

    sqlx::query("PRAGMA foreign_keys = OFF").execute(&mut *conn).await?;
    let result = copy_into_rebuilt_table(&mut conn, &current, &target).await;
    sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
    result?;

    tracing::debug!("Rebuilt table {}", table);
    Ok(())
}

async fn copy_into_rebuilt_table(
    conn: &mut SqliteConnection,
    current: &SqliteTableDef,
    target: &SqliteTableDef,
) -> Result<(), MigrationError> {
    let temp = format!("{}__rebuild", target.name);
    let shared = quote_list(
        target
            .columns
            .iter()
            .filter(|c| current.has_column(&c.name))
            .map(|c| c.name.as_str()),
    );

    let mut tx = conn.begin().await?;
    sqlx::query(&format!("DROP TABLE IF EXISTS \"{}\"", temp))
        .execute(&mut *tx)
        .await?;
    sqlx::query(&target.create_sql(&temp)).execute(&mut *tx).await?;
    sqlx::query(&format!(
        "INSERT INTO \"{}\" ({}) SELECT {} FROM \"{}\"",
        temp, shared, shared, current.name
    ))
    .execute(&mut *tx)
    .await?;
    sqlx::query(&format!("DROP TABLE \"{}\"", current.name))
        .execute(&mut *tx)
        .await?;
    sqlx::query(&format!("ALTER TABLE \"{}\" RENAME TO \"{}\"", temp, target.name))
        .execute(&mut *tx)
        .await?;
    for index in &target.indexes {
        sqlx::query(&index.sql).execute(&mut *tx).await?;
    }
    tx.commit().await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Inspection
// ---------------------------------------------------------------------------

pub async fn table_exists(pool: &DynDatabasePool, table: &str) -> Result<bool, MigrationError> {
    let count: i64 = match pool.backend() {
        Backend::Sqlite(p) => {
            sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(table)
                .fetch_one(p)
                .await?
        }
        Backend::Mysql(p) => {
            sqlx::query_scalar(
                "SELECT COUNT(*) FROM information_schema.TABLES \
                 WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?",
            )
            .bind(table)
            .fetch_one(p)
            .await?
        }
    };
    Ok(count > 0)
}

pub async fn column_exists(pool: &DynDatabasePool, table: &str, column: &str) -> Result<bool, MigrationError> {
    match pool.backend() {
        Backend::Sqlite(p) => {
            let rows = sqlx::query(&format!("PRAGMA table_info(\"{}\")", table))
                .fetch_all(p)
                .await?;
            for row in rows {
                let name: String = row.try_get("name")?;
                if name == column {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Backend::Mysql(p) => Ok(mysql_column_type(p, table, column).await?.is_some()),
    }
}

/// Table referenced by a foreign key on `table.column`, if any
pub async fn column_references(
    pool: &DynDatabasePool,
    table: &str,
    column: &str,
) -> Result<Option<String>, MigrationError> {
    match pool.backend() {
        Backend::Sqlite(p) => {
            let rows = sqlx::query(&format!("PRAGMA foreign_key_list(\"{}\")", table))
                .fetch_all(p)
                .await?;
            for row in rows {
                let from: String = row.try_get("from")?;
                if from == column {
                    return Ok(Some(row.try_get("table")?));
                }
            }
            Ok(None)
        }
        Backend::Mysql(p) => {
            let referenced = sqlx::query_scalar(
                "SELECT CAST(REFERENCED_TABLE_NAME AS CHAR) FROM information_schema.KEY_COLUMN_USAGE \
                 WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? AND COLUMN_NAME = ? \
                 AND REFERENCED_TABLE_NAME IS NOT NULL LIMIT 1",
            )
            .bind(table)
            .bind(column)
            .fetch_optional(p)
            .await?;
            Ok(referenced)
        }
    }
}

// ---------------------------------------------------------------------------
// Version history
// ---------------------------------------------------------------------------

/// Every recorded version, oldest first
pub async fn version_history(pool: &DynDatabasePool, tables: &Tables) -> Result<Vec<VersionHistory>, MigrationError> {
    let sql = format!(
        "SELECT id, timestamp, major_version, minor_version FROM {} ORDER BY id",
        tables.version_history
    );
    let rows = match pool.backend() {
        Backend::Sqlite(p) => sqlx::query_as::<_, VersionHistory>(&sql).fetch_all(p).await?,
        Backend::Mysql(p) => sqlx::query_as::<_, VersionHistory>(&sql).fetch_all(p).await?,
    };
    Ok(rows)
}

async fn latest_version(pool: &DynDatabasePool, tables: &Tables) -> Result<Option<SchemaVersion>, MigrationError> {
    let sql = format!(
        "SELECT major_version, minor_version FROM {} ORDER BY id DESC LIMIT 1",
        tables.version_history
    );
    let row: Option<(i64, i64)> = match pool.backend() {
        Backend::Sqlite(p) => sqlx::query_as(&sql).fetch_optional(p).await?,
        Backend::Mysql(p) => sqlx::query_as(&sql).fetch_optional(p).await?,
    };
    Ok(row.map(|(major, minor)| SchemaVersion::new(major, minor)))
}

async fn record_version(pool: &DynDatabasePool, tables: &Tables, version: SchemaVersion) -> Result<(), MigrationError> {
    let sql = format!(
        "INSERT INTO {} (timestamp, major_version, minor_version) VALUES (?, ?, ?)",
        tables.version_history
    );
    let now = Utc::now();
    match pool.backend() {
        Backend::Sqlite(p) => {
            sqlx::query(&sql)
                .bind(now)
                .bind(version.major)
                .bind(version.minor)
                .execute(p)
                .await?;
        }
        Backend::Mysql(p) => {
            sqlx::query(&sql)
                .bind(now)
                .bind(version.major)
                .bind(version.minor)
                .execute(p)
                .await?;
        }
    }
    Ok(())
}

/// Read the stored schema version.
///
/// - missing version table: created when `update_db`, otherwise an error
/// - no version row: the current version is recorded when `fix_missing`,
///   otherwise [`MigrationError::NoVersionHistory`]
/// - a version newer than this library is an error
pub async fn check_current_version(
    pool: &DynDatabasePool,
    tables: &Tables,
    fix_missing: bool,
    update_db: bool,
) -> Result<SchemaVersion, MigrationError> {
    if !table_exists(pool, &tables.version_history).await? {
        if !update_db {
            return Err(MigrationError::NoVersionHistory(tables.version_history.clone()));
        }
        let ddl = schema::table_ddl(pool.driver(), tables, "version_history")
            .context("No definition for the version history table")?;
        pool.execute(&ddl).await?;
    }

    let version = match latest_version(pool, tables).await? {
        Some(version) => version,
        None if fix_missing => {
            record_version(pool, tables, SchemaVersion::CURRENT).await?;
            tracing::info!("Recorded CMS schema version {}", SchemaVersion::CURRENT);
            SchemaVersion::CURRENT
        }
        None => return Err(MigrationError::NoVersionHistory(tables.version_history.clone())),
    };

    if version > SchemaVersion::CURRENT {
        return Err(MigrationError::DatabaseNewer {
            database: version,
            library: SchemaVersion::CURRENT,
        });
    }
    Ok(version)
}

/// Bring the schema from `current` up to [`SchemaVersion::CURRENT`].
pub async fn update_database(
    pool: &DynDatabasePool,
    tables: &Tables,
    current: SchemaVersion,
) -> Result<SchemaVersion, MigrationError> {
    if current.major != 0 {
        return Err(MigrationError::UnsupportedMajorVersion(current.major));
    }

    let mut version = current;
    while version < SchemaVersion::CURRENT {
        let next = match version.minor {
            minor if minor <= 0 => {
                add_post_main_image(pool, tables).await?;
                SchemaVersion::new(0, 1)
            }
            1 => {
                move_post_authors_off_users(pool, tables).await?;
                SchemaVersion::new(0, 2)
            }
            _ => {
                add_page_publishing(pool, tables).await?;
                SchemaVersion::new(0, 3)
            }
        };
        record_version(pool, tables, next).await?;
        tracing::info!("Updated CMS schema from {} to {}", version, next);
        version = next;
    }
    Ok(version)
}

/// Create missing tables, then check and update the schema version
pub async fn ensure_schema(pool: &DynDatabasePool, tables: &Tables) -> Result<SchemaVersion, MigrationError> {
    schema::create_all(pool, tables).await?;
    let version = check_current_version(pool, tables, true, true).await?;
    if version.is_current() {
        return Ok(version);
    }
    tracing::info!(
        "CMS schema is at {}, updating to {}",
        version,
        SchemaVersion::CURRENT
    );
    update_database(pool, tables, version).await
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// 0.0 -> 0.1
async fn add_post_main_image(pool: &DynDatabasePool, tables: &Tables) -> Result<(), MigrationError> {
    apply_step(
        pool,
        SchemaChange::add_column(&tables.post, "main_image_url", ColumnDef::nullable(ColumnType::VarChar(500))),
    )
    .await
}

/// 0.1 -> 0.2: users and posts point at authors instead of users
async fn move_post_authors_off_users(pool: &DynDatabasePool, tables: &Tables) -> Result<(), MigrationError> {
    apply_step(
        pool,
        SchemaChange::add_column(
            &tables.user,
            "author_id",
            ColumnDef::nullable(ColumnType::BigInt).references(&tables.author),
        ),
    )
    .await?;
    backfill_user_authors(pool, tables).await?;
    apply_step(pool, SchemaChange::set_not_null(&tables.user, "author_id")).await?;

    if column_references(pool, &tables.post, "author_id").await?.as_deref() == Some(tables.user.as_str()) {
        apply_step(pool, SchemaChange::rename_column(&tables.post, "author_id", "author_id_old")).await?;
    }
    apply_step(
        pool,
        SchemaChange::add_column(
            &tables.post,
            "author_id",
            ColumnDef::nullable(ColumnType::BigInt).references(&tables.author),
        ),
    )
    .await?;
    if column_exists(pool, &tables.post, "author_id_old").await? {
        let sql = format!(
            "UPDATE {post} SET author_id = (SELECT u.author_id FROM {user} u WHERE u.id = {post}.author_id_old) \
             WHERE author_id IS NULL",
            post = tables.post,
            user = tables.user
        );
        pool.execute(&sql).await?;
    }
    apply_step(pool, SchemaChange::set_not_null(&tables.post, "author_id")).await?;
    apply_step(pool, SchemaChange::drop_column(&tables.post, "author_id_old")).await?;

    apply_step(
        pool,
        SchemaChange::add_column(&tables.tag, "tag_type", ColumnDef::nullable(ColumnType::VarChar(100))),
    )
    .await?;
    apply_step(
        pool,
        SchemaChange::add_column(&tables.tag, "external_code", ColumnDef::nullable(ColumnType::VarChar(255))),
    )
    .await?;

    if !column_exists(pool, &tables.comment, "edited_by_user_id").await? {
        tracing::warn!("Recreating {}; existing comments are discarded", tables.comment);
        pool.execute(&format!("DROP TABLE IF EXISTS {}", tables.comment)).await?;
        let ddl = schema::table_ddl(pool.driver(), tables, "comment")
            .context("No definition for the comment table")?;
        pool.execute(&ddl).await?;
    }
    Ok(())
}

/// 0.2 -> 0.3
async fn add_page_publishing(pool: &DynDatabasePool, tables: &Tables) -> Result<(), MigrationError> {
    apply_step(
        pool,
        SchemaChange::add_column(
            &tables.page,
            "author_id",
            ColumnDef::nullable(ColumnType::BigInt).references(&tables.author),
        ),
    )
    .await?;
    apply_step(
        pool,
        SchemaChange::add_column(
            &tables.page,
            "published",
            ColumnDef::not_null_with_default(ColumnType::Boolean, "FALSE"),
        ),
    )
    .await?;
    apply_step(pool, SchemaChange::drop_default(&tables.page, "published")).await
}

/// Give every user without an author one of their own
async fn backfill_user_authors(pool: &DynDatabasePool, tables: &Tables) -> Result<(), MigrationError> {
    let sql = format!("SELECT id, name FROM {} WHERE author_id IS NULL ORDER BY id", tables.user);
    let users: Vec<(i64, String)> = match pool.backend() {
        Backend::Sqlite(p) => sqlx::query_as(&sql).fetch_all(p).await?,
        Backend::Mysql(p) => sqlx::query_as(&sql).fetch_all(p).await?,
    };

    let update = format!("UPDATE {} SET author_id = ? WHERE id = ?", tables.user);
    for (user_id, name) in users {
        let author_id = find_or_create_author(pool, tables, &name).await?;
        match pool.backend() {
            Backend::Sqlite(p) => {
                sqlx::query(&update).bind(author_id).bind(user_id).execute(p).await?;
            }
            Backend::Mysql(p) => {
                sqlx::query(&update).bind(author_id).bind(user_id).execute(p).await?;
            }
        }
        tracing::info!("Linked user '{}' to author {}", name, author_id);
    }
    Ok(())
}

async fn find_or_create_author(pool: &DynDatabasePool, tables: &Tables, name: &str) -> Result<i64, MigrationError> {
    let code = make_code(name, true);
    let select = format!("SELECT id FROM {} WHERE name = ? OR code = ? LIMIT 1", tables.author);
    let insert = format!("INSERT INTO {} (name, code) VALUES (?, ?)", tables.author);

    let id = match pool.backend() {
        Backend::Sqlite(p) => {
            let existing: Option<i64> = sqlx::query_scalar(&select).bind(name).bind(&code).fetch_optional(p).await?;
            match existing {
                Some(id) => id,
                None => sqlx::query(&insert).bind(name).bind(&code).execute(p).await?.last_insert_rowid(),
            }
        }
        Backend::Mysql(p) => {
            let existing: Option<i64> = sqlx::query_scalar(&select).bind(name).bind(&code).fetch_optional(p).await?;
            match existing {
                Some(id) => id,
                None => sqlx::query(&insert).bind(name).bind(&code).execute(p).await?.last_insert_id() as i64,
            }
        }
    };
    Ok(id)
}
