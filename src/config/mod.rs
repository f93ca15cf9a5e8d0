//! Configuration management
//!
//! Configuration for the pagewright CMS and its demo server.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults. The `cms`
//! section carries the settings a host application would otherwise pass in
//! code (post types, page definitions, snippet and comment behaviour).

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

use crate::services::access::Permission;

static TABLE_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("valid table prefix regex"));

static POST_TYPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9_-]*$").expect("valid post type regex"));

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// CMS behaviour
    #[serde(default)]
    pub cms: CmsSettings,
    /// Editor authentication for the demo server
    #[serde(default)]
    pub editor: EditorConfig,
    /// SMTP notifications
    #[serde(default)]
    pub email: EmailConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin for the editor API
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/pagewright.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache TTL in seconds
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl(),
        }
    }
}

fn default_ttl() -> u64 {
    600
}

/// A page the host application declares as editable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageDef {
    pub code: String,
    pub title: String,
    /// Where the host renders the page, if anywhere
    #[serde(default)]
    pub url: Option<String>,
}

impl PageDef {
    pub fn new(code: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            title: title.into(),
            url: None,
        }
    }
}

/// Settings that shape CMS behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CmsSettings {
    #[serde(default = "default_website_name")]
    pub website_name: String,
    /// Absolute base URL used for RSS links
    #[serde(default = "default_site_url")]
    pub site_url: String,
    #[serde(default = "default_post_types")]
    pub post_types: Vec<String>,
    #[serde(default = "default_table_prefix")]
    pub table_prefix: String,
    #[serde(default = "default_tagline_max_length")]
    pub tagline_max_length: usize,
    #[serde(default = "default_true")]
    pub snippets_enabled: bool,
    #[serde(default = "default_snippet_image_width")]
    pub snippet_image_width: u32,
    #[serde(default = "default_snippet_image_height")]
    pub snippet_image_height: u32,
    /// Directory snippet images are written to
    #[serde(default = "default_snippet_image_dir")]
    pub snippet_image_dir: PathBuf,
    /// Public URL prefix under which `snippet_image_dir` is served
    #[serde(default = "default_snippet_image_url_prefix")]
    pub snippet_image_url_prefix: String,
    #[serde(default = "default_snippet_description_max_length")]
    pub snippet_description_max_length: usize,
    #[serde(default)]
    pub snippet_missing_image_url: Option<String>,
    #[serde(default)]
    pub post_main_image_enabled: bool,
    #[serde(default)]
    pub post_main_image_required: bool,
    #[serde(default)]
    pub post_code_is_editable: bool,
    /// Front-end post URL template; `{code}`, `{post_type}` and `{id}` are substituted
    #[serde(default)]
    pub view_post_url: Option<String>,
    #[serde(default)]
    pub comments_enabled: bool,
    /// Minimum seconds between two comments from one IP on one post
    #[serde(default = "default_comment_rate_limit_secs")]
    pub comment_rate_limit_secs: i64,
    #[serde(default)]
    pub page_publishing_enabled: bool,
    #[serde(default)]
    pub page_defs: Vec<PageDef>,
    #[serde(default = "default_html_title_max_length")]
    pub html_title_max_length: usize,
    #[serde(default = "default_html_description_max_length")]
    pub html_description_max_length: usize,
    #[serde(default = "default_feed_language")]
    pub feed_language: String,
}

impl Default for CmsSettings {
    fn default() -> Self {
        Self {
            website_name: default_website_name(),
            site_url: default_site_url(),
            post_types: default_post_types(),
            table_prefix: default_table_prefix(),
            tagline_max_length: default_tagline_max_length(),
            snippets_enabled: true,
            snippet_image_width: default_snippet_image_width(),
            snippet_image_height: default_snippet_image_height(),
            snippet_image_dir: default_snippet_image_dir(),
            snippet_image_url_prefix: default_snippet_image_url_prefix(),
            snippet_description_max_length: default_snippet_description_max_length(),
            snippet_missing_image_url: None,
            post_main_image_enabled: false,
            post_main_image_required: false,
            post_code_is_editable: false,
            view_post_url: None,
            comments_enabled: false,
            comment_rate_limit_secs: default_comment_rate_limit_secs(),
            page_publishing_enabled: false,
            page_defs: Vec::new(),
            html_title_max_length: default_html_title_max_length(),
            html_description_max_length: default_html_description_max_length(),
            feed_language: default_feed_language(),
        }
    }
}

fn default_website_name() -> String {
    "pagewright".to_string()
}

fn default_site_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_post_types() -> Vec<String> {
    vec!["post".to_string()]
}

fn default_table_prefix() -> String {
    "cms".to_string()
}

fn default_tagline_max_length() -> usize {
    170
}

fn default_true() -> bool {
    true
}

fn default_snippet_image_width() -> u32 {
    350
}

fn default_snippet_image_height() -> u32 {
    200
}

fn default_snippet_image_dir() -> PathBuf {
    PathBuf::from("uploads/cms-snippet-images")
}

fn default_snippet_image_url_prefix() -> String {
    "/uploads/cms-snippet-images".to_string()
}

fn default_snippet_description_max_length() -> usize {
    170
}

fn default_comment_rate_limit_secs() -> i64 {
    120
}

fn default_html_title_max_length() -> usize {
    55
}

fn default_html_description_max_length() -> usize {
    159
}

fn default_feed_language() -> String {
    "en-GB".to_string()
}

impl CmsSettings {
    /// Whether posts have a public URL (needed for RSS).
    pub fn front_end_post_urls_enabled(&self) -> bool {
        self.view_post_url.is_some()
    }

    pub fn is_post_type(&self, post_type: &str) -> bool {
        self.post_types.iter().any(|t| t == post_type)
    }

    /// Render the front-end URL for a post, absolute against `site_url`.
    pub fn post_url(&self, post_type: &str, code: &str, id: i64) -> Option<String> {
        let template = self.view_post_url.as_ref()?;
        let url = template
            .replace("{post_type}", post_type)
            .replace("{code}", code)
            .replace("{id}", &id.to_string());
        Some(self.absolute_url(&url))
    }

    /// Prefix site-relative URLs with `site_url`.
    pub fn absolute_url(&self, url: &str) -> String {
        if url.starts_with('/') {
            format!("{}{}", self.site_url.trim_end_matches('/'), url)
        } else {
            url.to_string()
        }
    }

    /// Check the settings are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !TABLE_PREFIX_RE.is_match(&self.table_prefix) {
            return Err(ConfigError::ValidationError(format!(
                "table_prefix '{}' must start with a letter and contain only letters, digits and underscores",
                self.table_prefix
            )));
        }
        if self.post_types.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one post type must be configured".to_string(),
            ));
        }
        for post_type in &self.post_types {
            if !POST_TYPE_RE.is_match(post_type) {
                return Err(ConfigError::ValidationError(format!(
                    "post type '{}' must be lower-case letters, digits, '-' or '_'",
                    post_type
                )));
            }
        }
        let mut codes = HashSet::new();
        for def in &self.page_defs {
            if def.code.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "page definitions need a code".to_string(),
                ));
            }
            if !codes.insert(def.code.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "page definition '{}' is declared twice",
                    def.code
                )));
            }
        }
        if self.post_main_image_required && !self.post_main_image_enabled {
            return Err(ConfigError::ValidationError(
                "post_main_image_required needs post_main_image_enabled".to_string(),
            ));
        }
        Ok(())
    }
}

/// Bearer-token editor access for the demo server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditorConfig {
    /// Token expected in `Authorization: Bearer <token>`; editor is closed when unset
    #[serde(default)]
    pub token: Option<String>,
    /// CMS user the token logs in as (created on start-up if missing)
    #[serde(default = "default_editor_user")]
    pub user_name: String,
    /// Permissions withheld from the token holder
    #[serde(default)]
    pub denied_permissions: Vec<Permission>,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            token: None,
            user_name: default_editor_user(),
            denied_permissions: Vec::new(),
        }
    }
}

fn default_editor_user() -> String {
    "admin".to_string()
}

/// SMTP settings for comment notifications
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_username: String,
    #[serde(default)]
    pub smtp_password: String,
    #[serde(default)]
    pub from_address: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
    /// Moderator address told about new comments
    #[serde(default)]
    pub notify_address: Option<String>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: String::new(),
            smtp_port: default_smtp_port(),
            smtp_username: String::new(),
            smtp_password: String::new(),
            from_address: String::new(),
            from_name: default_from_name(),
            notify_address: None,
        }
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_name() -> String {
    "pagewright".to_string()
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist or is empty, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            })?;

        config.cms.validate()?;
        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern:
    /// - PAGEWRIGHT_SERVER_HOST
    /// - PAGEWRIGHT_SERVER_PORT
    /// - PAGEWRIGHT_DATABASE_DRIVER
    /// - PAGEWRIGHT_DATABASE_URL
    /// - PAGEWRIGHT_CACHE_TTL_SECONDS
    /// - PAGEWRIGHT_CMS_TABLE_PREFIX
    /// - PAGEWRIGHT_CMS_WEBSITE_NAME
    /// - PAGEWRIGHT_EDITOR_TOKEN
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.cms.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("PAGEWRIGHT_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("PAGEWRIGHT_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }

        if let Ok(driver) = std::env::var("PAGEWRIGHT_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {} // Ignore invalid values
            }
        }
        if let Ok(url) = std::env::var("PAGEWRIGHT_DATABASE_URL") {
            self.database.url = url;
        }

        if let Ok(ttl) = std::env::var("PAGEWRIGHT_CACHE_TTL_SECONDS") {
            if let Ok(ttl) = ttl.parse::<u64>() {
                self.cache.ttl_seconds = ttl;
            }
        }

        if let Ok(prefix) = std::env::var("PAGEWRIGHT_CMS_TABLE_PREFIX") {
            self.cms.table_prefix = prefix;
        }
        if let Ok(name) = std::env::var("PAGEWRIGHT_CMS_WEBSITE_NAME") {
            self.cms.website_name = name;
        }
        if let Ok(token) = std::env::var("PAGEWRIGHT_EDITOR_TOKEN") {
            self.editor.token = Some(token).filter(|t| !t.is_empty());
        }
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared by every test that touches process environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
