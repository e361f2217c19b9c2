//! Configuration module for the retrieval service.
//!
//! Layered configuration:
//! - Default values
//! - `musea.toml` configuration file
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `MUSEA_` and use double
//! underscores to separate nested levels:
//! - `MUSEA_INDEXES__VOCABULARY_PATH=/data/vocabulary.db`
//! - `MUSEA_HTTP__TIMEOUT_SECS=30`
//! - `MUSEA_SEMANTIC__FILTER_THRESHOLD=10000`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

pub const CONFIG_FILE: &str = "musea.toml";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Local SQLite index locations
    #[serde(default)]
    pub indexes: IndexConfig,

    /// Outbound HTTP behaviour
    #[serde(default)]
    pub http: HttpConfig,

    /// Response cache tuning
    #[serde(default)]
    pub cache: CacheConfig,

    /// Semantic search tuning
    #[serde(default)]
    pub semantic: SemanticConfig,

    /// Remote API endpoints
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndexConfig {
    /// Denormalised artwork + vocabulary mapping store
    #[serde(default = "default_vocabulary_path")]
    pub vocabulary_path: PathBuf,

    /// Int8-quantised artwork embeddings
    #[serde(default = "default_embeddings_path")]
    pub embeddings_path: PathBuf,

    /// Iconclass notation hierarchy
    #[serde(default = "default_iconclass_path")]
    pub iconclass_path: PathBuf,

    /// Loadable SQLite vector extension (enables the KNN virtual tables).
    /// When absent, pure KNN falls back to a full table scan.
    #[serde(default)]
    pub vector_extension: Option<PathBuf>,

    /// Per-connection mmap window in bytes
    #[serde(default = "default_mmap_size")]
    pub mmap_size: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HttpConfig {
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Keep-alive socket ceiling per host
    #[serde(default = "default_max_connections")]
    pub max_connections_per_host: usize,

    /// User-Agent header
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Parallelism ceiling for graph-node resolution batches
    #[serde(default = "default_resolve_concurrency")]
    pub resolve_concurrency: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CacheConfig {
    /// Maximum number of cached responses
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,

    /// TTL for object documents, in seconds
    #[serde(default = "default_object_ttl")]
    pub object_ttl_secs: u64,

    /// TTL for vocabulary term documents, in seconds
    #[serde(default = "default_term_ttl")]
    pub term_ttl_secs: u64,

    /// TTL for image-chain nodes (visual item, digital object, info.json)
    #[serde(default = "default_image_ttl")]
    pub image_ttl_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SemanticConfig {
    /// Candidate-set size above which filtered KNN degrades to
    /// post-filtered pure KNN with an approximation warning
    #[serde(default = "default_filter_threshold")]
    pub filter_threshold: usize,

    /// Hard ceiling on k for any KNN scan
    #[serde(default = "default_max_k")]
    pub max_k: usize,

    /// Instruction prefix prepended to queries before inference
    #[serde(default = "default_query_prefix")]
    pub query_prefix: String,

    /// Model cache directory (defaults to the platform cache dir)
    #[serde(default)]
    pub model_cache_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ApiConfig {
    /// Linked Art API base, e.g. `https://data.rijksmuseum.nl`
    #[serde(default = "default_api_base")]
    pub base_url: String,

    /// Collection search endpoint path
    #[serde(default = "default_search_path")]
    pub search_path: String,

    /// OAI-PMH endpoint
    #[serde(default = "default_oai_url")]
    pub oai_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default level filter (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module overrides, e.g. `vocab = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_vocabulary_path() -> PathBuf {
    PathBuf::from("data/vocabulary.db")
}
fn default_embeddings_path() -> PathBuf {
    PathBuf::from("data/embeddings.db")
}
fn default_iconclass_path() -> PathBuf {
    PathBuf::from("data/iconclass.db")
}
fn default_mmap_size() -> u64 {
    3 * 1024 * 1024 * 1024
}
fn default_timeout_secs() -> u64 {
    15
}
fn default_max_connections() -> usize {
    25
}
fn default_user_agent() -> String {
    format!("musea/{}", env!("CARGO_PKG_VERSION"))
}
fn default_resolve_concurrency() -> usize {
    8
}
fn default_cache_capacity() -> usize {
    500
}
fn default_object_ttl() -> u64 {
    300
}
fn default_term_ttl() -> u64 {
    3600
}
fn default_image_ttl() -> u64 {
    3600
}
fn default_filter_threshold() -> usize {
    50_000
}
fn default_max_k() -> usize {
    4096
}
fn default_query_prefix() -> String {
    "query: ".to_string()
}
fn default_api_base() -> String {
    "https://data.rijksmuseum.nl".to_string()
}
fn default_search_path() -> String {
    "/search/collection".to_string()
}
fn default_oai_url() -> String {
    "https://data.rijksmuseum.nl/oai".to_string()
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            indexes: IndexConfig::default(),
            http: HttpConfig::default(),
            cache: CacheConfig::default(),
            semantic: SemanticConfig::default(),
            api: ApiConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            vocabulary_path: default_vocabulary_path(),
            embeddings_path: default_embeddings_path(),
            iconclass_path: default_iconclass_path(),
            vector_extension: None,
            mmap_size: default_mmap_size(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_connections_per_host: default_max_connections(),
            user_agent: default_user_agent(),
            resolve_concurrency: default_resolve_concurrency(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            object_ttl_secs: default_object_ttl(),
            term_ttl_secs: default_term_ttl(),
            image_ttl_secs: default_image_ttl(),
        }
    }
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            filter_threshold: default_filter_threshold(),
            max_k: default_max_k(),
            query_prefix: default_query_prefix(),
            model_cache_dir: None,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base(),
            search_path: default_search_path(),
            oai_url: default_oai_url(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(CONFIG_FILE)
    }

    /// Load configuration from a specific file.
    pub fn load_from(path: impl AsRef<std::path::Path>) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            // Double underscore separates nested levels; single underscores
            // remain part of the field name.
            .merge(Env::prefixed("MUSEA_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
    }

    /// Save current configuration to file.
    pub fn save(&self, path: impl AsRef<std::path::Path>) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.as_ref().parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;
        Ok(())
    }

    /// Create a default settings file in the current directory.
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = PathBuf::from(CONFIG_FILE);
        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }
        Settings::default().save(&config_path)?;
        Ok(config_path)
    }

    /// Effective HTTP timeout.
    pub fn http_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.http.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.http.timeout_secs, 15);
        assert_eq!(settings.http.max_connections_per_host, 25);
        assert_eq!(settings.cache.capacity, 500);
        assert_eq!(settings.cache.object_ttl_secs, 300);
        assert_eq!(settings.cache.term_ttl_secs, 3600);
        assert_eq!(settings.semantic.filter_threshold, 50_000);
        assert_eq!(settings.semantic.max_k, 4096);
        assert_eq!(settings.semantic.query_prefix, "query: ");
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(CONFIG_FILE);

        let toml_content = r#"
version = 2

[indexes]
vocabulary_path = "/srv/idx/vocabulary.db"

[http]
timeout_secs = 30

[semantic]
filter_threshold = 10000

[logging]
default = "info"
"#;
        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.version, 2);
        assert_eq!(
            settings.indexes.vocabulary_path,
            PathBuf::from("/srv/idx/vocabulary.db")
        );
        assert_eq!(settings.http.timeout_secs, 30);
        assert_eq!(settings.semantic.filter_threshold, 10_000);
        assert_eq!(settings.logging.default, "info");
        // Defaults survive partial files
        assert_eq!(settings.cache.capacity, 500);
        assert_eq!(settings.indexes.embeddings_path, PathBuf::from("data/embeddings.db"));
    }

    #[test]
    fn test_save_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(CONFIG_FILE);

        let mut settings = Settings::default();
        settings.http.timeout_secs = 7;
        settings.cache.capacity = 42;
        settings.save(&config_path).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert_eq!(loaded.http.timeout_secs, 7);
        assert_eq!(loaded.cache.capacity, 42);
    }
}
