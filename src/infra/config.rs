//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

/// Where the durable copy of packages, routes and scans lives
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// JSON files under `store.dir`
    Jsonl,
    /// Process memory only (nothing survives a restart)
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Site identifier used in logs (e.g., "cd-mutum")
    #[serde(default = "default_site_id")]
    pub id: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id: default_site_id() }
    }
}

fn default_site_id() -> String {
    "scanner".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_backend")]
    pub backend: StoreBackend,
    #[serde(default = "default_store_dir")]
    pub dir: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { backend: default_store_backend(), dir: default_store_dir() }
    }
}

fn default_store_backend() -> StoreBackend {
    StoreBackend::Jsonl
}

fn default_store_dir() -> String {
    "data".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Packages per durable upsert
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Bounded queue between the desk and the sync worker
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { chunk_size: default_chunk_size(), queue_size: default_queue_size() }
    }
}

fn default_chunk_size() -> usize {
    1000
}

fn default_queue_size() -> usize {
    1024
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct FeedbackConfig {
    /// Ring the terminal bell on error and warning cues
    #[serde(default)]
    pub bell: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

fn default_metrics_interval() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub feedback: FeedbackConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    store_backend: StoreBackend,
    store_dir: String,
    sync_chunk_size: usize,
    sync_queue_size: usize,
    feedback_bell: bool,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site_id: default_site_id(),
            store_backend: default_store_backend(),
            store_dir: default_store_dir(),
            sync_chunk_size: default_chunk_size(),
            sync_queue_size: default_queue_size(),
            feedback_bell: false,
            metrics_interval_secs: default_metrics_interval(),
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        if toml_config.sync.chunk_size == 0 {
            anyhow::bail!("sync.chunk_size must be at least 1 in {}", path.display());
        }

        Ok(Self {
            site_id: toml_config.site.id,
            store_backend: toml_config.store.backend,
            store_dir: toml_config.store.dir,
            sync_chunk_size: toml_config.sync.chunk_size,
            sync_queue_size: toml_config.sync.queue_size.max(1),
            feedback_bell: toml_config.feedback.bell,
            metrics_interval_secs: toml_config.metrics.interval_secs.max(1),
            config_file: path.display().to_string(),
        })
    }

    /// Load configuration from a path, falling back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}. Using defaults.", e);
                Self::default()
            }
        }
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load(args: &[String]) -> Self {
        Self::load_from_path(&Self::resolve_config_path(args))
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn store_backend(&self) -> StoreBackend {
        self.store_backend
    }

    pub fn store_dir(&self) -> &str {
        &self.store_dir
    }

    pub fn sync_chunk_size(&self) -> usize {
        self.sync_chunk_size
    }

    pub fn sync_queue_size(&self) -> usize {
        self.sync_queue_size
    }

    pub fn feedback_bell(&self) -> bool {
        self.feedback_bell
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.site_id(), "scanner");
        assert_eq!(config.store_backend(), StoreBackend::Jsonl);
        assert_eq!(config.store_dir(), "data");
        assert_eq!(config.sync_chunk_size(), 1000);
        assert_eq!(config.sync_queue_size(), 1024);
        assert!(!config.feedback_bell());
        assert_eq!(config.metrics_interval_secs(), 60);
    }

    #[test]
    fn test_resolve_config_path_from_arg() {
        let args: Vec<String> = vec![
            "route-scanner".to_string(),
            "--config".to_string(),
            "config/mutum.toml".to_string(),
        ];
        assert_eq!(Config::resolve_config_path(&args), "config/mutum.toml");
    }

    #[test]
    fn test_resolve_config_path_from_arg_equals() {
        let args: Vec<String> =
            vec!["route-scanner".to_string(), "--config=config/centro.toml".to_string()];
        assert_eq!(Config::resolve_config_path(&args), "config/centro.toml");
    }

    #[test]
    fn test_empty_toml_uses_section_defaults() {
        let toml_config: TomlConfig = toml::from_str("").unwrap();
        assert_eq!(toml_config.sync.chunk_size, 1000);
        assert_eq!(toml_config.store.backend, StoreBackend::Jsonl);
        assert_eq!(toml_config.site.id, "scanner");
    }
}
