use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::cli::{Cli, Command};

pub const API_KEY_ENV: &str = "SITEPULSE_PROVIDER_API_KEY";

/// Configuration file structure. All fields are optional so a file can set
/// only what it needs; anything unset falls back to [`Settings::default`].
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Address the HTTP API listens on
    pub listen: Option<String>,

    /// Directory for persisted reports and state
    pub data_dir: Option<PathBuf>,

    /// Default page budget per crawl
    pub max_pages: Option<usize>,

    /// Number of concurrent requests per crawl
    pub concurrency: Option<usize>,

    /// Per-request timeout in seconds
    pub fetch_timeout_secs: Option<u64>,

    /// Upper bound on a whole crawl in seconds
    pub crawl_timeout_secs: Option<u64>,

    /// Response bodies larger than this are rejected
    pub max_body_bytes: Option<usize>,

    /// Rate limit for requests per second
    pub rate_limit: Option<f64>,

    /// Respect robots.txt rules
    pub respect_robots_txt: Option<bool>,

    pub user_agent: Option<String>,

    /// Responses slower than this are reported
    pub slow_response_ms: Option<u64>,

    /// Base URL of the keyword-data provider
    pub provider_url: Option<String>,

    /// Bearer token for the keyword-data provider
    pub provider_api_key: Option<String>,

    /// Minimum keyword similarity for two keywords to share a topic (0-1)
    pub cluster_threshold: Option<f64>,

    /// Number of issues listed in a report's priority fixes
    pub top_fixes_limit: Option<usize>,
}

/// Configuration file format based on file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
    Yaml,
}

impl ConfigFormat {
    /// Detect format from file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| match ext.to_lowercase().as_str() {
                "json" => Some(ConfigFormat::Json),
                "toml" => Some(ConfigFormat::Toml),
                "yaml" | "yml" => Some(ConfigFormat::Yaml),
                _ => None,
            })
    }

    pub fn extensions(&self) -> &[&str] {
        match self {
            ConfigFormat::Json => &["json"],
            ConfigFormat::Toml => &["toml"],
            ConfigFormat::Yaml => &["yaml", "yml"],
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let format = ConfigFormat::from_path(path)
            .with_context(|| format!("Unsupported config file format: {}", path.display()))?;

        let config = match format {
            ConfigFormat::Json => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?,
            ConfigFormat::Toml => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display()))?,
            ConfigFormat::Yaml => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?,
        };

        Ok(config)
    }

    /// Config file locations, highest priority first: the current
    /// directory, then `$XDG_CONFIG_HOME/sitepulse` (or `~/.config/sitepulse`)
    pub fn default_paths() -> Vec<PathBuf> {
        let formats = [ConfigFormat::Json, ConfigFormat::Toml, ConfigFormat::Yaml];
        let mut paths = Vec::new();

        for format in &formats {
            for ext in format.extensions() {
                paths.push(PathBuf::from(format!("sitepulse.{}", ext)));
            }
        }

        let config_home = std::env::var("XDG_CONFIG_HOME")
            .ok()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")));

        if let Some(config_home) = config_home {
            let dir = config_home.join("sitepulse");
            for format in &formats {
                for ext in format.extensions() {
                    paths.push(dir.join(format!("config.{}", ext)));
                }
            }
        }

        paths
    }

    /// Loads the first config file found in [`Config::default_paths`]
    pub fn from_default_paths() -> Result<Option<Self>> {
        for path in Self::default_paths() {
            if path.exists() {
                return Ok(Some(Self::from_file(&path)?));
            }
        }
        Ok(None)
    }

    /// Loads the explicitly requested file, or falls back to the default paths
    pub fn load(explicit: Option<&str>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(Path::new(path)),
            None => Ok(Self::from_default_paths()?.unwrap_or_default()),
        }
    }

    /// Overlays values given on the command line; CLI arguments take
    /// precedence over config file values
    pub fn merge_with_cli(&self, cli: &Cli) -> Config {
        let mut merged = self.clone();
        match &cli.command {
            Command::Serve(args) => {
                merged.listen = args.listen.clone().or(merged.listen);
                merged.data_dir = args.data_dir.clone().or(merged.data_dir);
                merged.provider_url = args.provider_url.clone().or(merged.provider_url);
            }
            Command::Audit(args) => {
                merged.max_pages = args.max_pages.or(merged.max_pages);
                merged.concurrency = args.concurrency.or(merged.concurrency);
                merged.rate_limit = args.rate_limit.or(merged.rate_limit);
                merged.data_dir = args.data_dir.clone().or(merged.data_dir);
                if args.ignore_robots {
                    merged.respect_robots_txt = Some(false);
                }
            }
        }
        merged
    }

    /// Resolves every setting, reading the provider API key from the
    /// environment when the file does not set one
    pub fn into_settings(self) -> Settings {
        let defaults = Settings::default();
        Settings {
            listen: self.listen.unwrap_or(defaults.listen),
            data_dir: self.data_dir.or(defaults.data_dir),
            max_pages: self.max_pages.unwrap_or(defaults.max_pages).max(1),
            concurrency: self.concurrency.unwrap_or(defaults.concurrency).max(1),
            fetch_timeout_secs: self.fetch_timeout_secs.unwrap_or(defaults.fetch_timeout_secs),
            crawl_timeout_secs: self.crawl_timeout_secs.unwrap_or(defaults.crawl_timeout_secs),
            max_body_bytes: self.max_body_bytes.unwrap_or(defaults.max_body_bytes),
            rate_limit: self.rate_limit.filter(|r| *r > 0.0),
            respect_robots_txt: self
                .respect_robots_txt
                .unwrap_or(defaults.respect_robots_txt),
            user_agent: self.user_agent.unwrap_or(defaults.user_agent),
            slow_response_ms: self.slow_response_ms.unwrap_or(defaults.slow_response_ms),
            provider_url: self.provider_url.filter(|u| !u.trim().is_empty()),
            provider_api_key: self
                .provider_api_key
                .or_else(|| std::env::var(API_KEY_ENV).ok())
                .filter(|k| !k.is_empty()),
            cluster_threshold: self
                .cluster_threshold
                .unwrap_or(defaults.cluster_threshold)
                .clamp(0.0, 1.0),
            top_fixes_limit: self.top_fixes_limit.unwrap_or(defaults.top_fixes_limit),
        }
    }
}

/// Fully resolved runtime settings
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub listen: String,
    pub data_dir: Option<PathBuf>,
    pub max_pages: usize,
    pub concurrency: usize,
    pub fetch_timeout_secs: u64,
    pub crawl_timeout_secs: u64,
    pub max_body_bytes: usize,
    pub rate_limit: Option<f64>,
    pub respect_robots_txt: bool,
    pub user_agent: String,
    pub slow_response_ms: u64,
    pub provider_url: Option<String>,
    pub provider_api_key: Option<String>,
    pub cluster_threshold: f64,
    pub top_fixes_limit: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8080".to_string(),
            data_dir: None,
            max_pages: 200,
            concurrency: 5,
            fetch_timeout_secs: 15,
            crawl_timeout_secs: 300,
            max_body_bytes: crate::fetcher::DEFAULT_MAX_BODY_BYTES,
            rate_limit: None,
            respect_robots_txt: true,
            user_agent: crate::http_client::DEFAULT_USER_AGENT.to_string(),
            slow_response_ms: 2000,
            provider_url: None,
            provider_api_key: None,
            cluster_threshold: crate::keywords::cluster::DEFAULT_SIMILARITY_THRESHOLD,
            top_fixes_limit: crate::aggregator::DEFAULT_TOP_FIXES,
        }
    }
}
