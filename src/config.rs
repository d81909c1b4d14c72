// Service configuration, loaded once at startup from TOML

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::downloader::{ExtractorConfig, ExtractorMode, RelaySettings};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub extractor: ExtractorConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Downloads relayed at the same time; more are answered with 503
    pub max_concurrent_downloads: usize,
    /// Metadata lookups running at the same time; more are answered with 503
    pub max_concurrent_metadata: usize,
    /// Longest pause in a media stream before the download is failed
    pub idle_timeout_secs: u64,
    /// Wait for yt-dlp to exit after its last byte
    pub exit_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 10000,
            max_concurrent_downloads: 4,
            max_concurrent_metadata: 16,
            idle_timeout_secs: 60,
            exit_grace_secs: 5,
        }
    }
}

impl ServerConfig {
    pub fn relay_settings(&self) -> RelaySettings {
        RelaySettings {
            max_sessions: self.max_concurrent_downloads,
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            exit_grace: Duration::from_secs(self.exit_grace_secs),
        }
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;
    Ok(config)
}

/// Load config from the given path, the default locations, or defaults
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    for path in default_paths() {
        if path.exists() {
            tracing::info!("Loading config from {:?}", path);
            return load_config(&path);
        }
    }

    Ok(Config::default())
}

fn default_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("./media-relay.toml")];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("media-relay").join("config.toml"));
    }
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".config").join("media-relay").join("config.toml"));
    }
    paths.dedup();
    paths
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    let server = &config.server;
    if server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }
    if server.max_concurrent_downloads == 0 || server.max_concurrent_metadata == 0 {
        anyhow::bail!("Concurrency limits must be at least 1");
    }
    if server.idle_timeout_secs == 0 || server.exit_grace_secs == 0 {
        anyhow::bail!("Relay timeouts must be at least 1 second");
    }

    let extractor = &config.extractor;
    if extractor.metadata_timeout_secs == 0 || extractor.socket_timeout_secs == 0 {
        anyhow::bail!("Extractor timeouts must be at least 1 second");
    }
    if extractor.mode == ExtractorMode::Remote {
        match extractor.remote_url.as_deref() {
            None | Some("") => anyhow::bail!("Extractor mode 'remote' requires remote_url"),
            Some(url) => {
                url::Url::parse(url).with_context(|| format!("Invalid remote_url: {}", url))?;
            }
        }
    }
    if let Some(path) = &extractor.cookies_path {
        if !Path::new(path).exists() {
            tracing::warn!("Cookies file does not exist: {}", path);
        }
    }

    Ok(())
}
