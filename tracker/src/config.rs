//! Configuration loading

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::machine::{MachineConfig, DEFAULT_MAX_PUBLISH_ATTEMPTS};
use crate::runner::RunnerConfig;

/// Config file name looked up by `TrackerConfig::load`
pub const CONFIG_FILE: &str = ".powr.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("publish.max_attempts must be at least 1")]
    ZeroAttempts,
}

/// Find a config file by walking up the directory tree, then checking global config.
///
/// Search order:
/// 1. Current directory and parent directories (walking up to root)
/// 2. Global config at ~/.config/powr/
fn find_config_file(filename: &str) -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let candidate = current.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_path = config_dir.join("powr").join(filename);
        if global_path.exists() {
            return Some(global_path);
        }
    }

    None
}

/// Root for default data files
fn data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("powr"))
        .unwrap_or_else(|| PathBuf::from(".powr"))
}

/// Top-level configuration (from .powr.toml)
#[derive(Debug, Default, Deserialize)]
pub struct TrackerConfig {
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub publish: PublishSection,
    #[serde(default)]
    pub resolver: ResolverSection,
    #[serde(default)]
    pub identity: IdentitySection,
    #[serde(default)]
    pub storage: StorageSection,
}

#[derive(Debug, Deserialize)]
pub struct SessionSection {
    #[serde(default = "default_true")]
    pub show_summary: bool,
}

#[derive(Debug, Deserialize)]
pub struct PublishSection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_publish_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct ResolverSection {
    #[serde(default = "default_resolve_timeout")]
    pub timeout_secs: u64,
}

/// Signing identity
#[derive(Debug, Deserialize)]
pub struct IdentitySection {
    #[serde(default = "default_pubkey")]
    pub pubkey: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct StorageSection {
    pub library: Option<PathBuf>,
    pub outbox: Option<PathBuf>,
    pub snapshot: Option<PathBuf>,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_PUBLISH_ATTEMPTS
}

fn default_publish_timeout() -> u64 {
    30
}

fn default_resolve_timeout() -> u64 {
    15
}

fn default_pubkey() -> String {
    "local".to_string()
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            show_summary: default_true(),
        }
    }
}

impl Default for PublishSection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            timeout_secs: default_publish_timeout(),
        }
    }
}

impl Default for ResolverSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_resolve_timeout(),
        }
    }
}

impl Default for IdentitySection {
    fn default() -> Self {
        Self {
            pubkey: default_pubkey(),
        }
    }
}

impl StorageSection {
    pub fn library_path(&self) -> PathBuf {
        self.library
            .clone()
            .unwrap_or_else(|| data_dir().join("library.json"))
    }

    pub fn outbox_path(&self) -> PathBuf {
        self.outbox
            .clone()
            .unwrap_or_else(|| data_dir().join("outbox.jsonl"))
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.snapshot
            .clone()
            .unwrap_or_else(|| data_dir().join("session.json"))
    }
}

impl TrackerConfig {
    /// Load config from .powr.toml
    ///
    /// Search order:
    /// 1. Walk up directory tree from cwd looking for .powr.toml
    /// 2. Check ~/.config/powr/.powr.toml (global fallback)
    /// 3. Built-in defaults
    pub fn load() -> Result<Self, ConfigError> {
        if let Some(config_path) = find_config_file(CONFIG_FILE) {
            tracing::debug!("Loading config from: {}", config_path.display());
            return Self::load_from_path(&config_path);
        }

        tracing::debug!("No {} found, using defaults", CONFIG_FILE);
        Ok(Self::default())
    }

    /// Load from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    /// Parse and validate TOML content
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: TrackerConfig = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        if config.publish.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        Ok(config)
    }

    pub fn machine_config(&self) -> MachineConfig {
        MachineConfig {
            max_publish_attempts: self.publish.max_attempts,
            show_summary: self.session.show_summary,
        }
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            resolve_timeout: Duration::from_secs(self.resolver.timeout_secs),
            publish_timeout: Duration::from_secs(self.publish.timeout_secs),
        }
    }
}
