use std::fmt;
use std::path::{Path, PathBuf};

use super::expand::expand_env_placeholders;
use super::types::ConfigDocument;
use crate::error::{KyrianError, Result};
use crate::platform::paths;

pub const CONFIG_ENV_VAR: &str = "KYRIAN_CONFIG";

/// Tracks where the config file was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Explicitly passed via `--config`.
    CliArg(PathBuf),
    /// Set via the `KYRIAN_CONFIG` env var.
    EnvVar(PathBuf),
    /// The per-user default location.
    UserDefault(PathBuf),
}

impl ConfigSource {
    pub fn path(&self) -> &Path {
        match self {
            ConfigSource::CliArg(p) | ConfigSource::EnvVar(p) | ConfigSource::UserDefault(p) => p,
        }
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::CliArg(p) => write!(f, "{} (--config)", p.display()),
            ConfigSource::EnvVar(p) => write!(f, "{} ({CONFIG_ENV_VAR})", p.display()),
            ConfigSource::UserDefault(p) => write!(f, "{} (user)", p.display()),
        }
    }
}

/// `<platform config dir>/kyrian/config.yaml`, e.g. `~/.config/kyrian/config.yaml`.
pub fn default_config_path() -> Option<PathBuf> {
    paths::config_dir().map(|d| d.join("kyrian").join("config.yaml"))
}

/// Resolve which config file to use.
///
/// Priority: CLI arg > `KYRIAN_CONFIG` > per-user default. The file does not
/// have to exist yet.
pub fn resolve_config_path(cli_config: Option<&str>) -> Option<ConfigSource> {
    if let Some(path) = cli_config {
        return Some(ConfigSource::CliArg(PathBuf::from(path)));
    }

    if let Ok(val) = std::env::var(CONFIG_ENV_VAR) {
        if !val.is_empty() {
            return Some(ConfigSource::EnvVar(PathBuf::from(val)));
        }
    }

    default_config_path().map(ConfigSource::UserDefault)
}

/// Read and parse a config document.
pub fn load_document(path: &Path) -> Result<ConfigDocument> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| KyrianError::Config(format!("cannot read '{}': {e}", path.display())))?;
    parse_document(&contents, path)
}

pub(super) fn parse_document(contents: &str, path: &Path) -> Result<ConfigDocument> {
    let expanded = expand_env_placeholders(contents, path)?;
    if expanded.trim().is_empty() {
        return Ok(ConfigDocument::default());
    }
    serde_yaml::from_str(&expanded)
        .map_err(|e| KyrianError::Config(format!("invalid config '{}': {e}", path.display())))
}

/// Write a config document, creating parent directories as needed.
pub fn save_document(document: &ConfigDocument, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let yaml = serde_yaml::to_string(document)
        .map_err(|e| KyrianError::Config(format!("cannot serialize config: {e}")))?;
    std::fs::write(path, yaml)?;
    Ok(())
}

/// Load the document at `path`, writing a minimal one first if the file is
/// missing.
pub fn load_or_init(path: &Path) -> Result<ConfigDocument> {
    if !path.exists() {
        let document = ConfigDocument::minimal();
        save_document(&document, path)?;
        tracing::info!("Created minimal config at {}", path.display());
        return Ok(document);
    }
    load_document(path)
}
