use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::defaults::*;
use crate::error::{KyrianError, Result};

/// Top-level YAML document: the active profile name, every profile, and
/// frontend settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(rename = "Profile", default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(rename = "Profiles", default)]
    pub profiles: BTreeMap<String, Profile>,
    #[serde(default)]
    pub settings: Settings,
}

impl ConfigDocument {
    /// A document with one empty `Default` profile selected.
    pub fn minimal() -> Self {
        let mut profiles = BTreeMap::new();
        profiles.insert(DEFAULT_PROFILE.to_string(), Profile::default());
        Self {
            profile: Some(DEFAULT_PROFILE.to_string()),
            profiles,
            settings: Settings::default(),
        }
    }

    /// Name of the active profile: the `Profile` key, else `Default`, else
    /// the first profile by name.
    pub fn active_profile_name(&self) -> Result<&str> {
        if let Some(name) = self.profile.as_deref() {
            if self.profiles.contains_key(name) {
                return Ok(name);
            }
            return Err(KyrianError::ProfileNotFound(name.to_string()));
        }
        if self.profiles.contains_key(DEFAULT_PROFILE) {
            return Ok(DEFAULT_PROFILE);
        }
        self.profiles
            .keys()
            .next()
            .map(String::as_str)
            .ok_or_else(|| KyrianError::Config("no profiles defined".into()))
    }

    pub fn active_profile(&self) -> Result<&Profile> {
        let name = self.active_profile_name()?;
        self.profiles
            .get(name)
            .ok_or_else(|| KyrianError::ProfileNotFound(name.to_string()))
    }

    pub fn set_active_profile(&mut self, name: &str) -> Result<()> {
        if !self.profiles.contains_key(name) {
            return Err(KyrianError::ProfileNotFound(name.to_string()));
        }
        self.profile = Some(name.to_string());
        Ok(())
    }
}

/// One backup profile. Keys follow the on-disk names used by the settings
/// form; everything except `Target`/`Source` is handed to the engine as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(rename = "Target", default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(rename = "Source", default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// `None` behaves like `Some(true)`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypt: Option<bool>,
    #[serde(rename = "encrypt-key", default, skip_serializing_if = "Option::is_none")]
    pub encrypt_key: Option<String>,
    #[serde(
        rename = "encrypt-sign-key",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sign_key: Option<String>,
    #[serde(rename = "use-agent", default)]
    pub use_agent: bool,
    #[serde(rename = "selection-flags", default, skip_serializing_if = "Vec::is_empty")]
    pub selection_flags: Vec<String>,
}

impl Profile {
    /// Destination locator, required by every engine action.
    pub fn target(&self) -> Result<&str> {
        non_empty(self.target.as_deref()).ok_or(KyrianError::ConfigIncomplete("Target"))
    }

    /// Source and target, both required by diff and backup.
    pub fn source_and_target(&self) -> Result<(&str, &str)> {
        let source = non_empty(self.source.as_deref()).ok_or(KyrianError::ConfigMissing("Source"))?;
        let target = non_empty(self.target.as_deref()).ok_or(KyrianError::ConfigMissing("Target"))?;
        Ok((source, target))
    }

    /// Display name for the snapshot root: the source directory's base name.
    pub fn source_name(&self) -> String {
        let Some(source) = non_empty(self.source.as_deref()) else {
            return ".".to_string();
        };
        let trimmed = source.trim_end_matches(['/', '\\']);
        Path::new(trimmed)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| source.to_string())
    }

    /// Engine flags shared by every action that touches encrypted data.
    pub fn engine_flags(&self) -> Vec<String> {
        let mut flags = Vec::new();
        if self.use_agent {
            flags.push("--use-agent".to_string());
        }
        if self.encrypt.unwrap_or(true) {
            if let Some(key) = non_empty(self.encrypt_key.as_deref()) {
                flags.push("--encrypt-key".to_string());
                flags.push(key.to_string());
            }
            if let Some(key) = non_empty(self.sign_key.as_deref()) {
                flags.push("--sign-key".to_string());
                flags.push(key.to_string());
            }
        } else {
            flags.push("--no-encryption".to_string());
        }
        flags
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Engine program name or path.
    #[serde(default = "default_engine")]
    pub engine: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// How long a superseded tree build may take to notice cancellation.
    #[serde(default = "default_tree_grace_period_ms")]
    pub tree_grace_period_ms: u64,
    #[serde(default = "default_build_tree")]
    pub build_tree: bool,
    #[serde(default)]
    pub highlight_diffs: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            engine: default_engine(),
            poll_interval_ms: default_poll_interval_ms(),
            tree_grace_period_ms: default_tree_grace_period_ms(),
            build_tree: default_build_tree(),
            highlight_diffs: false,
        }
    }
}

impl Settings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS))
    }

    pub fn tree_grace_period(&self) -> Duration {
        Duration::from_millis(self.tree_grace_period_ms)
    }
}
