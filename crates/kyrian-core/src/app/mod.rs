use crate::config::{self, ConfigDocument, ConfigSource, Profile, Settings};
use crate::coordinator::{CoordinatorOptions, TaskCoordinator};
use crate::engine::{DuplicityDriver, EngineGateway};
use crate::error::{KyrianError, Result};

/// The loaded configuration document and where it came from.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub source: ConfigSource,
    pub document: ConfigDocument,
}

impl RuntimeConfig {
    pub fn profile_name(&self) -> Result<&str> {
        self.document.active_profile_name()
    }

    pub fn profile(&self) -> Result<&Profile> {
        self.document.active_profile()
    }

    pub fn settings(&self) -> &Settings {
        &self.document.settings
    }

    /// Gateway over the configured engine program for the active profile.
    pub fn gateway(&self) -> Result<EngineGateway> {
        let driver = DuplicityDriver::new(self.settings().engine.clone());
        Ok(EngineGateway::new(self.profile()?.clone(), Box::new(driver)))
    }

    pub fn coordinator(&self) -> Result<TaskCoordinator> {
        Ok(TaskCoordinator::new(
            self.gateway()?,
            CoordinatorOptions::from(self.settings()),
        ))
    }

    /// Make `name` the active profile and save the document.
    pub fn use_profile(&mut self, name: &str) -> Result<()> {
        self.document.set_active_profile(name)?;
        config::save_document(&self.document, self.source.path())
    }
}

/// Resolve and load the configuration. A missing file at the per-user
/// default location is created with a minimal document; an explicitly named
/// file must exist.
pub fn load_runtime_config(config_path: Option<&str>) -> Result<RuntimeConfig> {
    let source = config::resolve_config_path(config_path).ok_or_else(|| {
        KyrianError::Config("cannot determine a configuration directory".into())
    })?;
    let document = match &source {
        ConfigSource::UserDefault(path) => config::load_or_init(path)?,
        other => config::load_document(other.path())?,
    };
    tracing::debug!(config = %source, "configuration loaded");
    Ok(RuntimeConfig { source, document })
}
