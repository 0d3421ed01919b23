use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, KyrianError>;

#[derive(Debug, Error)]
pub enum KyrianError {
    #[error("configuration incomplete: '{0}' is not set for the active profile")]
    ConfigIncomplete(&'static str),

    #[error("configuration missing: '{0}' is required for this operation")]
    ConfigMissing(&'static str),

    #[error("destination '{}' exists and is not empty", .0.display())]
    DestinationNotEmpty(PathBuf),

    #[error("file listing out of order: parent of '{0}' has not been seen")]
    PathBroken(String),

    #[error("engine {action} failed{}: {message}", .code.map(|c| format!(" (exit code {c})")).unwrap_or_default())]
    Engine {
        action: &'static str,
        code: Option<i32>,
        message: String,
    },

    #[error("cannot parse engine output: {0}")]
    Parse(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("profile not found: '{0}'")]
    ProfileNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl KyrianError {
    /// Exit code reported by the engine, when the failure came from it.
    pub fn engine_code(&self) -> Option<i32> {
        match self {
            KyrianError::Engine { code, .. } => *code,
            _ => None,
        }
    }

    /// Configuration problems are reported synchronously and never start a task.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            KyrianError::ConfigIncomplete(_)
                | KyrianError::ConfigMissing(_)
                | KyrianError::Config(_)
                | KyrianError::ProfileNotFound(_)
        )
    }
}
