use std::path::PathBuf;

use crate::platform::paths;

/// Expand a leading `~` or `~/` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = paths::home_dir() {
            return home;
        }
    }
    if let Some(suffix) = path.strip_prefix("~/") {
        if let Some(home) = paths::home_dir() {
            return home.join(suffix);
        }
    }
    PathBuf::from(path)
}
