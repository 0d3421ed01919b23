pub(super) const DEFAULT_PROFILE: &str = "Default";

/// Lower bound applied to `poll_interval_ms`.
pub(super) const MIN_POLL_INTERVAL_MS: u64 = 50;

pub(super) fn default_engine() -> String {
    "duplicity".to_string()
}

pub(super) fn default_poll_interval_ms() -> u64 {
    1000
}

pub(super) fn default_tree_grace_period_ms() -> u64 {
    5000
}

pub(super) fn default_build_tree() -> bool {
    true
}
