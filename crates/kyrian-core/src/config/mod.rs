mod defaults;
mod expand;
mod resolve;
mod types;
mod util;

pub use self::resolve::{
    default_config_path, load_document, load_or_init, resolve_config_path, save_document,
    ConfigSource, CONFIG_ENV_VAR,
};
pub use self::types::{ConfigDocument, Profile, Settings};
pub use self::util::expand_tilde;
