// Configuration management module
// TOML settings for the embedding provider, collection sources and sync

pub mod interactive;
pub mod settings;

pub use interactive::{run_interactive_config, show_config};
pub use settings::{Config, ConfigError, OllamaConfig, SourceConfig, SyncConfig};

/// Environment variable overriding the configuration directory
pub const CONFIG_DIR_ENV: &str = "SEMANTIC_DB_HOME";

/// Get the configuration directory path
///
/// `SEMANTIC_DB_HOME` wins over the platform configuration directory.
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV) {
        return Ok(dir.into());
    }
    dirs::config_dir()
        .map(|dir| dir.join("semantic-db"))
        .ok_or(ConfigError::DirectoryError)
}
