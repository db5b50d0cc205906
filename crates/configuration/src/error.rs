use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load settings from defaults, config.toml or the environment: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Invalid setting `{key}`: {reason}")]
    ValidationError { key: &'static str, reason: String },
}
