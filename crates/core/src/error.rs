use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating the configuration file.
///
/// All of them are operator misconfiguration: the daemon refuses to start.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Environment variable '{0}' is not set")]
    MissingEnv(String),

    #[error("Validation error: {0}")]
    Validation(String),
}
