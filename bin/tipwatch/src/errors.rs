//! Error types for initialization and configuration.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum InitError {
    #[error("io: {0}")]
    Io(#[from] io::Error),

    #[error("unparsable config file: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("config: {0}")]
    MalformedConfig(#[from] ConfigError),

    #[error("failed to build runtime: {0}")]
    RuntimeBuild(#[source] io::Error),

    #[error("failed to create bitcoin client: {0}")]
    BitcoinClientCreation(String),
}

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    /// Tried to traverse into a primitive.
    #[error("can't traverse into non-table key: {key} (at '{path}')")]
    TraverseNonTableAt { key: String, path: String },

    /// Invalid override string.
    #[error("invalid override: '{0}'")]
    InvalidOverride(String),

    /// A value that parses but can't be used.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        reason: &'static str,
    },
}
