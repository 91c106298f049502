//! Common error types for framexfer

use thiserror::Error;

/// Common result type for framexfer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the framexfer crates
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed TOML configuration file
    #[error("Configuration parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}
