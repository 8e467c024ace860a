//! Error types for conch.

use std::io;

/// Errors produced by the conch shell.
#[derive(Debug, thiserror::Error)]
pub enum ConchError {
    #[error("command error: {0}")]
    Command(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("color error: {0}")]
    Color(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ConchError>;
