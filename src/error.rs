//! Error types for percolar

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid device list entry '{token}': expected a non-negative integer")]
    DeviceParse { token: String },

    #[error("Consistency error: {0}")]
    Consistency(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Failed to parse {path}: {message}")]
    DescriptionParse { path: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
