use thiserror::Error;

use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Session runner has shut down")]
    RunnerClosed,
}

pub type Result<T> = std::result::Result<T, ChatError>;

impl From<config::ConfigError> for ChatError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
