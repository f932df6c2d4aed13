//! Error types for the simulator

use thiserror::Error;

/// Simulator error type
#[derive(Error, Debug)]
pub enum SimError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Floorplan error: {0}")]
    Floorplan(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),
}

impl From<toml::de::Error> for SimError {
    fn from(e: toml::de::Error) -> Self {
        SimError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SimError>;
