//! Harvester error types

use switchyard_common::errors::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("Fact source {source_name} failed: {message}")]
    SourceError { source_name: String, message: String },

    #[error("Processed-set state error for {path}: {message}")]
    StateError { path: String, message: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    App(#[from] AppError),
}

pub type Result<T> = std::result::Result<T, HarvestError>;
