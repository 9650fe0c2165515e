use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("IO Error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Invalid configuration file: {0}")]
    InvalidConfig(#[from] serde_yml::Error),
    #[error("No configuration file at {0}. Run `incentive-cli init` to create one.")]
    MissingConfig(PathBuf),
    #[error("A configuration file already exists at {0}. Use --force to overwrite it.")]
    ConfigExists(PathBuf),
    #[error("Promotion {0} is not in the catalog")]
    UnknownPromotion(String),
    #[error("Already joined promotion {0}")]
    AlreadyJoined(String),
}
