use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DonationError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("donation session stopped")]
    SessionStopped,
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type DonationResult<T> = Result<T, DonationError>;
