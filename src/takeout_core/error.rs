use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TakeoutError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("input path does not exist: {0}")]
    InputNotFound(PathBuf),

    #[error("no media found under {0}")]
    NoMediaFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("directory walker error: {0}")]
    Walkdir(#[from] walkdir::Error),

    #[error("sidecar JSON error: {0}")]
    Sidecar(#[from] serde_json::Error),

    #[error("could not decode media for metadata: {0}")]
    Decode(String),

    #[error("date parsing error: {0}")]
    InvalidDateFormat(String),

    #[error("feature unsupported on this platform: {0}")]
    PlatformUnsupported(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}

pub type Result<T> = std::result::Result<T, TakeoutError>;

impl PartialEq for TakeoutError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TakeoutError::Config(a), TakeoutError::Config(b)) => a == b,
            (TakeoutError::InputNotFound(a), TakeoutError::InputNotFound(b)) => a == b,
            (TakeoutError::NoMediaFound(a), TakeoutError::NoMediaFound(b)) => a == b,
            (TakeoutError::Io(_), TakeoutError::Io(_)) => true,
            (TakeoutError::Walkdir(_), TakeoutError::Walkdir(_)) => true,
            (TakeoutError::Sidecar(_), TakeoutError::Sidecar(_)) => true,
            (TakeoutError::Decode(a), TakeoutError::Decode(b)) => a == b,
            (TakeoutError::InvalidDateFormat(a), TakeoutError::InvalidDateFormat(b)) => a == b,
            (TakeoutError::PlatformUnsupported(a), TakeoutError::PlatformUnsupported(b)) => {
                a == b
            }
            (TakeoutError::Unknown(a), TakeoutError::Unknown(b)) => a == b,
            _ => false,
        }
    }
}
