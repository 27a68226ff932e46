//! Error types for beatkeeper

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BeatkeeperError {
    #[error("Invalid time signature: {0}")]
    InvalidTimeSignature(String),
    #[error("Unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },
    #[error("Audio input error: {0}")]
    Input(String),
    #[error("Render error: {0}")]
    Render(String),
}

pub type Result<T> = std::result::Result<T, BeatkeeperError>;
