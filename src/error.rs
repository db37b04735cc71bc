//! Service-level error type.

#[cfg(feature = "kokoro")]
use crate::engines::kokoro::KokoroError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
    #[error("Audio decode error: {0}")]
    Decode(#[from] symphonia::core::errors::Error),
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[cfg(feature = "kokoro")]
    #[error(transparent)]
    Kokoro(#[from] KokoroError),
    #[error("Model '{0}' is not loaded")]
    ModelNotLoaded(String),
    #[error("Voice cloning model not loaded")]
    CloningUnavailable,
    #[error("Invalid reference audio: {0}")]
    InvalidReference(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Resampling failed: {0}")]
    Resample(String),
}
