//! Speech synthesis engines.
//!
//! # Available Engines
//!
//! Enable engines via Cargo features:
//! - `kokoro` - Kokoro TTS (ONNX format, espeak-ng required) and the
//!   speaker encoder used for voice cloning

#[cfg(feature = "kokoro")]
pub mod kokoro;
#[cfg(feature = "kokoro")]
pub(crate) mod onnx;
#[cfg(feature = "kokoro")]
pub mod speaker;
