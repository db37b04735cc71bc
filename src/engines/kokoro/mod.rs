//! Kokoro-82M text-to-speech engine.
//!
//! Runs the Kokoro-82M ONNX model through ONNX Runtime. Text is converted to
//! IPA by espeak-ng, mapped to token ids with the model's vocabulary and
//! synthesized with a 256-float style vector taken from a voice pack or
//! supplied by the caller (voice cloning).
//!
//! # System Requirements
//!
//! **espeak-ng** must be installed, or its binary and data directory passed
//! via [`EspeakConfig`]:
//! - **Linux**: `sudo apt-get install espeak-ng`
//! - **macOS**: `brew install espeak-ng`
//!
//! # Model Directory Layout
//!
//! ```text
//! voice_models/kokoro/
//! ├── kokoro-quant-convinteger.onnx   # any .onnx works, this name is preferred
//! ├── voices-v1.0.bin                  # voice packs (.npz archive)
//! ├── config.json                      # must carry the "vocab" table
//! └── speaker_encoder.onnx             # optional, enables voice cloning
//! ```
//!
//! Because the phonemizer language is independent of the voice, languages
//! without a native Kokoro voice (Dutch, German) are spoken by borrowing
//! a voice from another language.
//!
//! # Example
//!
//! ```rust,no_run
//! use locus_tts::{SynthesisEngine, engines::kokoro::{KokoroEngine, KokoroInferenceParams}};
//! use std::path::PathBuf;
//!
//! let mut engine = KokoroEngine::new();
//! engine.load_model(&PathBuf::from("data/voice_models/kokoro"))?;
//!
//! let params = KokoroInferenceParams {
//!     voice: "bf_emma".to_string(),
//!     language: Some("nl".to_string()),
//!     ..Default::default()
//! };
//! engine.synthesize_to_file("Goedemorgen!", &PathBuf::from("out.wav"), Some(params))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod error;

pub mod engine;
pub mod model;
pub mod phonemizer;
pub mod tokenizer;
pub mod voices;

pub use engine::{KokoroEngine, KokoroInferenceParams, KokoroModelParams};
pub use error::KokoroError;
pub use model::{SAMPLE_RATE, STYLE_DIM};
pub use phonemizer::EspeakConfig;

/// A Kokoro style vector.
pub type Style = [f32; STYLE_DIM];
