//! # locus-tts
//!
//! Multilingual text-to-speech and voice cloning behind a small HTTP API.
//!
//! The neural work runs inside ONNX graphs executed by ONNX Runtime (the
//! Kokoro-82M acoustic model and an optional style encoder for cloning).
//! This crate keeps those models resident, turns requests into model calls
//! and manages the audio files that come out of them.
//!
//! ## Features
//!
//! - **Kokoro TTS** (`kokoro`): ONNX synthesis engine, espeak-ng phonemization
//! - **Voice cloning**: reference audio is encoded into a Kokoro style vector
//! - **HTTP service** (`server`): axum endpoints for generation, cloning,
//!   audio download and voice sample uploads
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::path::Path;
//! use locus_tts::{config::ServiceConfig, service::TtsService};
//!
//! let config = ServiceConfig::load(None)?;
//! config.ensure_dirs()?;
//! let service = TtsService::load(&config)?;
//!
//! let wav = service.generate_speech("Hallo wereld", "nl", None, None)?;
//! println!("{:?}", service.audio_info(&wav));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod audio;
pub mod config;
pub mod engines;
pub mod error;
pub mod language;
pub mod service;

#[cfg(feature = "server")]
pub mod server;

pub use audio::AudioInfo;
pub use error::{Error, Result};

use std::path::Path;

/// Mono audio produced by a speech model.
#[derive(Debug, Clone)]
pub struct SynthesisResult {
    pub samples: Vec<f32>,
    /// 24000 for Kokoro.
    pub sample_rate: u32,
}

impl SynthesisResult {
    /// Save as a mono 32-bit float WAV.
    pub fn write_wav(&self, path: &Path) -> std::result::Result<(), hound::Error> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(path, spec)?;
        for &sample in &self.samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()
    }

    /// Length in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// A neural speech engine that loads weights from a directory and turns
/// text into audio.
///
/// The HTTP service does not drive engines directly; it wraps them in
/// [`service::SpeechModel`] implementations.
pub trait SynthesisEngine {
    /// Per-request options such as voice, speed, language or style.
    type SynthesisParams;
    /// Load-time options such as thread count and graph cache location.
    type ModelParams: Default;
    type Error: std::error::Error + From<hound::Error>;

    /// Load with default [`Self::ModelParams`].
    fn load_model(&mut self, model_path: &Path) -> std::result::Result<(), Self::Error> {
        self.load_model_with_params(model_path, Self::ModelParams::default())
    }

    /// Load the model found in `model_path`, replacing any loaded one.
    fn load_model_with_params(
        &mut self,
        model_path: &Path,
        params: Self::ModelParams,
    ) -> std::result::Result<(), Self::Error>;

    /// Drop the loaded model and its sessions.
    fn unload_model(&mut self);

    /// Speak `text`; `None` uses the engine's default parameters.
    fn synthesize(
        &mut self,
        text: &str,
        params: Option<Self::SynthesisParams>,
    ) -> std::result::Result<SynthesisResult, Self::Error>;

    /// [`Self::synthesize`] straight to a WAV file.
    fn synthesize_to_file(
        &mut self,
        text: &str,
        wav_path: &Path,
        params: Option<Self::SynthesisParams>,
    ) -> std::result::Result<(), Self::Error> {
        self.synthesize(text, params)?.write_wav(wav_path)?;
        Ok(())
    }
}
