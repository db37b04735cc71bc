//! Service configuration.
//!
//! Values come from built-in defaults, an optional TOML file and
//! `LOCUS_TTS_*` environment variables, in that order of precedence.
//! Nested keys use a double underscore:
//!
//! ```text
//! LOCUS_TTS_PORT=9000
//! LOCUS_TTS_MULTILINGUAL__VOICE=bf_emma
//! LOCUS_TTS_LANGUAGES__ES__VOICE=ef_dora
//! ```
//!
//! Setting any `languages` entry replaces the default language table.
//! Languages keep the order they are written in, which is the order models
//! load and are listed in.

use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use derive_builder::Builder;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::language;

/// Conventional file name of the speaker encoder inside a model directory.
pub const SPEAKER_ENCODER_FILE: &str = "speaker_encoder.onnx";

#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
#[builder(default, setter(into))]
#[serde(default)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,

    /// Root for model directories and compiled graph caches.
    pub models_dir: PathBuf,
    /// Generated speech, served by `/audio/{filename}`.
    pub output_dir: PathBuf,
    /// Uploaded speaker references and voice samples.
    pub samples_dir: PathBuf,
    pub cache_dir: PathBuf,

    pub multilingual: MultilingualConfig,
    /// Per-language models, keyed by service language code.
    pub languages: IndexMap<String, LanguageConfig>,
    pub espeak: EspeakSettings,

    /// Largest accepted request body.
    pub max_upload_bytes: usize,
    /// Most files accepted by one `/process_samples` request.
    pub max_samples: usize,
}

/// The multilingual model, which also serves voice cloning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MultilingualConfig {
    /// Defaults to `<models_dir>/kokoro`.
    pub model_dir: Option<PathBuf>,
    pub voice: String,
    /// Defaults to `speaker_encoder.onnx` in the model directory, if present.
    pub speaker_encoder: Option<PathBuf>,
    pub num_threads: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LanguageConfig {
    pub voice: String,
    /// Separate model weights for this language; shares the multilingual
    /// model when unset.
    #[serde(default)]
    pub model_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EspeakSettings {
    pub bin_path: Option<PathBuf>,
    pub data_path: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let data = PathBuf::from("data");
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            models_dir: data.join("voice_models"),
            output_dir: data.join("tts_output"),
            samples_dir: data.join("voice_samples"),
            cache_dir: data.join(".cache"),
            multilingual: MultilingualConfig::default(),
            languages: default_languages(),
            espeak: EspeakSettings::default(),
            max_upload_bytes: 50 * 1024 * 1024,
            max_samples: 10,
        }
    }
}

impl Default for MultilingualConfig {
    fn default() -> Self {
        Self {
            model_dir: None,
            voice: "af_heart".to_string(),
            speaker_encoder: None,
            num_threads: None,
        }
    }
}

fn default_languages() -> IndexMap<String, LanguageConfig> {
    // Kokoro ships no Dutch or German voices; those borrow English ones.
    [
        ("nl", "bf_emma"),
        ("en", "af_heart"),
        ("de", "bm_george"),
        ("fr", "ff_siwis"),
    ]
    .into_iter()
    .map(|(code, voice)| {
        (
            code.to_string(),
            LanguageConfig {
                voice: voice.to_string(),
                model_dir: None,
            },
        )
    })
    .collect()
}

impl ServiceConfig {
    /// Load configuration from an optional file plus the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let config: Self = builder
            .add_source(
                Environment::with_prefix("LOCUS_TTS")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| -> Result<()> {
            Err(Error::Config(config::ConfigError::Message(msg)))
        };

        if self.host.trim().is_empty() {
            return invalid("host must not be empty".to_string());
        }
        if self.port == 0 {
            return invalid("port must be non-zero".to_string());
        }
        if self.multilingual.voice.trim().is_empty() {
            return invalid("multilingual.voice must not be empty".to_string());
        }
        if self.max_samples == 0 {
            return invalid("max_samples must be at least 1".to_string());
        }
        for (code, lang) in &self.languages {
            if !language::is_supported(code) {
                return invalid(format!("languages.{code}: unsupported language"));
            }
            if lang.voice.trim().is_empty() {
                return invalid(format!("languages.{code}.voice must not be empty"));
            }
        }
        Ok(())
    }

    /// Apply command-line bind overrides and check the result again.
    pub fn with_bind(mut self, host: Option<String>, port: Option<u16>) -> Result<Self> {
        if let Some(host) = host {
            self.host = host;
        }
        if let Some(port) = port {
            self.port = port;
        }
        self.validate()?;
        Ok(self)
    }

    /// Create every working directory.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [
            &self.models_dir,
            &self.output_dir,
            &self.samples_dir,
            &self.cache_dir,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn multilingual_dir(&self) -> PathBuf {
        self.multilingual
            .model_dir
            .clone()
            .unwrap_or_else(|| self.models_dir.join("kokoro"))
    }

    /// Configured speaker encoder, or the conventional file when it exists.
    pub fn speaker_encoder_path(&self) -> Option<PathBuf> {
        self.multilingual.speaker_encoder.clone().or_else(|| {
            let candidate = self.multilingual_dir().join(SPEAKER_ENCODER_FILE);
            candidate.exists().then_some(candidate)
        })
    }

    /// Where the optimized graph of model `id` is cached.
    pub fn graph_cache_path(&self, id: &str) -> PathBuf {
        self.cache_dir.join(format!("{id}.optimized.onnx"))
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
