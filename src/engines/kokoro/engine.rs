use std::path::{Path, PathBuf};

use crate::{language, SynthesisEngine, SynthesisResult};

use super::model::{KokoroModel, StyleSource, SAMPLE_RATE};
use super::phonemizer::EspeakConfig;
use super::{KokoroError, Style};

/// Load-time options.
#[derive(Debug, Clone, Default)]
pub struct KokoroModelParams {
    /// Intra- and inter-op threads; `None` leaves the choice to ONNX Runtime.
    pub num_threads: Option<usize>,
    /// Where to keep the optimized ONNX graph between runs. Must be writable.
    pub optimized_model_cache_path: Option<PathBuf>,
}

/// Per-request options.
#[derive(Debug, Clone)]
pub struct KokoroInferenceParams {
    /// Voice pack name (e.g. `"af_heart"`, `"ff_siwis"`).
    pub voice: String,
    /// Multiplier around 1.0; the service accepts 0.5 to 2.0.
    pub speed: f32,
    /// Service language code for phonemization. `None` follows the voice prefix.
    pub language: Option<String>,
    /// Style vector replacing the voice pack, used for voice cloning.
    pub style: Option<Box<Style>>,
    /// Override the style row index. `None` = auto (uses phoneme token count).
    pub style_index: Option<usize>,
}

impl Default for KokoroInferenceParams {
    fn default() -> Self {
        Self {
            voice: "af_heart".to_string(),
            speed: 1.0,
            language: None,
            style: None,
            style_index: None,
        }
    }
}

/// Kokoro-82M behind the [`SynthesisEngine`] interface.
pub struct KokoroEngine {
    model: Option<KokoroModel>,
    model_path: Option<PathBuf>,
    espeak: EspeakConfig,
}

impl Default for KokoroEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl KokoroEngine {
    /// Engine using the `espeak-ng` found on PATH.
    pub fn new() -> Self {
        Self::with_espeak(EspeakConfig::default())
    }

    /// Create a new engine with an explicit espeak-ng installation.
    pub fn with_espeak(espeak: EspeakConfig) -> Self {
        Self {
            model: None,
            model_path: None,
            espeak,
        }
    }

    /// Voice names in the loaded voice archive (empty when unloaded).
    pub fn list_voices(&self) -> Vec<&str> {
        self.model
            .as_ref()
            .map(KokoroModel::voices)
            .unwrap_or_default()
    }

    pub fn model_path(&self) -> Option<&Path> {
        self.model_path.as_deref()
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }
}

impl SynthesisEngine for KokoroEngine {
    type SynthesisParams = KokoroInferenceParams;
    type ModelParams = KokoroModelParams;
    type Error = KokoroError;

    fn load_model_with_params(
        &mut self,
        model_path: &Path,
        params: Self::ModelParams,
    ) -> Result<(), KokoroError> {
        let model = KokoroModel::load(
            model_path,
            params.num_threads,
            params.optimized_model_cache_path.as_deref(),
        )?;
        self.model = Some(model);
        self.model_path = Some(model_path.to_path_buf());
        Ok(())
    }

    fn unload_model(&mut self) {
        self.model = None;
        self.model_path = None;
    }

    fn synthesize(
        &mut self,
        text: &str,
        params: Option<Self::SynthesisParams>,
    ) -> Result<SynthesisResult, KokoroError> {
        let model = self.model.as_mut().ok_or(KokoroError::ModelNotLoaded)?;
        let p = params.unwrap_or_default();

        let lang = match p.language.as_deref() {
            Some(code) => language::espeak_voice(code)
                .ok_or_else(|| KokoroError::UnsupportedLanguage(code.to_string()))?,
            None => language::voice_language(&p.voice),
        };
        let style = match p.style.as_deref() {
            Some(style) => StyleSource::Fixed(style),
            None => StyleSource::Voice {
                name: &p.voice,
                index: p.style_index,
            },
        };

        let samples = model.synthesize(text, lang, style, p.speed, &self.espeak)?;
        Ok(SynthesisResult {
            samples,
            sample_rate: SAMPLE_RATE,
        })
    }
}
