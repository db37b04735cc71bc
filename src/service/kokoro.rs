use std::path::{Path, PathBuf};

use super::{ModelRegistry, SpeechModel, SpeechRequest, TtsService, MULTILINGUAL};
use crate::config::ServiceConfig;
use crate::engines::kokoro::{EspeakConfig, KokoroEngine, KokoroInferenceParams, KokoroModelParams};
use crate::engines::onnx::execution_provider;
use crate::engines::speaker::SpeakerEncoder;
use crate::error::{Error, Result};
use crate::{SynthesisEngine, SynthesisResult};

/// A loaded Kokoro model, optionally paired with a speaker encoder.
pub struct KokoroSpeechModel {
    engine: KokoroEngine,
    encoder: Option<SpeakerEncoder>,
    model_dir: PathBuf,
}

impl KokoroSpeechModel {
    pub fn load(
        model_dir: &Path,
        params: KokoroModelParams,
        espeak: EspeakConfig,
    ) -> Result<Self> {
        let mut engine = KokoroEngine::with_espeak(espeak);
        engine.load_model_with_params(model_dir, params)?;
        Ok(Self {
            engine,
            encoder: None,
            model_dir: model_dir.to_path_buf(),
        })
    }

    pub fn with_encoder(mut self, encoder: SpeakerEncoder) -> Self {
        self.encoder = Some(encoder);
        self
    }
}

impl SpeechModel for KokoroSpeechModel {
    fn synthesize(&mut self, request: &SpeechRequest<'_>) -> Result<SynthesisResult> {
        let style = match (request.speaker_wav, self.encoder.as_mut()) {
            (Some(wav), Some(encoder)) => Some(encoder.embed_file(wav)?),
            (Some(_), None) => return Err(Error::CloningUnavailable),
            (None, _) => None,
        };

        let mut params = KokoroInferenceParams {
            speed: request.speed,
            language: Some(request.language.to_string()),
            style,
            ..Default::default()
        };
        if let Some(voice) = request.voice {
            params.voice = voice.to_string();
        }

        let result = self.engine.synthesize(request.text, Some(params))?;
        Ok(result)
    }

    fn supports_cloning(&self) -> bool {
        self.encoder.is_some()
    }

    fn describe(&self) -> String {
        format!(
            "Kokoro from {} ({} voices{})",
            self.model_dir.display(),
            self.engine.list_voices().len(),
            if self.encoder.is_some() {
                ", cloning enabled"
            } else {
                ""
            }
        )
    }
}

impl TtsService {
    /// Load every configured model.
    ///
    /// The multilingual model is required. A language whose own model fails
    /// to load is left out of the registry with a warning; its requests then
    /// reach the multilingual model.
    pub fn load(config: &ServiceConfig) -> Result<Self> {
        let espeak = EspeakConfig {
            bin_path: config.espeak.bin_path.clone(),
            data_path: config.espeak.data_path.clone(),
        };
        if !espeak.is_available() {
            log::warn!("espeak-ng could not be started; synthesis requests will fail");
        }
        let params = |id: &str| KokoroModelParams {
            num_threads: config.multilingual.num_threads,
            optimized_model_cache_path: Some(config.graph_cache_path(id)),
        };

        let mut registry = ModelRegistry::default();

        let dir = config.multilingual_dir();
        log::info!("Loading multilingual model from {}", dir.display());
        let mut multilingual = KokoroSpeechModel::load(&dir, params(MULTILINGUAL), espeak.clone())
            .map_err(|e| {
                log::error!("Failed to load multilingual model: {e}");
                e
            })?;

        match config.speaker_encoder_path() {
            Some(path) => match SpeakerEncoder::load(&path, config.multilingual.num_threads) {
                Ok(encoder) => multilingual = multilingual.with_encoder(encoder),
                Err(e) if config.multilingual.speaker_encoder.is_some() => return Err(e),
                Err(e) => log::warn!("Voice cloning disabled: {e}"),
            },
            None => log::warn!(
                "No speaker encoder in {}; voice cloning disabled",
                dir.display()
            ),
        }
        registry.insert(
            MULTILINGUAL,
            Box::new(multilingual),
            Some(config.multilingual.voice.clone()),
        );

        for (code, lang) in &config.languages {
            let voice = Some(lang.voice.clone());
            let Some(model_dir) = &lang.model_dir else {
                registry.alias(code, MULTILINGUAL, voice);
                continue;
            };

            log::info!("Loading '{code}' model from {}", model_dir.display());
            match KokoroSpeechModel::load(model_dir, params(code.as_str()), espeak.clone()) {
                Ok(model) => registry.insert(code, Box::new(model), voice),
                Err(e) => log::warn!("Could not load '{code}' model: {e}"),
            }
        }

        let device = execution_provider();
        log::info!("Models ready on {device}: {:?}", registry.ids());
        let mut service = Self::new(
            registry,
            config.output_dir.clone(),
            config.samples_dir.clone(),
        );
        service.device = device;
        Ok(service)
    }
}
