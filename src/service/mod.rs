//! Model lifecycle and request handling behind the HTTP layer.
//!
//! Models are loaded once, kept in a [`ModelRegistry`] for the life of the
//! process, and driven synchronously; callers on an async runtime should
//! invoke the service from a blocking task.

pub mod files;
#[cfg(feature = "kokoro")]
mod kokoro;
mod registry;

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::audio::{self, AudioInfo, SAMPLE_ARCHIVE_RATE};
use crate::error::{Error, Result};
use crate::language;

#[cfg(feature = "kokoro")]
pub use kokoro::KokoroSpeechModel;
pub use registry::{ModelEntry, ModelRegistry, SharedModel, SpeechModel, SpeechRequest};

/// Registry id of the multilingual model that also handles cloning.
pub const MULTILINGUAL: &str = "multilingual";

/// Speed multipliers accepted from clients.
pub const SPEED_RANGE: std::ops::RangeInclusive<f32> = 0.5..=2.0;

/// Optional per-request overrides.
#[derive(Debug, Clone, Default)]
pub struct SpeechOptions {
    pub voice: Option<String>,
    pub speed: Option<f32>,
}

/// A voice sample stored by [`TtsService::process_sample`].
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedSample {
    pub id: String,
    pub filename: String,
    pub path: PathBuf,
    /// 22050 Hz mono 16-bit copy, when the upload decoded as WAV.
    pub processed_path: Option<PathBuf>,
    pub transcript: String,
    pub audio_info: AudioInfo,
}

pub struct TtsService {
    registry: ModelRegistry,
    output_dir: PathBuf,
    samples_dir: PathBuf,
    device: &'static str,
}

impl TtsService {
    pub fn new(registry: ModelRegistry, output_dir: PathBuf, samples_dir: PathBuf) -> Self {
        Self {
            registry,
            output_dir,
            samples_dir,
            device: "cpu",
        }
    }

    /// Ids of the loaded models, in load order.
    pub fn models(&self) -> Vec<String> {
        self.registry.ids()
    }

    /// Execution device the models run on.
    pub fn device(&self) -> &str {
        self.device
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn samples_dir(&self) -> &Path {
        &self.samples_dir
    }

    fn cloning_entry(&self) -> Option<&ModelEntry> {
        self.registry.get(MULTILINGUAL).filter(|entry| entry.cloning)
    }

    /// Synthesize `text` and write it to `output_path`, or to a fresh
    /// `tts_<id>.wav` in the output directory.
    ///
    /// A speaker reference is used when the multilingual model can clone;
    /// otherwise the language's own model is preferred, falling back to the
    /// multilingual model.
    pub fn generate_speech(
        &self,
        text: &str,
        language: &str,
        speaker_wav: Option<&Path>,
        output_path: Option<PathBuf>,
    ) -> Result<PathBuf> {
        self.generate_speech_with(
            text,
            language,
            &SpeechOptions::default(),
            speaker_wav,
            output_path,
        )
    }

    pub fn generate_speech_with(
        &self,
        text: &str,
        language: &str,
        options: &SpeechOptions,
        speaker_wav: Option<&Path>,
        output_path: Option<PathBuf>,
    ) -> Result<PathBuf> {
        let language = language::normalize(language);
        let output = output_path
            .unwrap_or_else(|| self.output_dir.join(format!("tts_{}.wav", files::short_id())));

        let (id, entry, speaker) = match (speaker_wav, self.cloning_entry()) {
            (Some(wav), Some(entry)) => {
                log::info!("Generating speech with voice cloning from {}", wav.display());
                (MULTILINGUAL, entry, Some(wav))
            }
            _ => match self.registry.get(&language) {
                Some(entry) => {
                    log::info!("Generating speech with '{language}' model");
                    (language.as_str(), entry, None)
                }
                None => {
                    log::info!("Generating speech with multilingual model (no speaker)");
                    let entry = self
                        .registry
                        .get(MULTILINGUAL)
                        .ok_or_else(|| Error::ModelNotLoaded(MULTILINGUAL.to_string()))?;
                    (MULTILINGUAL, entry, None)
                }
            },
        };

        self.render(id, entry, text, &language, options, speaker, &output)?;
        Ok(output)
    }

    /// Speak `text` in the voice of `speaker_wav`.
    pub fn clone_voice(
        &self,
        text: &str,
        speaker_wav: &Path,
        language: &str,
        output_path: Option<PathBuf>,
    ) -> Result<PathBuf> {
        let entry = self.cloning_entry().ok_or(Error::CloningUnavailable)?;
        let language = language::normalize(language);
        let output = output_path
            .unwrap_or_else(|| self.output_dir.join(format!("clone_{}.wav", files::short_id())));

        log::info!("Cloning voice from {}", speaker_wav.display());
        self.render(
            MULTILINGUAL,
            entry,
            text,
            &language,
            &SpeechOptions::default(),
            Some(speaker_wav),
            &output,
        )?;
        Ok(output)
    }

    #[allow(clippy::too_many_arguments)]
    fn render(
        &self,
        id: &str,
        entry: &ModelEntry,
        text: &str,
        language: &str,
        options: &SpeechOptions,
        speaker_wav: Option<&Path>,
        output: &Path,
    ) -> Result<()> {
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("Text is required".to_string()));
        }
        if !language::is_supported(language) {
            return Err(Error::InvalidInput(format!(
                "Unsupported language '{language}'"
            )));
        }
        let speed = options.speed.unwrap_or(1.0);
        if !SPEED_RANGE.contains(&speed) {
            return Err(Error::InvalidInput(format!(
                "speed must be between {} and {}",
                SPEED_RANGE.start(),
                SPEED_RANGE.end()
            )));
        }

        let request = SpeechRequest {
            text,
            language,
            voice: options.voice.as_deref().or(entry.voice.as_deref()),
            speaker_wav,
            speed,
        };

        let started = std::time::Instant::now();
        let result = {
            let mut model = entry.handle.lock().unwrap_or_else(|poisoned| {
                log::warn!("Model '{id}' panicked during an earlier request; reusing it");
                entry.handle.clear_poison();
                poisoned.into_inner()
            });
            model.synthesize(&request)?
        };
        result.write_wav(output)?;

        log::info!(
            "Model '{id}' rendered {:.2}s of audio in {:.2?} -> {}",
            result.duration_secs(),
            started.elapsed(),
            output.display()
        );
        Ok(())
    }

    /// Duration, sample rate and channels of an audio file; never fails.
    pub fn audio_info(&self, path: &Path) -> AudioInfo {
        audio::probe_or_default(path)
    }

    /// Keep an uploaded speaker reference for the duration of one request.
    pub fn store_speaker(&self, filename: &str, bytes: &[u8]) -> Result<files::TempUpload> {
        let (_, path) = files::store_upload(&self.samples_dir, "speaker", filename, bytes)?;
        Ok(files::TempUpload::new(path))
    }

    /// Store a voice sample with its transcript and a normalized copy.
    pub fn process_sample(
        &self,
        filename: &str,
        transcript: &str,
        bytes: &[u8],
    ) -> Result<ProcessedSample> {
        let (id, path) = files::store_upload(&self.samples_dir, "sample", filename, bytes)?;
        let audio_info = self.audio_info(&path);

        let processed = self.samples_dir.join(format!("processed_sample_{id}.wav"));
        let processed_path = match normalize_sample(&path, &processed) {
            Ok(()) => Some(processed),
            Err(e) => {
                log::warn!("Could not normalize sample {}: {e}", path.display());
                None
            }
        };

        Ok(ProcessedSample {
            id,
            filename: files::upload_name(filename).unwrap_or(filename).to_string(),
            path,
            processed_path,
            transcript: transcript.to_string(),
            audio_info,
        })
    }

    /// Generated file `filename` in the output directory, if it exists.
    pub fn resolve_output(&self, filename: &str) -> Option<PathBuf> {
        files::resolve_in(&self.output_dir, filename)
    }
}

fn normalize_sample(source: &Path, dest: &Path) -> Result<()> {
    let (samples, rate) = audio::read_mono(source)?;
    let samples = audio::resample(&samples, rate, SAMPLE_ARCHIVE_RATE)?;
    audio::write_wav_pcm16(dest, &samples, SAMPLE_ARCHIVE_RATE)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::audio::tests::sine;
    use crate::SynthesisResult;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Deterministic model: a 440 Hz tone, one tenth of a second per word.
    pub(crate) struct ToneModel {
        pub cloning: bool,
        pub calls: Arc<AtomicUsize>,
        pub last_voice: Arc<std::sync::Mutex<Option<String>>>,
    }

    impl ToneModel {
        pub(crate) fn new(cloning: bool) -> Self {
            Self {
                cloning,
                calls: Arc::new(AtomicUsize::new(0)),
                last_voice: Arc::new(std::sync::Mutex::new(None)),
            }
        }
    }

    impl SpeechModel for ToneModel {
        fn synthesize(&mut self, request: &SpeechRequest<'_>) -> Result<SynthesisResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_voice.lock().unwrap() = request.voice.map(str::to_string);
            if request.speaker_wav.is_some() && !self.cloning {
                return Err(Error::CloningUnavailable);
            }
            let words = request.text.split_whitespace().count() as f32;
            Ok(SynthesisResult {
                samples: sine(440.0, 24_000, 0.1 * words, 0.3),
                sample_rate: 24_000,
            })
        }

        fn supports_cloning(&self) -> bool {
            self.cloning
        }

        fn describe(&self) -> String {
            "tone".to_string()
        }
    }

    pub(crate) fn service_in(dir: &Path, cloning: bool) -> TtsService {
        let mut registry = ModelRegistry::default();
        registry.insert(
            MULTILINGUAL,
            Box::new(ToneModel::new(cloning)),
            Some("af_heart".to_string()),
        );
        registry.alias("en", MULTILINGUAL, Some("af_bella".to_string()));
        registry.alias("nl", MULTILINGUAL, Some("bf_emma".to_string()));

        let output = dir.join("out");
        let samples = dir.join("samples");
        std::fs::create_dir_all(&output).unwrap();
        std::fs::create_dir_all(&samples).unwrap();
        TtsService::new(registry, output, samples)
    }

    #[test]
    fn lists_models_in_load_order() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_in(dir.path(), true);
        assert_eq!(service.models(), vec!["multilingual", "en", "nl"]);
        assert_eq!(service.device(), "cpu");
    }

    #[test]
    fn generates_named_wav_with_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_in(dir.path(), false);

        let path = service
            .generate_speech("one two three four five", "EN", None, None)
            .unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("tts_") && name.ends_with(".wav"));
        assert_eq!(name.len(), "tts_12345678.wav".len());
        assert_eq!(path.parent().unwrap(), service.output_dir());

        let info = service.audio_info(&path);
        assert_eq!(info.sample_rate, 24_000);
        assert_eq!(info.channels, 1);
        assert!((info.duration - 0.5).abs() < 1e-3);
    }

    #[test]
    fn language_entry_supplies_voice() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = ModelRegistry::default();
        let model = ToneModel::new(false);
        let last_voice = Arc::clone(&model.last_voice);
        registry.insert(MULTILINGUAL, Box::new(model), Some("af_heart".into()));
        registry.alias("nl", MULTILINGUAL, Some("bf_emma".into()));
        let service = TtsService::new(registry, dir.path().into(), dir.path().into());

        service.generate_speech("hallo", "nl", None, None).unwrap();
        assert_eq!(last_voice.lock().unwrap().as_deref(), Some("bf_emma"));

        service.generate_speech("hola", "es", None, None).unwrap();
        assert_eq!(last_voice.lock().unwrap().as_deref(), Some("af_heart"));

        let options = SpeechOptions {
            voice: Some("ff_siwis".into()),
            speed: Some(1.2),
        };
        service
            .generate_speech_with("salut", "fr", &options, None, None)
            .unwrap();
        assert_eq!(last_voice.lock().unwrap().as_deref(), Some("ff_siwis"));
    }

    #[test]
    fn speaker_is_ignored_without_cloning_model() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_in(dir.path(), false);
        let reference = dir.path().join("ref.wav");
        audio::write_wav_pcm16(&reference, &sine(200.0, 16_000, 1.0, 0.5), 16_000).unwrap();

        // Falls through to the language model, which never sees the speaker.
        assert!(service
            .generate_speech("hello there", "en", Some(&reference), None)
            .is_ok());
        assert!(matches!(
            service.clone_voice("hello", &reference, "en", None),
            Err(Error::CloningUnavailable)
        ));
    }

    #[test]
    fn clone_writes_clone_file() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_in(dir.path(), true);
        let reference = dir.path().join("ref.wav");
        audio::write_wav_pcm16(&reference, &sine(200.0, 16_000, 1.0, 0.5), 16_000).unwrap();

        let path = service
            .clone_voice("hello there", &reference, "en", None)
            .unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("clone_"));
        assert!(path.exists());
    }

    #[test]
    fn rejects_blank_text_and_bad_speed() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_in(dir.path(), false);
        assert!(matches!(
            service.generate_speech("   ", "en", None, None),
            Err(Error::InvalidInput(_))
        ));

        let options = SpeechOptions {
            voice: None,
            speed: Some(5.0),
        };
        assert!(matches!(
            service.generate_speech_with("hi", "en", &options, None, None),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            service.generate_speech("hi", "tlh", None, None),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn explicit_output_path_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_in(dir.path(), false);
        let target = dir.path().join("custom.wav");
        let path = service
            .generate_speech("hi", "en", None, Some(target.clone()))
            .unwrap();
        assert_eq!(path, target);
        assert!(target.exists());
    }

    #[test]
    fn processes_wav_sample() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_in(dir.path(), false);
        let source = dir.path().join("take.wav");
        audio::write_wav_pcm16(&source, &sine(220.0, 44_100, 1.0, 0.5), 44_100).unwrap();
        let bytes = std::fs::read(&source).unwrap();

        let sample = service
            .process_sample("uploads/take.wav", "Hello there", &bytes)
            .unwrap();
        assert_eq!(sample.filename, "take.wav");
        assert_eq!(sample.transcript, "Hello there");
        assert_eq!(sample.audio_info.sample_rate, 44_100);
        assert!(sample.path.exists());

        let processed = sample.processed_path.expect("wav sample is normalized");
        let info = audio::probe(&processed).unwrap();
        assert_eq!(info.sample_rate, 22_050);
        assert_eq!(info.channels, 1);
    }

    #[test]
    fn processes_mulaw_sample() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_in(dir.path(), false);
        let bytes = crate::audio::tests::mulaw_wav(16_000);

        let sample = service.process_sample("call.wav", "", &bytes).unwrap();
        assert_eq!(sample.audio_info.sample_rate, 8_000);
        assert!((sample.audio_info.duration - 2.0).abs() < 1e-6);

        let processed = sample.processed_path.expect("mu-law sample is normalized");
        let info = audio::probe(&processed).unwrap();
        assert_eq!(info.sample_rate, 22_050);
        assert!((info.duration - 2.0).abs() < 1e-3);
    }

    #[test]
    fn undecodable_sample_is_kept_without_copy() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_in(dir.path(), false);
        let sample = service
            .process_sample("voice.bin", "text", b"not audio at all")
            .unwrap();
        assert!(sample.path.exists());
        assert!(sample.processed_path.is_none());
        assert_eq!(sample.audio_info.duration, 0.0);
    }

    #[test]
    fn language_model_is_preferred_unless_cloning() {
        let dir = tempfile::tempdir().unwrap();
        let multilingual = ToneModel::new(true);
        let dutch = ToneModel::new(false);
        let multilingual_calls = Arc::clone(&multilingual.calls);
        let dutch_calls = Arc::clone(&dutch.calls);

        let mut registry = ModelRegistry::default();
        registry.insert(MULTILINGUAL, Box::new(multilingual), None);
        registry.insert("nl", Box::new(dutch), Some("bf_emma".into()));
        let service = TtsService::new(registry, dir.path().into(), dir.path().into());
        let reference = dir.path().join("ref.wav");
        audio::write_wav_pcm16(&reference, &sine(200.0, 16_000, 1.0, 0.5), 16_000).unwrap();

        service.generate_speech("hallo", "nl", None, None).unwrap();
        assert_eq!(dutch_calls.load(Ordering::SeqCst), 1);
        assert_eq!(multilingual_calls.load(Ordering::SeqCst), 0);

        service
            .generate_speech("hallo", "nl", Some(&reference), None)
            .unwrap();
        assert_eq!(dutch_calls.load(Ordering::SeqCst), 1);
        assert_eq!(multilingual_calls.load(Ordering::SeqCst), 1);

        service.generate_speech("hola", "es", None, None).unwrap();
        assert_eq!(dutch_calls.load(Ordering::SeqCst), 1);
        assert_eq!(multilingual_calls.load(Ordering::SeqCst), 2);
    }

    /// Panics on its first request, then behaves.
    struct FlakyModel {
        calls: usize,
    }

    impl SpeechModel for FlakyModel {
        fn synthesize(&mut self, _request: &SpeechRequest<'_>) -> Result<SynthesisResult> {
            self.calls += 1;
            if self.calls == 1 {
                panic!("inference blew up");
            }
            Ok(SynthesisResult {
                samples: vec![0.1; 2_400],
                sample_rate: 24_000,
            })
        }

        fn describe(&self) -> String {
            "flaky".to_string()
        }
    }

    #[test]
    fn model_survives_a_panicked_request() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = ModelRegistry::default();
        registry.insert(MULTILINGUAL, Box::new(FlakyModel { calls: 0 }), None);
        let service = TtsService::new(registry, dir.path().into(), dir.path().into());

        let first = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            service.generate_speech("hello", "en", None, None)
        }));
        assert!(first.is_err());

        let path = service.generate_speech("hello", "en", None, None).unwrap();
        assert!(path.exists());
        assert!(service.generate_speech("again", "en", None, None).is_ok());
    }

    #[test]
    fn resolves_only_existing_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_in(dir.path(), false);
        let path = service.generate_speech("hi", "en", None, None).unwrap();
        let name = path.file_name().unwrap().to_str().unwrap();

        assert_eq!(service.resolve_output(name), Some(path.clone()));
        assert!(service.resolve_output("nope.wav").is_none());
        assert!(service.resolve_output("../out/x.wav").is_none());
    }
}
