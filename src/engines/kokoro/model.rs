use std::path::{Path, PathBuf};

use ndarray::{Array2, ArrayView2};
use ort::inputs;
use ort::session::Session;
use ort::value::TensorRef;

use super::phonemizer::{phonemize, EspeakConfig};
use super::tokenizer::Tokenizer;
use super::voices::VoiceStore;
use super::{KokoroError, Style};
use crate::engines::onnx::init_session;

/// Maximum number of phoneme tokens per chunk (before padding).
pub const MAX_PHONEME_LEN: usize = 510;

/// Style vector dimension for Kokoro.
pub const STYLE_DIM: usize = 256;

/// Output sample rate from the Kokoro model.
pub const SAMPLE_RATE: u32 = 24000;

const CHUNK_CROSSFADE_SAMPLES: usize = 240; // 10ms @ 24kHz

/// Where the style vector for an utterance comes from.
#[derive(Debug, Clone, Copy)]
pub enum StyleSource<'a> {
    /// Voice pack row picked by token count (or a fixed index).
    Voice { name: &'a str, index: Option<usize> },
    /// Caller-supplied vector, e.g. from a speaker encoder.
    Fixed(&'a Style),
}

/// A loaded Kokoro model: ONNX session, voice packs and vocabulary.
pub struct KokoroModel {
    session: Session,
    voices: VoiceStore,
    tokenizer: Tokenizer,
    tokens_input: String,
    speed_is_int32: bool,
}

impl KokoroModel {
    /// Load the model files from `model_dir`.
    pub fn load(
        model_dir: &Path,
        num_threads: Option<usize>,
        optimized_cache_path: Option<&Path>,
    ) -> Result<Self, KokoroError> {
        let onnx_path = find_onnx_file(model_dir)?;
        log::info!("Loading Kokoro model from {}", onnx_path.display());

        let session = init_session(&onnx_path, num_threads, optimized_cache_path)?;
        let tokens_input = session
            .inputs()
            .iter()
            .map(|input| input.name())
            .find(|name| *name == "input_ids" || *name == "tokens")
            .unwrap_or("input_ids")
            .to_string();
        let speed_is_int32 = session
            .inputs()
            .iter()
            .find(|input| input.name() == "speed")
            .map(|input| format!("{:?}", input.dtype()).to_lowercase().contains("int32"))
            .unwrap_or(true);
        log::debug!("Kokoro inputs: tokens='{tokens_input}', int32 speed={speed_is_int32}");

        let voices = VoiceStore::load(&require(model_dir.join("voices-v1.0.bin"))?)?;
        let tokenizer = Tokenizer::from_config(&require(model_dir.join("config.json"))?)?;

        Ok(Self {
            session,
            voices,
            tokenizer,
            tokens_input,
            speed_is_int32,
        })
    }

    /// Synthesize `text`, phonemized with the espeak-ng voice `lang`.
    pub fn synthesize(
        &mut self,
        text: &str,
        lang: &str,
        style: StyleSource<'_>,
        speed: f32,
        espeak: &EspeakConfig,
    ) -> Result<Vec<f32>, KokoroError> {
        if let StyleSource::Voice { name, .. } = style {
            if !self.voices.contains(name) {
                return Err(KokoroError::VoiceNotFound(name.to_string()));
            }
        }

        let phrases = phonemize(text, lang, espeak)?;
        let ids = self.tokenizer.encode(&phrases);
        if ids.is_empty() {
            log::warn!("No phoneme tokens produced for text: {text:?}");
            return Ok(Vec::new());
        }

        // One style for the whole utterance so chunks share prosody.
        let style = match style {
            StyleSource::Voice { name, index } => {
                self.voices.style(name, index.unwrap_or(ids.len()))?
            }
            StyleSource::Fixed(style) => *style,
        };

        let chunks: Vec<Vec<i64>> = self
            .tokenizer
            .chunks(&ids, MAX_PHONEME_LEN)
            .into_iter()
            .map(<[i64]>::to_vec)
            .collect();
        if chunks.len() > 1 {
            log::debug!("Split {} tokens into {} chunks", ids.len(), chunks.len());
        }

        let mut audio = Vec::with_capacity(ids.len() * 300);
        for chunk in &chunks {
            let part = self.run(chunk, &style, speed)?;
            crossfade_into(&mut audio, &part, CHUNK_CROSSFADE_SAMPLES);
        }
        Ok(audio)
    }

    /// One inference pass over `tokens`, padded with the boundary token 0.
    fn run(&mut self, tokens: &[i64], style: &Style, speed: f32) -> Result<Vec<f32>, KokoroError> {
        let mut padded = Vec::with_capacity(tokens.len() + 2);
        padded.push(0);
        padded.extend_from_slice(tokens);
        padded.push(0);
        let tokens = Array2::from_shape_vec((1, padded.len()), padded)?;
        let style = ArrayView2::from_shape((1, STYLE_DIM), style.as_slice())?;

        let outputs = if self.speed_is_int32 {
            let speed = ndarray::arr1(&[speed.round().max(1.0) as i32]);
            self.session.run(inputs![
                self.tokens_input.as_str() => TensorRef::from_array_view(tokens.view())?,
                "style" => TensorRef::from_array_view(style)?,
                "speed" => TensorRef::from_array_view(speed.view())?,
            ])?
        } else {
            let speed = ndarray::arr1(&[speed]);
            self.session.run(inputs![
                self.tokens_input.as_str() => TensorRef::from_array_view(tokens.view())?,
                "style" => TensorRef::from_array_view(style)?,
                "speed" => TensorRef::from_array_view(speed.view())?,
            ])?
        };

        let (_, waveform) = outputs
            .iter()
            .next()
            .ok_or_else(|| KokoroError::Ort(ort::Error::new("Model produced no output")))?;
        let waveform = waveform.try_extract_array::<f32>()?;
        Ok(waveform.iter().copied().collect())
    }

    pub fn voices(&self) -> Vec<&str> {
        self.voices.names()
    }
}

fn require(path: PathBuf) -> Result<PathBuf, KokoroError> {
    if path.exists() {
        Ok(path)
    } else {
        Err(KokoroError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} not found", path.display()),
        )))
    }
}

/// The model's `.onnx` file, preferring `kokoro-quant-convinteger.onnx`.
///
/// Other ONNX graphs in the directory (the speaker encoder) are skipped.
fn find_onnx_file(model_dir: &Path) -> Result<PathBuf, KokoroError> {
    let preferred = model_dir.join("kokoro-quant-convinteger.onnx");
    if preferred.exists() {
        return Ok(preferred);
    }

    let mut candidates: Vec<PathBuf> = std::fs::read_dir(model_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("onnx"))
        .filter(|p| p.file_stem().and_then(|s| s.to_str()) != Some("speaker_encoder"))
        .collect();
    candidates.sort();

    candidates.into_iter().next().ok_or_else(|| {
        KokoroError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("No .onnx file found in {}", model_dir.display()),
        ))
    })
}

/// Append `src` to `dst`, blending the first `crossfade` samples of `src`
/// with the tail of `dst`.
fn crossfade_into(dst: &mut Vec<f32>, src: &[f32], crossfade: usize) {
    let overlap = crossfade.min(dst.len()).min(src.len());
    let start = dst.len() - overlap;
    for (i, (d, &s)) in dst[start..].iter_mut().zip(src).enumerate() {
        let t = (i + 1) as f32 / (overlap as f32 + 1.0);
        *d = *d * (1.0 - t) + s * t;
    }
    dst.extend_from_slice(&src[overlap..]);
}
