//! Reference-speaker encoder for voice cloning.
//!
//! Wraps an ONNX style encoder that maps 24 kHz mono audio (`[1, samples]`,
//! f32) to a Kokoro style vector (`[1, 256]`). The resulting vector is passed
//! to the Kokoro engine in place of a voice pack.

use std::path::Path;

use ndarray::Array2;
use ort::session::Session;
use ort::value::TensorRef;

use super::kokoro::{KokoroError, Style, SAMPLE_RATE, STYLE_DIM};
use super::onnx::init_session;
use crate::audio;
use crate::error::{Error, Result};

/// Shortest reference accepted after trimming, in seconds.
const MIN_REFERENCE_SECS: f32 = 0.5;

pub struct SpeakerEncoder {
    session: Session,
    input_name: String,
}

impl SpeakerEncoder {
    pub fn load(path: &Path, num_threads: Option<usize>) -> Result<Self> {
        log::info!("Loading speaker encoder from {}", path.display());
        let session = init_session(path, num_threads, None).map_err(KokoroError::from)?;
        let input_name = session
            .inputs()
            .iter()
            .next()
            .map(|input| input.name().to_string())
            .unwrap_or_else(|| "audio".to_string());
        Ok(Self {
            session,
            input_name,
        })
    }

    /// Style vector for a reference recording at `sample_rate`.
    pub fn embed(&mut self, samples: &[f32], sample_rate: u32) -> Result<Box<Style>> {
        let reference = audio::prepare_reference(samples, sample_rate);
        if (reference.len() as f32) < sample_rate as f32 * MIN_REFERENCE_SECS {
            return Err(Error::InvalidReference(
                "reference audio is silent or shorter than half a second".to_string(),
            ));
        }

        let reference = audio::resample(&reference, sample_rate, SAMPLE_RATE)?;
        let input = Array2::from_shape_vec((1, reference.len()), reference)
            .map_err(KokoroError::from)?;

        let outputs = self
            .session
            .run(ort::inputs![
                self.input_name.as_str() => TensorRef::from_array_view(input.view()).map_err(KokoroError::from)?,
            ])
            .map_err(KokoroError::from)?;

        let (_, value) = outputs.iter().next().ok_or_else(|| {
            KokoroError::Ort(ort::Error::new("Speaker encoder produced no output"))
        })?;
        let embedding = value
            .try_extract_array::<f32>()
            .map_err(KokoroError::from)?;

        to_style(embedding.iter().copied())
    }

    /// Style vector for a WAV file.
    pub fn embed_file(&mut self, path: &Path) -> Result<Box<Style>> {
        let (samples, rate) = audio::read_mono(path)?;
        self.embed(&samples, rate)
    }
}

fn to_style(values: impl ExactSizeIterator<Item = f32>) -> Result<Box<Style>> {
    if values.len() != STYLE_DIM {
        return Err(Error::InvalidReference(format!(
            "speaker encoder returned {} values, expected {STYLE_DIM}",
            values.len()
        )));
    }
    let mut style = Box::new([0f32; STYLE_DIM]);
    for (dst, v) in style.iter_mut().zip(values) {
        *dst = v;
    }
    Ok(style)
}
