//! Audio metadata, decoding and conditioning helpers.
//!
//! Input of any common container is decoded with symphonia; output is
//! always WAV written with hound.

use std::io::Cursor;
use std::path::Path;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use serde::Serialize;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{Error, Result};

/// Sample rate reported when a file cannot be inspected.
pub const FALLBACK_SAMPLE_RATE: u32 = 22_050;

/// Rate used for normalized voice samples.
pub const SAMPLE_ARCHIVE_RATE: u32 = 22_050;

/// Basic facts about an audio file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AudioInfo {
    /// Length in seconds.
    pub duration: f64,
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for AudioInfo {
    fn default() -> Self {
        Self {
            duration: 0.0,
            sample_rate: FALLBACK_SAMPLE_RATE,
            channels: 1,
        }
    }
}

/// Audio decoded to mono, with the source's format facts.
#[derive(Debug, Clone)]
pub struct Decoded {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// Channel count of the source before mixing down.
    pub channels: u16,
}

impl Decoded {
    pub fn info(&self) -> AudioInfo {
        AudioInfo {
            duration: self.samples.len() as f64 / self.sample_rate as f64,
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }
}

/// Duration, sample rate and channel count of an audio file.
pub fn probe(path: &Path) -> Result<AudioInfo> {
    Ok(decode_file(path)?.info())
}

/// Like [`probe`], but never fails: unreadable files report [`AudioInfo::default`].
pub fn probe_or_default(path: &Path) -> AudioInfo {
    match probe(path) {
        Ok(info) => info,
        Err(e) => {
            log::warn!("Failed to get audio info for {}: {e}", path.display());
            AudioInfo::default()
        }
    }
}

/// Decode an audio file into mono f32 samples.
pub fn read_mono(path: &Path) -> Result<(Vec<f32>, u32)> {
    let decoded = decode_file(path)?;
    Ok((decoded.samples, decoded.sample_rate))
}

/// Decode an audio file, using its extension as a container hint.
pub fn decode_file(path: &Path) -> Result<Decoded> {
    let bytes = std::fs::read(path)?;
    decode(&bytes, path.extension().and_then(|e| e.to_str()))
}

/// Decode WAV, FLAC, MP3, Ogg/Vorbis and other containers symphonia knows
/// into mono f32 samples in `[-1, 1]`.
///
/// Multi-channel audio is averaged down to one channel. Non-finite samples
/// are replaced by silence.
pub fn decode(bytes: &[u8], extension: Option<&str>) -> Result<Decoded> {
    let source = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        source,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(SymphoniaError::Unsupported("no audio track"))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(1);
    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut interleaved: Vec<f32> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(buffer) => {
                let spec = *buffer.spec();
                sample_rate = spec.rate;
                channels = spec.channels.count();
                let mut converted = SampleBuffer::<f32>::new(buffer.capacity() as u64, spec);
                converted.copy_interleaved_ref(buffer);
                interleaved.extend_from_slice(converted.samples());
            }
            Err(SymphoniaError::DecodeError(e)) => {
                log::debug!("Skipping undecodable packet: {e}");
            }
            Err(e) => return Err(e.into()),
        }
    }

    if sample_rate == 0 {
        return Err(SymphoniaError::Unsupported("unknown sample rate").into());
    }
    let channels = channels.max(1);

    let mono: Vec<f32> = if channels > 1 {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    } else {
        interleaved
    };

    let samples = mono
        .into_iter()
        .map(|s| if s.is_finite() { s.clamp(-1.0, 1.0) } else { 0.0 })
        .collect();

    Ok(Decoded {
        samples,
        sample_rate,
        channels: u16::try_from(channels).unwrap_or(u16::MAX),
    })
}

/// Resample mono audio between rates.
pub fn resample(samples: &[f32], from: u32, to: u32) -> Result<Vec<f32>> {
    if samples.is_empty() || from == 0 || to == 0 || from == to {
        return Ok(samples.to_vec());
    }

    if samples.len() < 32 {
        return Ok(resample_linear(samples, from, to));
    }

    let params = SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Cubic,
        oversampling_factor: 128,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = to as f64 / from as f64;
    let expected = ((samples.len() as f64) * ratio).round() as usize;
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, samples.len(), 1)
        .map_err(|e| Error::Resample(e.to_string()))?;

    match sinc_pass(&mut resampler, samples) {
        Ok(mut out) => {
            let delay = resampler.output_delay().min(out.len());
            out.drain(..delay);
            out.truncate(expected);
            Ok(out)
        }
        Err(e) => {
            log::debug!("Sinc resampling failed ({e}), using linear interpolation");
            Ok(resample_linear(samples, from, to))
        }
    }
}

/// One full chunk plus a flush, so the filter tail is not lost.
fn sinc_pass(
    resampler: &mut SincFixedIn<f32>,
    samples: &[f32],
) -> std::result::Result<Vec<f32>, rubato::ResampleError> {
    let mut out = resampler
        .process(&[samples.to_vec()], None)?
        .pop()
        .unwrap_or_default();
    let tail = resampler
        .process_partial::<Vec<f32>>(None, None)?
        .pop()
        .unwrap_or_default();
    out.extend(tail);
    Ok(out)
}

fn resample_linear(samples: &[f32], from: u32, to: u32) -> Vec<f32> {
    let ratio = to as f64 / from as f64;
    let out_len = ((samples.len() as f64) * ratio).round().max(1.0) as usize;
    let last = samples.len() - 1;

    (0..out_len)
        .map(|i| {
            let pos = i as f64 / ratio;
            let left = (pos.floor() as usize).min(last);
            let right = (left + 1).min(last);
            let frac = (pos - left as f64) as f32;
            samples[left] * (1.0 - frac) + samples[right] * frac
        })
        .collect()
}

/// Condition a reference recording before it is handed to a speaker encoder.
///
/// Removes DC offset, trims surrounding silence (keeping a short margin),
/// keeps at most 12 s around the loudest part and brings the level into a
/// stable band. Returns an empty vector for silent input.
pub fn prepare_reference(samples: &[f32], sample_rate: u32) -> Vec<f32> {
    if samples.is_empty() || sample_rate == 0 {
        return Vec::new();
    }

    let mean = samples.iter().copied().sum::<f32>() / samples.len() as f32;
    let mut out: Vec<f32> = samples.iter().map(|&s| s - mean).collect();

    let peak = peak(&out);
    if peak < 1e-5 {
        return Vec::new();
    }

    let threshold = (peak * 0.04).max(0.0025);
    let first = out.iter().position(|s| s.abs() >= threshold);
    let last = out.iter().rposition(|s| s.abs() >= threshold);
    if let (Some(first), Some(last)) = (first, last) {
        let margin = (sample_rate as f32 * 0.12) as usize;
        let start = first.saturating_sub(margin);
        let end = (last + margin + 1).min(out.len());
        out = out[start..end].to_vec();
    }

    let max_len = sample_rate as usize * 12;
    if out.len() > max_len {
        let window = (sample_rate as usize * 6).min(out.len());
        let start = loudest_window(&out, window).min(out.len() - max_len);
        out = out[start..start + max_len].to_vec();
    }

    limit(&mut out, 0.95);

    let rms = (out.iter().map(|&s| (s as f64).powi(2)).sum::<f64>() / out.len() as f64).sqrt()
        as f32;
    if rms > 1e-6 && rms < 0.035 {
        let gain = (0.035 / rms).min(6.0);
        out.iter_mut().for_each(|s| *s *= gain);
    }

    limit(&mut out, 0.95);

    log::debug!(
        "Reference prepared: {} -> {} samples @ {} Hz",
        samples.len(),
        out.len(),
        sample_rate
    );
    out
}

fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |p, &s| p.max(s.abs()))
}

fn limit(samples: &mut [f32], ceiling: f32) {
    let peak = peak(samples);
    if peak > ceiling {
        let scale = ceiling / peak;
        samples.iter_mut().for_each(|s| *s *= scale);
    }
}

fn loudest_window(samples: &[f32], window: usize) -> usize {
    if window == 0 || samples.len() <= window {
        return 0;
    }

    let mut energy: f64 = samples[..window].iter().map(|&s| (s as f64).powi(2)).sum();
    let mut best = (energy, 0usize);
    for start in 1..=samples.len() - window {
        energy += (samples[start + window - 1] as f64).powi(2);
        energy -= (samples[start - 1] as f64).powi(2);
        if energy > best.0 {
            best = (energy, start);
        }
    }
    best.1
}

/// Write mono samples as 16-bit PCM WAV.
pub fn write_wav_pcm16(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}
