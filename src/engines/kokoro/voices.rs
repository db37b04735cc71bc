use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use super::{KokoroError, Style, STYLE_DIM};

/// Style vectors of every voice in a Kokoro voice archive.
///
/// A voice holds one style per phoneme-sequence length; synthesis picks the
/// row matching the token count so prosody stays consistent.
pub struct VoiceStore {
    voices: BTreeMap<String, Vec<Style>>,
}

impl VoiceStore {
    /// Load every `<voice>.npy` entry of an `.npz` archive.
    pub fn load(path: &Path) -> Result<Self, KokoroError> {
        let mut zip = zip::ZipArchive::new(File::open(path)?)
            .map_err(|e| KokoroError::VoiceParse(format!("Failed to open archive: {e}")))?;

        let mut voices = BTreeMap::new();
        for i in 0..zip.len() {
            let mut entry = zip
                .by_index(i)
                .map_err(|e| KokoroError::VoiceParse(format!("Entry {i}: {e}")))?;
            if entry.is_dir() {
                continue;
            }

            let name = entry.name().trim_end_matches(".npy").to_string();
            if name.is_empty() {
                continue;
            }

            let mut data = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut data)?;
            let styles = parse_npy(&data)
                .map_err(|reason| KokoroError::VoiceParse(format!("{name}: {reason}")))?;
            voices.insert(name, styles);
        }

        log::info!("Loaded {} voices from {}", voices.len(), path.display());
        Ok(Self { voices })
    }

    /// Style row `idx` of `voice`, clamped to the rows available.
    pub fn style(&self, voice: &str, idx: usize) -> Result<Style, KokoroError> {
        let rows = self
            .voices
            .get(voice)
            .filter(|rows| !rows.is_empty())
            .ok_or_else(|| KokoroError::VoiceNotFound(voice.to_string()))?;
        Ok(rows[idx.min(rows.len() - 1)])
    }

    pub fn contains(&self, voice: &str) -> bool {
        self.voices.contains_key(voice)
    }

    /// Voice names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.voices.keys().map(String::as_str).collect()
    }
}

/// Parse a little-endian float32 `.npy` payload into style rows.
fn parse_npy(data: &[u8]) -> Result<Vec<Style>, String> {
    if data.len() < 10 || &data[..6] != b"\x93NUMPY" {
        return Err("not a numpy file".to_string());
    }

    // v1 headers use a u16 length at [8..10]; v2+ use a u32 at [8..12].
    let (header_len, prefix) = match data[6] {
        1 => (u16::from_le_bytes([data[8], data[9]]) as usize, 10),
        _ if data.len() >= 12 => (
            u32::from_le_bytes([data[8], data[9], data[10], data[11]]) as usize,
            12,
        ),
        _ => return Err("header truncated".to_string()),
    };

    let body = data
        .get(prefix + header_len..)
        .ok_or_else(|| "header truncated".to_string())?;

    let row_bytes = STYLE_DIM * 4;
    if body.len() % row_bytes != 0 {
        return Err(format!(
            "{} data bytes is not a whole number of {STYLE_DIM}-float rows",
            body.len()
        ));
    }

    Ok(body
        .chunks_exact(row_bytes)
        .map(|row| {
            let mut style = [0f32; STYLE_DIM];
            for (dst, bytes) in style.iter_mut().zip(row.chunks_exact(4)) {
                *dst = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            }
            style
        })
        .collect())
}
