//! Phrase to token id mapping and sequence chunking.

use std::collections::HashMap;
use std::path::Path;

use super::phonemizer::Phrase;
use super::KokoroError;

/// Punctuation a long sequence may be split after, strongest first.
const SPLIT_MARKS: [char; 6] = ['.', '!', '?', ';', ':', ','];

/// Kokoro vocabulary: one token id per IPA or punctuation character.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    vocab: HashMap<char, i64>,
    split_ids: Vec<i64>,
}

impl Tokenizer {
    /// Read the `vocab` table of a Kokoro `config.json`.
    pub fn from_config(path: &Path) -> Result<Self, KokoroError> {
        let content = std::fs::read_to_string(path)?;
        let json: serde_json::Value = serde_json::from_str(&content)
            .map_err(|e| KokoroError::Config(format!("Failed to parse JSON: {e}")))?;

        let table = json
            .get("vocab")
            .and_then(|v| v.as_object())
            .ok_or_else(|| KokoroError::Config("Missing 'vocab' object".to_string()))?;

        let vocab = table
            .iter()
            .map(|(key, value)| {
                let ch = key
                    .chars()
                    .next()
                    .ok_or_else(|| KokoroError::Config("Empty key in vocab".to_string()))?;
                let id = value
                    .as_i64()
                    .ok_or_else(|| KokoroError::Config(format!("Non-integer id for {key:?}")))?;
                Ok((ch, id))
            })
            .collect::<Result<HashMap<_, _>, KokoroError>>()?;

        Ok(Self::new(vocab))
    }

    pub fn new(vocab: HashMap<char, i64>) -> Self {
        let split_ids = SPLIT_MARKS
            .iter()
            .filter_map(|c| vocab.get(c).copied())
            .collect();
        Self { vocab, split_ids }
    }

    /// Token ids for phonemized text. Characters outside the vocabulary,
    /// and espeak-ng's `_` word joiners, are dropped.
    pub fn encode(&self, phrases: &[Phrase]) -> Vec<i64> {
        let mut ids = Vec::new();
        for phrase in phrases {
            match phrase {
                Phrase::Speech(ipa) => ids.extend(
                    ipa.trim()
                        .chars()
                        .filter(|&c| c != '_')
                        .filter_map(|c| self.vocab.get(&c).copied()),
                ),
                Phrase::Pause(c) => ids.extend(self.vocab.get(c).copied()),
            }
        }
        ids
    }

    /// Split `ids` into chunks of at most `max_len`, cutting after the last
    /// punctuation token inside each window when there is one.
    pub fn chunks<'a>(&self, ids: &'a [i64], max_len: usize) -> Vec<&'a [i64]> {
        let mut out = Vec::new();
        let mut rest = ids;

        while rest.len() > max_len {
            let cut = rest[..max_len]
                .iter()
                .rposition(|id| self.split_ids.contains(id))
                .map(|i| i + 1)
                .unwrap_or(max_len);
            let (head, tail) = rest.split_at(cut);
            out.push(head);
            rest = tail;
        }

        if !rest.is_empty() {
            out.push(rest);
        }
        out
    }
}
