//! Text to IPA conversion through the espeak-ng command line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use super::KokoroError;

/// Location of the espeak-ng binary and its data directory.
///
/// Either path can be `None` to use the system installation.
#[derive(Debug, Clone, Default)]
pub struct EspeakConfig {
    pub bin_path: Option<PathBuf>,
    pub data_path: Option<PathBuf>,
}

impl EspeakConfig {
    fn command(&self) -> Command {
        let bin = self
            .bin_path
            .as_deref()
            .unwrap_or_else(|| Path::new("espeak-ng"));
        let mut cmd = Command::new(bin);
        if let Some(data) = &self.data_path {
            cmd.env("ESPEAK_DATA_PATH", data);
        }
        cmd
    }

    /// Whether the configured binary can be started.
    pub fn is_available(&self) -> bool {
        self.command()
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok()
    }
}

/// A piece of phonemized text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phrase {
    /// IPA for a run of words.
    Speech(String),
    /// Punctuation kept as-is; the model reads it as prosody.
    Pause(char),
}

/// Convert `text` to phrases using the espeak-ng voice `lang`.
pub fn phonemize(
    text: &str,
    lang: &str,
    espeak: &EspeakConfig,
) -> Result<Vec<Phrase>, KokoroError> {
    let segments = segment(text);
    let words: Vec<&str> = segments
        .iter()
        .filter_map(|s| match s {
            Segment::Words(w) => Some(w.as_str()),
            Segment::Punct(_) => None,
        })
        .collect();

    let lines = if words.is_empty() {
        Vec::new()
    } else {
        espeak_lines(&words, lang, espeak)?
    };
    let mut ipa = lines.into_iter();

    Ok(segments
        .into_iter()
        .map(|s| match s {
            Segment::Words(_) => Phrase::Speech(ipa.next().unwrap_or_default()),
            Segment::Punct(c) => Phrase::Pause(c),
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Words(String),
    Punct(char),
}

/// Split text into word runs and punctuation, collapsing whitespace.
///
/// Decimal points and thousands separators between digits stay inside the
/// word run so espeak-ng reads numbers whole.
fn segment(text: &str) -> Vec<Segment> {
    let chars: Vec<char> = text.chars().collect();
    let mut out = Vec::new();
    let mut words = String::new();

    for (i, &ch) in chars.iter().enumerate() {
        let between_digits = matches!(ch, '.' | ',')
            && i > 0
            && chars[i - 1].is_ascii_digit()
            && chars.get(i + 1).is_some_and(|c| c.is_ascii_digit());

        match boundary(ch) {
            Some(p) if !between_digits => {
                flush(&mut out, &mut words);
                out.push(Segment::Punct(p));
            }
            _ if ch.is_whitespace() => {
                if !words.is_empty() && !words.ends_with(' ') {
                    words.push(' ');
                }
            }
            _ => words.push(ch),
        }
    }

    flush(&mut out, &mut words);
    out
}

fn flush(out: &mut Vec<Segment>, words: &mut String) {
    let trimmed = words.trim();
    if !trimmed.is_empty() {
        out.push(Segment::Words(trimmed.to_string()));
    }
    words.clear();
}

fn boundary(ch: char) -> Option<char> {
    match ch {
        '.' | '!' | '?' | ',' | ';' | ':' | '—' | '…' | '"' | '(' | ')' | '\u{201c}'
        | '\u{201d}' => Some(ch),
        '\n' | '\r' => Some('.'),
        _ => None,
    }
}

/// Phonemize several word runs with one espeak-ng process, one line each.
///
/// Falls back to one process per run when espeak-ng does not answer with
/// exactly one line per input line.
fn espeak_lines(
    runs: &[&str],
    lang: &str,
    espeak: &EspeakConfig,
) -> Result<Vec<String>, KokoroError> {
    let output = run_espeak(&runs.join("\n"), lang, espeak)?;
    let lines: Vec<String> = output.lines().map(str::to_string).collect();
    if lines.len() == runs.len() {
        return Ok(lines);
    }

    log::debug!(
        "espeak-ng returned {} lines for {} runs, phonemizing one by one",
        lines.len(),
        runs.len()
    );
    runs.iter()
        .map(|run| {
            run_espeak(run, lang, espeak).map(|out| out.lines().collect::<Vec<_>>().join(" "))
        })
        .collect()
}

fn run_espeak(input: &str, lang: &str, espeak: &EspeakConfig) -> Result<String, KokoroError> {
    let mut child = espeak
        .command()
        .args(["--ipa", "--stdin", "-q", "-v", lang])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => KokoroError::EspeakNotFound,
            _ => KokoroError::Io(e),
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        // stdin is line oriented; an unterminated last line loses its final phoneme.
        stdin.write_all(input.as_bytes())?;
        if !input.ends_with('\n') {
            stdin.write_all(b"\n")?;
        }
    }

    let output = child.wait_with_output()?;
    if !output.status.success() {
        return Err(KokoroError::PhonemizerFailed(format!(
            "espeak-ng exited with code {:?}: {}",
            output.status.code(),
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
