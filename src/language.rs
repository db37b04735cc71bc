//! Service language codes and their espeak-ng voices.

/// Service language code -> espeak-ng voice.
const LANGUAGES: &[(&str, &str)] = &[
    ("en", "en-us"),
    ("en-us", "en-us"),
    ("en-gb", "en-gb"),
    ("nl", "nl"),
    ("de", "de"),
    ("fr", "fr-fr"),
    ("es", "es"),
    ("it", "it"),
    ("pt", "pt-br"),
    ("pt-br", "pt-br"),
    ("hi", "hi"),
    ("ja", "ja"),
    ("zh", "cmn"),
    ("cmn", "cmn"),
];

/// Canonical form of a requested language code.
pub fn normalize(code: &str) -> String {
    code.trim().to_lowercase().replace('_', "-")
}

/// espeak-ng voice for a service language code.
///
/// Region variants without their own entry (`de-at`, `fr-ca`) resolve to
/// the base language.
pub fn espeak_voice(code: &str) -> Option<&'static str> {
    let code = normalize(code);
    lookup(&code).or_else(|| {
        let (base, _) = code.split_once('-')?;
        lookup(base)
    })
}

fn lookup(code: &str) -> Option<&'static str> {
    LANGUAGES
        .iter()
        .find(|(name, _)| *name == code)
        .map(|(_, espeak)| *espeak)
}

pub fn is_supported(code: &str) -> bool {
    espeak_voice(code).is_some()
}

/// espeak-ng voice implied by a Kokoro voice name.
///
/// Voice names follow `{prefix}_{name}` where the two-character prefix
/// encodes language and gender (`af_heart`, `bm_george`, `ff_siwis`).
pub fn voice_language(voice: &str) -> &'static str {
    match voice.get(..2).unwrap_or_default() {
        "af" | "am" => "en-us",
        "bf" | "bm" => "en-gb",
        "ef" | "em" => "es",
        "ff" => "fr-fr",
        "hf" | "hm" => "hi",
        "if" | "im" => "it",
        "jf" | "jm" => "ja",
        "pf" | "pm" => "pt-br",
        "zf" | "zm" => "cmn",
        _ => "en-us",
    }
}
