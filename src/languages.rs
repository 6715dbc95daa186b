//! Static language registry
//!
//! Maps canonical locales to the codes each provider speaks: the recognizer
//! dialect, the translation dialect, and the synthesis voice. Unknown inputs
//! resolve to the pivot language so lookups never fail.

/// Canonical pivot language for two-hop translation.
pub const PIVOT_LANG: &str = "en";

/// Provider codes for one supported locale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguageSpec {
    /// Canonical locale, e.g. "es-US"
    pub locale: &'static str,

    /// Streaming recognizer dialect code
    pub asr_code: &'static str,

    /// Translation dialect code
    pub mt_code: &'static str,

    /// Synthesis voice, absent for text-only targets
    pub tts_voice: Option<&'static str>,

    /// Synthesis engine paired with the voice
    pub tts_engine: Option<&'static str>,
}

/// Supported locales. The first entry is the pivot fallback.
static LANGUAGES: &[LanguageSpec] = &[
    LanguageSpec { locale: "en-US", asr_code: "en-US", mt_code: "en", tts_voice: Some("Joanna"), tts_engine: Some("neural") },
    LanguageSpec { locale: "en-GB", asr_code: "en-GB", mt_code: "en", tts_voice: Some("Amy"), tts_engine: Some("neural") },
    LanguageSpec { locale: "es-US", asr_code: "es-US", mt_code: "es", tts_voice: Some("Lupe"), tts_engine: Some("neural") },
    LanguageSpec { locale: "es-ES", asr_code: "es-ES", mt_code: "es", tts_voice: Some("Lucia"), tts_engine: Some("neural") },
    LanguageSpec { locale: "fr-FR", asr_code: "fr-FR", mt_code: "fr", tts_voice: Some("Lea"), tts_engine: Some("neural") },
    LanguageSpec { locale: "de-DE", asr_code: "de-DE", mt_code: "de", tts_voice: Some("Vicki"), tts_engine: Some("neural") },
    LanguageSpec { locale: "it-IT", asr_code: "it-IT", mt_code: "it", tts_voice: Some("Bianca"), tts_engine: Some("neural") },
    LanguageSpec { locale: "pt-BR", asr_code: "pt-BR", mt_code: "pt", tts_voice: Some("Camila"), tts_engine: Some("neural") },
    LanguageSpec { locale: "hi-IN", asr_code: "hi-IN", mt_code: "hi", tts_voice: Some("Kajal"), tts_engine: Some("neural") },
    LanguageSpec { locale: "ja-JP", asr_code: "ja-JP", mt_code: "ja", tts_voice: Some("Takumi"), tts_engine: Some("neural") },
    LanguageSpec { locale: "ko-KR", asr_code: "ko-KR", mt_code: "ko", tts_voice: Some("Seoyeon"), tts_engine: Some("neural") },
    LanguageSpec { locale: "zh-CN", asr_code: "zh-CN", mt_code: "zh", tts_voice: Some("Zhiyu"), tts_engine: Some("neural") },
    // Recognized and translated, but no synthesis voice: captions only.
    LanguageSpec { locale: "fil-PH", asr_code: "fil-PH", mt_code: "fil", tts_voice: None, tts_engine: None },
];

/// Resolve a locale to its provider codes, falling back to the pivot entry.
pub fn resolve(locale: &str) -> &'static LanguageSpec {
    LANGUAGES
        .iter()
        .find(|spec| spec.locale.eq_ignore_ascii_case(locale))
        .or_else(|| {
            let primary = primary_subtag(locale);
            LANGUAGES
                .iter()
                .find(|spec| primary_subtag(spec.locale).eq_ignore_ascii_case(primary))
        })
        .unwrap_or(&LANGUAGES[0])
}

/// Translation dialect for a locale.
pub fn mt(locale: &str) -> &'static str {
    resolve(locale).mt_code
}

/// Recognizer dialect for a locale.
pub fn asr(locale: &str) -> &'static str {
    resolve(locale).asr_code
}

/// Map a recognizer dialect back to its translation dialect.
///
/// Accepts a full recognizer code ("en-US"), an already-bare translation
/// dialect ("hi"), or anything else, which yields the pivot.
pub fn mt_from_asr(asr_code: &str) -> &'static str {
    if let Some(spec) = LANGUAGES
        .iter()
        .find(|spec| spec.asr_code.eq_ignore_ascii_case(asr_code))
    {
        return spec.mt_code;
    }
    if let Some(spec) = LANGUAGES
        .iter()
        .find(|spec| spec.mt_code.eq_ignore_ascii_case(asr_code))
    {
        return spec.mt_code;
    }
    let primary = primary_subtag(asr_code);
    LANGUAGES
        .iter()
        .find(|spec| primary_subtag(spec.locale).eq_ignore_ascii_case(primary))
        .map(|spec| spec.mt_code)
        .unwrap_or(PIVOT_LANG)
}

fn primary_subtag(code: &str) -> &str {
    code.split(['-', '_']).next().unwrap_or(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_known_locale() {
        let spec = resolve("es-US");
        assert_eq!(spec.asr_code, "es-US");
        assert_eq!(spec.mt_code, "es");
        assert_eq!(spec.tts_voice, Some("Lupe"));
    }

    #[test]
    fn unknown_locale_falls_back_to_pivot() {
        let spec = resolve("tlh-KL");
        assert_eq!(spec.mt_code, PIVOT_LANG);
        assert_eq!(spec.locale, "en-US");
    }

    #[test]
    fn primary_subtag_match_when_region_unknown() {
        assert_eq!(resolve("es-MX").mt_code, "es");
        assert_eq!(resolve("fr-CA").mt_code, "fr");
    }

    #[test]
    fn mt_from_asr_round_trips_every_locale() {
        for spec in LANGUAGES {
            assert_eq!(mt_from_asr(asr(spec.locale)), mt(spec.locale));
        }
    }

    #[test]
    fn mt_from_asr_accepts_bare_dialect() {
        assert_eq!(mt_from_asr("hi"), "hi");
        assert_eq!(mt_from_asr("en"), "en");
    }

    #[test]
    fn mt_from_asr_unknown_yields_pivot() {
        assert_eq!(mt_from_asr("xx-XX"), PIVOT_LANG);
    }

    #[test]
    fn text_only_target_has_no_voice() {
        let spec = resolve("fil-PH");
        assert!(spec.tts_voice.is_none());
        assert!(spec.tts_engine.is_none());
    }
}
