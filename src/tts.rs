//! Speech synthesis
//!
//! Turns translated text into an opaque audio blob for the listener's
//! locale. Locales without a registered voice legitimately synthesize to
//! nothing; the caption is the only deliverable for those targets.

use async_trait::async_trait;
use serde_json::json;

use crate::error::{Error, Result};
use crate::languages;

/// Synthesis backend seam.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` for `locale`. `None` means the locale has no voice.
    async fn synthesize(&self, text: &str, locale: &str) -> Result<Option<Vec<u8>>>;
}

/// Synthesizer that never produces audio. Used when no TTS endpoint is
/// configured; captions still flow.
pub struct NoopSynthesizer;

#[async_trait]
impl SpeechSynthesizer for NoopSynthesizer {
    async fn synthesize(&self, _text: &str, _locale: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
}

/// JSON-over-HTTP synthesis client. The voice and engine come from the
/// language registry; the response body is the raw audio blob.
pub struct HttpSynthesizer {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpSynthesizer {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSynthesizer {
    async fn synthesize(&self, text: &str, locale: &str) -> Result<Option<Vec<u8>>> {
        let spec = languages::resolve(locale);
        let (Some(voice), Some(engine)) = (spec.tts_voice, spec.tts_engine) else {
            return Ok(None);
        };

        let request_body = json!({
            "text": text,
            "voiceId": voice,
            "engine": engine,
            "outputFormat": "mp3",
        });

        let mut request = self
            .client
            .post(format!("{}/synthesize", self.base_url))
            .json(&request_body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(Error::Network)?;
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Synthesis(format!(
                "synthesis service error {status}: {error_text}"
            )));
        }

        let audio = response.bytes().await.map_err(Error::Network)?;
        Ok(Some(audio.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn voiceless_locale_short_circuits() {
        // fil-PH has no voice in the registry; no HTTP request is made, so an
        // unroutable base URL must not matter.
        let synthesizer = HttpSynthesizer::new("http://127.0.0.1:1".to_string(), None);
        let out = synthesizer.synthesize("kumusta", "fil-PH").await.unwrap();
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn noop_synthesizer_yields_no_audio() {
        let out = NoopSynthesizer.synthesize("hola", "es-US").await.unwrap();
        assert!(out.is_none());
    }
}
