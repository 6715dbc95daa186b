//! Text translation
//!
//! `TranslationEngine` is the single-hop seam to the external MT service;
//! `PivotTranslator` layers the routing rule on top: identity when source
//! and target dialects match, one hop when either side is English, two hops
//! through English otherwise.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::error::{Error, Result};
use crate::languages::PIVOT_LANG;

/// Single-hop translation backend.
#[async_trait]
pub trait TranslationEngine: Send + Sync {
    /// Translate `text` between two translation dialects.
    async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<String>;
}

/// Pivot-routing layer over a single-hop engine.
///
/// No retries happen here: a failed hop propagates and the pipeline falls
/// back to the original text.
pub struct PivotTranslator {
    engine: Arc<dyn TranslationEngine>,
}

impl PivotTranslator {
    pub fn new(engine: Arc<dyn TranslationEngine>) -> Self {
        Self { engine }
    }

    /// Translate `text` from `src_mt` to `dst_mt`, pivoting through English
    /// when neither endpoint is English.
    pub async fn translate(&self, text: &str, src_mt: &str, dst_mt: &str) -> Result<String> {
        if src_mt == dst_mt {
            return Ok(text.to_string());
        }
        if src_mt == PIVOT_LANG || dst_mt == PIVOT_LANG {
            return self.engine.translate(text, src_mt, dst_mt).await;
        }
        let pivoted = self.engine.translate(text, src_mt, PIVOT_LANG).await?;
        self.engine.translate(&pivoted, PIVOT_LANG, dst_mt).await
    }
}

/// Passes text through untranslated. Used when no MT endpoint is configured.
pub struct IdentityTranslator;

#[async_trait]
impl TranslationEngine for IdentityTranslator {
    async fn translate(&self, text: &str, _source_lang: &str, _target_lang: &str) -> Result<String> {
        Ok(text.to_string())
    }
}

/// JSON-over-HTTP translation client.
pub struct HttpTranslator {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct TranslateResponse {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

impl HttpTranslator {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }
}

#[async_trait]
impl TranslationEngine for HttpTranslator {
    async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<String> {
        let request_body = json!({
            "text": text,
            "sourceLanguageCode": source_lang,
            "targetLanguageCode": target_lang,
        });

        let mut request = self
            .client
            .post(format!("{}/translate", self.base_url))
            .json(&request_body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(Error::Network)?;
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Translation(format!(
                "translation service error {status}: {error_text}"
            )));
        }

        let parsed: TranslateResponse = response.json().await?;
        Ok(parsed.translated_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records each hop and returns "<text>|<src>-><dst>".
    struct RecordingEngine {
        hops: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    impl RecordingEngine {
        fn new() -> Self {
            Self {
                hops: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                hops: Mutex::new(Vec::new()),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl TranslationEngine for RecordingEngine {
        async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<String> {
            if self.fail {
                return Err(Error::Translation("backend down".into()));
            }
            self.hops
                .lock()
                .unwrap()
                .push((source_lang.to_string(), target_lang.to_string()));
            Ok(format!("{text}|{source_lang}->{target_lang}"))
        }
    }

    #[tokio::test]
    async fn identity_when_dialects_match() {
        let engine = Arc::new(RecordingEngine::new());
        let translator = PivotTranslator::new(engine.clone());
        let out = translator.translate("hola", "es", "es").await.unwrap();
        assert_eq!(out, "hola");
        assert!(engine.hops.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn single_hop_when_source_is_pivot() {
        let engine = Arc::new(RecordingEngine::new());
        let translator = PivotTranslator::new(engine.clone());
        let out = translator.translate("hello", "en", "es").await.unwrap();
        assert_eq!(out, "hello|en->es");
        assert_eq!(engine.hops.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn single_hop_when_target_is_pivot() {
        let engine = Arc::new(RecordingEngine::new());
        let translator = PivotTranslator::new(engine.clone());
        translator.translate("hola", "es", "en").await.unwrap();
        assert_eq!(
            engine.hops.lock().unwrap().as_slice(),
            &[("es".to_string(), "en".to_string())]
        );
    }

    #[tokio::test]
    async fn two_hops_between_non_pivot_dialects() {
        let engine = Arc::new(RecordingEngine::new());
        let translator = PivotTranslator::new(engine.clone());
        let out = translator.translate("hola", "es", "hi").await.unwrap();
        assert_eq!(out, "hola|es->en|en->hi");
        assert_eq!(
            engine.hops.lock().unwrap().as_slice(),
            &[
                ("es".to_string(), "en".to_string()),
                ("en".to_string(), "hi".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn failures_propagate_without_retry() {
        let engine = Arc::new(RecordingEngine::failing());
        let translator = PivotTranslator::new(engine);
        assert!(translator.translate("hola", "es", "hi").await.is_err());
    }
}
