//! Live-transcription WebSocket adapter
//!
//! Speaks the provider's streaming protocol: binary frames carry audio,
//! text frames carry JSON results and control messages (`KeepAlive`,
//! `CloseStream`). One writer and one reader task bridge the socket to the
//! channel pair the session layer consumes.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::connect_async;
use tracing::{debug, warn};

use super::{RecognizerEvent, RecognizerInput, RecognizerStream, SpeechRecognizer};
use crate::error::{Error, Result};
use crate::languages;
use crate::types::TranscriptSegment;

const DEFAULT_BASE_URL: &str = "wss://api.deepgram.com";
const CHANNEL_CAPACITY: usize = 64;

/// Streaming recognizer backed by the Deepgram live-transcription API.
pub struct DeepgramRecognizer {
    api_key: String,
    base_url: String,
}

impl DeepgramRecognizer {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Override the endpoint, e.g. for a self-hosted deployment.
    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        Self { api_key, base_url }
    }

    fn listen_url(&self, asr_code: &str) -> String {
        format!(
            "{}/v1/listen?model=nova-2&language={}&encoding=linear16&sample_rate=16000&channels=1&interim_results=true&punctuate=true",
            self.base_url, asr_code
        )
    }
}

#[async_trait]
impl SpeechRecognizer for DeepgramRecognizer {
    async fn open(&self, asr_code: &str) -> Result<RecognizerStream> {
        let mut request = self
            .listen_url(asr_code)
            .into_client_request()
            .map_err(Error::WebSocket)?;
        let auth = HeaderValue::from_str(&format!("Token {}", self.api_key))
            .map_err(|_| Error::Config("recognizer API key is not a valid header value".into()))?;
        request.headers_mut().insert(AUTHORIZATION, auth);

        let (socket, _response) = connect_async(request).await.map_err(Error::WebSocket)?;
        debug!(asr_code, "recognizer stream opened");
        let (mut sink, mut source) = socket.split();

        let (input_tx, mut input_rx) = mpsc::channel::<RecognizerInput>(CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel::<RecognizerEvent>(CHANNEL_CAPACITY);

        tokio::spawn(async move {
            while let Some(input) = input_rx.recv().await {
                let message = match input {
                    RecognizerInput::Audio(bytes) => Message::Binary(bytes),
                    RecognizerInput::KeepAlive => {
                        Message::Text(r#"{"type":"KeepAlive"}"#.to_string())
                    }
                    RecognizerInput::Finish => {
                        Message::Text(r#"{"type":"CloseStream"}"#.to_string())
                    }
                };
                if sink.send(message).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let source_lang = languages::mt_from_asr(asr_code).to_string();
        tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        if let Some(segment) = parse_live_result(&text, &source_lang) {
                            if event_tx
                                .send(RecognizerEvent::Transcript(segment))
                                .await
                                .is_err()
                            {
                                return;
                            }
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(error) => {
                        warn!(%error, "recognizer socket error");
                        let _ = event_tx
                            .send(RecognizerEvent::Error(error.to_string()))
                            .await;
                        return;
                    }
                }
            }
            let _ = event_tx.send(RecognizerEvent::Closed).await;
        });

        Ok(RecognizerStream {
            input: input_tx,
            events: event_rx,
        })
    }
}

#[derive(Deserialize)]
struct LiveResult {
    #[serde(rename = "type")]
    kind: Option<String>,
    channel: Option<LiveChannel>,
    is_final: Option<bool>,
    start: Option<f64>,
    duration: Option<f64>,
}

#[derive(Deserialize)]
struct LiveChannel {
    alternatives: Vec<LiveAlternative>,
}

#[derive(Deserialize)]
struct LiveAlternative {
    transcript: String,
}

/// Parse one live-result frame into a transcript segment. Non-result frames
/// (metadata, speech events) yield nothing.
fn parse_live_result(text: &str, source_lang: &str) -> Option<TranscriptSegment> {
    let result: LiveResult = serde_json::from_str(text).ok()?;
    if result.kind.as_deref() != Some("Results") {
        return None;
    }
    let alternative = result.channel?.alternatives.into_iter().next()?;
    let start = result.start.unwrap_or(0.0);
    let end = start + result.duration.unwrap_or(0.0);
    Some(TranscriptSegment {
        text: alternative.transcript,
        is_final: result.is_final.unwrap_or(false),
        source_lang: source_lang.to_string(),
        start_ms: (start * 1000.0) as u64,
        end_ms: (end * 1000.0) as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_result() {
        let frame = r#"{
            "type": "Results",
            "channel": {"alternatives": [{"transcript": "hello wor", "confidence": 0.92}]},
            "is_final": false,
            "start": 1.5,
            "duration": 0.8
        }"#;
        let segment = parse_live_result(frame, "en").unwrap();
        assert_eq!(segment.text, "hello wor");
        assert!(!segment.is_final);
        assert_eq!(segment.source_lang, "en");
        assert_eq!(segment.start_ms, 1500);
        assert_eq!(segment.end_ms, 2300);
    }

    #[test]
    fn parses_final_result() {
        let frame = r#"{
            "type": "Results",
            "channel": {"alternatives": [{"transcript": "hello world"}]},
            "is_final": true,
            "start": 0.0,
            "duration": 1.2
        }"#;
        let segment = parse_live_result(frame, "en").unwrap();
        assert!(segment.is_final);
        assert_eq!(segment.end_ms, 1200);
    }

    #[test]
    fn metadata_frames_are_ignored() {
        let frame = r#"{"type": "Metadata", "request_id": "abc"}"#;
        assert!(parse_live_result(frame, "en").is_none());
    }

    #[test]
    fn malformed_frames_are_ignored() {
        assert!(parse_live_result("not json", "en").is_none());
        assert!(parse_live_result(r#"{"type":"Results"}"#, "en").is_none());
    }

    #[test]
    fn listen_url_carries_stream_parameters() {
        let recognizer =
            DeepgramRecognizer::with_base_url("key".into(), "wss://dg.example.com".into());
        let url = recognizer.listen_url("es-US");
        assert!(url.starts_with("wss://dg.example.com/v1/listen?"));
        assert!(url.contains("language=es-US"));
        assert!(url.contains("encoding=linear16"));
        assert!(url.contains("sample_rate=16000"));
        assert!(url.contains("interim_results=true"));
    }
}
