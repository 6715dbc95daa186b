//! Meeting translation server
//!
//! Binds the plain HTTP/WebSocket listener and, when certificate paths are
//! configured, a parallel TLS listener. Exits non-zero when either listener
//! fails.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tracing::{info, warn};

use meet_translator::asr::deepgram::DeepgramRecognizer;
use meet_translator::asr::SpeechRecognizer;
use meet_translator::config::ServerConfig;
use meet_translator::logging;
use meet_translator::meetings::MemoryMeetingStore;
use meet_translator::registry::ConnectionRegistry;
use meet_translator::server::{self, AppState};
use meet_translator::translate::{
    HttpTranslator, IdentityTranslator, PivotTranslator, TranslationEngine,
};
use meet_translator::tts::{HttpSynthesizer, NoopSynthesizer, SpeechSynthesizer};

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::from_env().context("invalid configuration")?;
    logging::init_logging(config.log_json);

    info!(region = %config.aws_region, port = config.port, "starting meeting translation server");
    if let Some(table) = &config.dynamodb_table {
        info!(table, "meeting metadata table configured; this build uses the in-memory store");
    }

    let recognizer: Arc<dyn SpeechRecognizer> = match &config.deepgram_api_key {
        Some(key) => Arc::new(DeepgramRecognizer::new(key.clone())),
        None => return Err(anyhow!("DEEPGRAM_API_KEY is required")),
    };

    let engine: Arc<dyn TranslationEngine> = match &config.translate_api_url {
        Some(url) => Arc::new(HttpTranslator::new(
            url.clone(),
            config.translate_api_key.clone(),
        )),
        None => {
            warn!("TRANSLATE_API_URL not set; captions pass through untranslated");
            Arc::new(IdentityTranslator)
        }
    };
    let translator = Arc::new(PivotTranslator::new(engine));

    let synthesizer: Arc<dyn SpeechSynthesizer> = match &config.tts_api_url {
        Some(url) => Arc::new(HttpSynthesizer::new(
            url.clone(),
            config.tts_api_key.clone(),
        )),
        None => {
            warn!("TTS_API_URL not set; translated audio disabled");
            Arc::new(NoopSynthesizer)
        }
    };

    let recorder_handle = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install metrics recorder")?;

    let state = Arc::new(AppState {
        config: config.clone(),
        registry: Arc::new(ConnectionRegistry::new()),
        store: Arc::new(MemoryMeetingStore::new()),
        recognizer,
        translator,
        synthesizer,
    });
    let app = server::build_router(state, recorder_handle);

    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("failed to bind port {}", config.port))?;
    info!(port = config.port, "listening");

    let plain = async {
        axum::serve(listener, app.clone())
            .with_graceful_shutdown(server::shutdown_signal())
            .await
    };

    if config.tls_enabled() {
        tokio::select! {
            result = plain => result.context("listener failed")?,
            result = server::serve_tls(app.clone(), &config) => {
                result.context("TLS listener failed")?
            }
        }
    } else {
        plain.await.context("listener failed")?;
    }

    info!("shutdown complete");
    Ok(())
}
