//! Server setup and shared application state.

pub mod rest;
pub mod ws;

use std::path::Path;
use std::sync::Arc;

use axum::{
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{debug, info};

use crate::asr::SpeechRecognizer;
use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::meetings::MeetingStore;
use crate::registry::ConnectionRegistry;
use crate::translate::PivotTranslator;
use crate::tts::SpeechSynthesizer;

/// Shared application state for the HTTP server.
pub struct AppState {
    pub config: ServerConfig,
    pub registry: Arc<ConnectionRegistry>,
    pub store: Arc<dyn MeetingStore>,
    pub recognizer: Arc<dyn SpeechRecognizer>,
    pub translator: Arc<PivotTranslator>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
}

/// Build the HTTP router for the service.
pub fn build_router(state: Arc<AppState>, recorder_handle: PrometheusHandle) -> Router {
    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .route("/api/health", get(rest::health))
        .route("/api/meetings", post(rest::create_meeting))
        .route("/api/meetings/:meeting_id/attendees", post(rest::add_attendee))
        .route("/ws", get(ws::handle_websocket))
        .route(
            "/metrics",
            get(move || {
                let handle = recorder_handle.clone();
                async move { handle.render() }
            }),
        )
        .layer(cors)
        .with_state(state)
}

/// CORS allowlist from configuration. An empty allowlist permits any origin.
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}

/// Serve the router over TLS on the configured port. Only returns on a
/// listener failure.
pub async fn serve_tls(app: Router, config: &ServerConfig) -> Result<()> {
    let (Some(cert_path), Some(key_path)) = (&config.ssl_cert_path, &config.ssl_key_path) else {
        return Err(Error::Config("TLS listener requires cert and key paths".into()));
    };
    let tls_config = tls_server_config(Path::new(cert_path), Path::new(key_path))?;
    let acceptor = TlsAcceptor::from(tls_config);
    let listener = TcpListener::bind(("0.0.0.0", config.ssl_port)).await?;
    info!(port = config.ssl_port, "TLS listener started");

    loop {
        let (stream, peer) = listener.accept().await?;
        let acceptor = acceptor.clone();
        let app = app.clone();
        tokio::spawn(async move {
            let tls_stream = match acceptor.accept(stream).await {
                Ok(stream) => stream,
                Err(error) => {
                    debug!(%peer, %error, "TLS handshake failed");
                    return;
                }
            };
            let service = hyper_util::service::TowerToHyperService::new(app);
            let builder = hyper_util::server::conn::auto::Builder::new(
                hyper_util::rt::TokioExecutor::new(),
            );
            if let Err(error) = builder
                .serve_connection_with_upgrades(hyper_util::rt::TokioIo::new(tls_stream), service)
                .await
            {
                debug!(%peer, %error, "TLS connection ended with error");
            }
        });
    }
}

/// Load PEM cert chain and private key into a rustls server config.
fn tls_server_config(
    cert_path: &Path,
    key_path: &Path,
) -> Result<Arc<rustls::ServerConfig>> {
    let cert_file = std::fs::File::open(cert_path)?;
    let mut cert_reader = std::io::BufReader::new(cert_file);
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut cert_reader)
        .filter_map(|cert| cert.ok())
        .collect();
    if certs.is_empty() {
        return Err(Error::Config(format!(
            "no certificates found in {}",
            cert_path.display()
        )));
    }

    let key_file = std::fs::File::open(key_path)?;
    let mut key_reader = std::io::BufReader::new(key_file);
    let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut key_reader)?
        .ok_or_else(|| Error::Config(format!("no private key found in {}", key_path.display())))?;

    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|error| Error::Config(format!("invalid TLS material: {error}")))?;
    Ok(Arc::new(config))
}

/// Wait for a shutdown signal.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
