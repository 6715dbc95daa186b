//! Environment-driven server configuration

use std::env;

use crate::error::{Error, Result};

/// Streaming recognizer backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AsrProvider {
    #[default]
    Deepgram,
    Aws,
}

impl AsrProvider {
    fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "deepgram" => Ok(Self::Deepgram),
            "aws" => Ok(Self::Aws),
            other => Err(Error::Config(format!("unknown ASR provider: {other}"))),
        }
    }
}

/// Main server configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Provider region, `AWS_REGION`
    pub aws_region: String,

    /// Plain listener port, `PORT`
    pub port: u16,

    /// CORS allowlist, `CORS_ORIGIN` (comma-separated). Empty allows any origin.
    pub cors_origins: Vec<String>,

    /// Meeting metadata table, `DYNAMODB_TABLE_NAME`
    pub dynamodb_table: Option<String>,

    /// Recognizer backend, `ASR_PROVIDER`
    pub asr_provider: AsrProvider,

    /// Recognizer credentials, `DEEPGRAM_API_KEY`
    pub deepgram_api_key: Option<String>,

    /// Translation service endpoint and key, `TRANSLATE_API_URL` / `TRANSLATE_API_KEY`
    pub translate_api_url: Option<String>,
    pub translate_api_key: Option<String>,

    /// Synthesis service endpoint and key, `TTS_API_URL` / `TTS_API_KEY`
    pub tts_api_url: Option<String>,
    pub tts_api_key: Option<String>,

    /// PEM paths for the parallel TLS listener, `SSL_CERT_PATH` / `SSL_KEY_PATH`
    pub ssl_cert_path: Option<String>,
    pub ssl_key_path: Option<String>,

    /// TLS listener port, `SSL_PORT`
    pub ssl_port: u16,

    /// Emit JSON logs when `LOG_JSON` is truthy
    pub log_json: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            aws_region: "us-east-1".to_string(),
            port: 3001,
            cors_origins: Vec::new(),
            dynamodb_table: None,
            asr_provider: AsrProvider::Deepgram,
            deepgram_api_key: None,
            translate_api_url: None,
            translate_api_key: None,
            tts_api_url: None,
            tts_api_key: None,
            ssl_cert_path: None,
            ssl_key_path: None,
            ssl_port: 443,
            log_json: false,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, applying defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(region) = env::var("AWS_REGION") {
            if !region.is_empty() {
                config.aws_region = region;
            }
        }
        if let Ok(port) = env::var("PORT") {
            config.port = port
                .parse()
                .map_err(|_| Error::Config(format!("invalid PORT: {port}")))?;
        }
        if let Ok(origins) = env::var("CORS_ORIGIN") {
            config.cors_origins = origins
                .split(',')
                .map(|origin| origin.trim().to_string())
                .filter(|origin| !origin.is_empty())
                .collect();
        }
        config.dynamodb_table = non_empty(env::var("DYNAMODB_TABLE_NAME").ok());
        if let Ok(provider) = env::var("ASR_PROVIDER") {
            config.asr_provider = AsrProvider::parse(&provider)?;
        }
        config.deepgram_api_key = non_empty(env::var("DEEPGRAM_API_KEY").ok());
        config.translate_api_url = non_empty(env::var("TRANSLATE_API_URL").ok());
        config.translate_api_key = non_empty(env::var("TRANSLATE_API_KEY").ok());
        config.tts_api_url = non_empty(env::var("TTS_API_URL").ok());
        config.tts_api_key = non_empty(env::var("TTS_API_KEY").ok());
        config.ssl_cert_path = non_empty(env::var("SSL_CERT_PATH").ok());
        config.ssl_key_path = non_empty(env::var("SSL_KEY_PATH").ok());
        if let Ok(port) = env::var("SSL_PORT") {
            config.ssl_port = port
                .parse()
                .map_err(|_| Error::Config(format!("invalid SSL_PORT: {port}")))?;
        }
        config.log_json = matches!(
            env::var("LOG_JSON").as_deref(),
            Ok("1") | Ok("true") | Ok("yes")
        );

        config.validate()?;
        Ok(config)
    }

    /// TLS is enabled only when both PEM paths are present.
    pub fn tls_enabled(&self) -> bool {
        self.ssl_cert_path.is_some() && self.ssl_key_path.is_some()
    }

    fn validate(&self) -> Result<()> {
        if self.asr_provider == AsrProvider::Aws {
            // The trait seam exists; only the Deepgram backend ships here.
            return Err(Error::Config(
                "ASR_PROVIDER=aws is recognized but no AWS recognizer backend is built in".into(),
            ));
        }
        if self.ssl_cert_path.is_some() != self.ssl_key_path.is_some() {
            return Err(Error::Config(
                "SSL_CERT_PATH and SSL_KEY_PATH must be set together".into(),
            ));
        }
        Ok(())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
