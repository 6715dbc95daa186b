//! Error types for the meeting translation backend

use thiserror::Error;

/// Main error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("ASR error: {0}")]
    Asr(String),

    #[error("Translation error: {0}")]
    Translation(String),

    #[error("Speech synthesis error: {0}")]
    Synthesis(String),

    #[error("Meeting {0} is full")]
    MeetingFull(String),

    #[error("Client protocol error: {0}")]
    Protocol(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Meeting store error: {0}")]
    Store(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
