//! Real-time translation backend for two-party multilingual meetings.
//!
//! Each participant speaks a declared language and hears the other side in
//! their own. Per connection the backend streams microphone audio into a
//! streaming recognizer, translates each transcript segment into the
//! partner's language, synthesizes speech for it, and delivers captions and
//! audio clips to the partner over a persistent WebSocket.
//!
//! # Architecture
//!
//! ```text
//! mic frames → ws handler → pipeline → ASR session → transcripts
//!                                          │
//!                                          ▼
//!                             translate (pivot via English)
//!                                  │              │
//!                             caption event   synthesis
//!                                  └──────┬───────┘
//!                                         ▼
//!                                 partner connection
//! ```
//!
//! Media transport belongs to the conferencing SDK; this service owns only
//! the parallel translation plane.

pub mod asr;
pub mod config;
pub mod error;
pub mod languages;
pub mod logging;
pub mod meetings;
pub mod pipeline;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod translate;
pub mod tts;
pub mod types;

// Re-exports for convenience
pub use error::{Error, Result};
pub use types::{Participant, TranscriptSegment};
