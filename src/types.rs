//! Core types and data structures

use serde::{Deserialize, Serialize};

/// One segment emitted by the streaming recognizer.
///
/// For a given utterance the recognizer emits zero or more partial segments
/// with growing text, followed by at most one final segment. A partial is
/// never promoted except by a subsequent final.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptSegment {
    /// Transcribed text (possibly empty)
    pub text: String,

    /// Whether the recognizer has frozen this segment
    pub is_final: bool,

    /// Translate-dialect code reported for this segment (e.g. "en", "hi")
    pub source_lang: String,

    /// Segment start offset within the stream, milliseconds
    pub start_ms: u64,

    /// Segment end offset within the stream, milliseconds
    pub end_ms: u64,
}

/// Identity of a joined participant, as declared in the join frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    /// Process-unique connection id assigned at socket accept
    pub connection_id: String,

    /// Meeting this participant belongs to
    pub meeting_id: String,

    /// Provider-issued attendee id
    pub attendee_id: String,

    /// Display name shown on captions
    pub display_name: String,

    /// Locale the participant speaks (e.g. "en-US")
    pub spoken_locale: String,

    /// Locale the participant wants to receive (used when no partner is present)
    pub target_locale: String,
}
