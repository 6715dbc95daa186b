//! Client wire protocol
//!
//! A participant connection carries two frame kinds: binary frames with raw
//! PCM16 LE mono audio at 16 kHz, and UTF-8 JSON text frames. Control frames
//! from the client are discriminated by `action`, server events by `type`.

use serde::{Deserialize, Serialize};

/// Hard cap on a single binary audio frame, bytes. Larger frames are dropped.
pub const MAX_AUDIO_FRAME_BYTES: usize = 65_536;

/// Control frames sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Opens the translation pipeline for this connection.
    #[serde(rename_all = "camelCase")]
    Join {
        meeting_id: String,
        attendee_id: String,
        attendee_name: String,
        spoken_language: String,
        target_language: String,
    },

    /// (Re)starts the recognizer session.
    MicOn,

    /// Gracefully finishes the recognizer session, flushing terminal transcripts.
    MicOff,

    /// Hard-stops the recognizer session; the connection stays open.
    Stop,
}

/// Events sent to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Translated caption for something the partner said.
    #[serde(rename_all = "camelCase")]
    Caption {
        speaker_attendee_id: String,
        speaker_name: String,
        original_text: String,
        translated_text: String,
        is_final: bool,
        detected_language: String,
        target_language: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        start_time_ms: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        end_time_ms: Option<u64>,
    },

    /// Synthesized speech for something the partner said.
    #[serde(rename_all = "camelCase")]
    Audio {
        speaker_attendee_id: String,
        /// Base64-encoded opaque audio blob
        audio_data: String,
        target_language: String,
    },

    /// Protocol or capacity error.
    Error { message: String },

    /// Acknowledges a successful join.
    #[serde(rename_all = "camelCase")]
    Joined { connection_id: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip_client(msg: &ClientMessage) {
        let json = serde_json::to_string(msg).unwrap();
        let back: ClientMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(&back, msg);
    }

    fn round_trip_server(event: &ServerEvent) {
        let json = serde_json::to_string(event).unwrap();
        let back: ServerEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(&back, event);
    }

    #[test]
    fn join_frame_shape() {
        let json = r#"{
            "action": "join",
            "meetingId": "m-1",
            "attendeeId": "a-1",
            "attendeeName": "Ada",
            "spokenLanguage": "en-US",
            "targetLanguage": "es-US"
        }"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::Join {
                meeting_id,
                spoken_language,
                ..
            } => {
                assert_eq!(meeting_id, "m-1");
                assert_eq!(spoken_language, "en-US");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn control_frames_round_trip() {
        round_trip_client(&ClientMessage::MicOn);
        round_trip_client(&ClientMessage::MicOff);
        round_trip_client(&ClientMessage::Stop);
        round_trip_client(&ClientMessage::Join {
            meeting_id: "m".into(),
            attendee_id: "a".into(),
            attendee_name: "Ada".into(),
            spoken_language: "en-US".into(),
            target_language: "hi-IN".into(),
        });
    }

    #[test]
    fn event_frames_round_trip() {
        round_trip_server(&ServerEvent::Caption {
            speaker_attendee_id: "a".into(),
            speaker_name: "Ada".into(),
            original_text: "hello".into(),
            translated_text: "hola".into(),
            is_final: true,
            detected_language: "en".into(),
            target_language: "es".into(),
            start_time_ms: Some(0),
            end_time_ms: Some(320),
        });
        round_trip_server(&ServerEvent::Audio {
            speaker_attendee_id: "a".into(),
            audio_data: "AAEC".into(),
            target_language: "es".into(),
        });
        round_trip_server(&ServerEvent::Error {
            message: "meeting m-1 is full".into(),
        });
        round_trip_server(&ServerEvent::Joined {
            connection_id: "c-1".into(),
        });
    }

    #[test]
    fn event_field_names_are_camel_case() {
        let json = serde_json::to_string(&ServerEvent::Joined {
            connection_id: "c-1".into(),
        })
        .unwrap();
        assert!(json.contains(r#""type":"joined""#));
        assert!(json.contains(r#""connectionId":"c-1""#));
    }

    #[test]
    fn caption_omits_absent_timestamps() {
        let json = serde_json::to_string(&ServerEvent::Caption {
            speaker_attendee_id: "a".into(),
            speaker_name: "Ada".into(),
            original_text: "hi".into(),
            translated_text: "hola".into(),
            is_final: false,
            detected_language: "en".into(),
            target_language: "es".into(),
            start_time_ms: None,
            end_time_ms: None,
        })
        .unwrap();
        assert!(!json.contains("startTimeMs"));
    }

    #[test]
    fn unknown_action_is_rejected() {
        let err = serde_json::from_str::<ClientMessage>(r#"{"action":"dance"}"#);
        assert!(err.is_err());
    }
}
