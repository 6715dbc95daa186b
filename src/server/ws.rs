//! Participant WebSocket handler
//!
//! Each connection carries binary microphone frames and JSON control frames
//! inbound, and JSON events outbound. A writer task owns the sink; the read
//! loop decodes frames and dispatches to the connection's pipeline.
//! Protocol errors produce an `error` event and keep the connection open;
//! a full meeting produces an `error` event and closes it.

use std::ops::ControlFlow;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::AppState;
use crate::pipeline::{Pipeline, PipelineEvent};
use crate::protocol::{ClientMessage, ServerEvent};
use crate::registry::ParticipantSession;
use crate::types::Participant;

pub async fn handle_websocket(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let connection_id = Uuid::new_v4().to_string();
    info!(%connection_id, "client connected");

    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerEvent>();

    let writer = tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            let Ok(json) = serde_json::to_string(&event) else {
                continue;
            };
            if sink.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let mut connection = ClientConnection {
        state,
        connection_id: connection_id.clone(),
        out_tx,
        session: None,
        pipeline: None,
    };

    while let Some(frame) = stream.next().await {
        let Ok(message) = frame else {
            break;
        };
        match message {
            Message::Binary(data) => connection.on_binary(&data),
            Message::Text(text) => {
                if connection.on_text(&text).is_break() {
                    break;
                }
            }
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    connection.teardown();
    drop(connection);
    let _ = writer.await;
    info!(%connection_id, "client disconnected");
}

struct ClientConnection {
    state: Arc<AppState>,
    connection_id: String,
    out_tx: mpsc::UnboundedSender<ServerEvent>,
    session: Option<Arc<ParticipantSession>>,
    pipeline: Option<Arc<Pipeline>>,
}

impl ClientConnection {
    fn send(&self, event: ServerEvent) {
        let _ = self.out_tx.send(event);
    }

    fn send_error(&self, message: impl Into<String>) {
        self.send(ServerEvent::Error {
            message: message.into(),
        });
    }

    fn on_binary(&self, data: &[u8]) {
        match &self.pipeline {
            Some(pipeline) => pipeline.on_audio_frame(data),
            // Audio before join has nowhere to go.
            None => debug!(connection_id = %self.connection_id, "audio frame before join"),
        }
    }

    fn on_text(&mut self, text: &str) -> ControlFlow<()> {
        let message = match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => message,
            Err(error) => {
                warn!(
                    connection_id = %self.connection_id,
                    %error,
                    "malformed control frame"
                );
                self.send_error(format!("malformed control frame: {error}"));
                return ControlFlow::Continue(());
            }
        };

        match message {
            ClientMessage::Join {
                meeting_id,
                attendee_id,
                attendee_name,
                spoken_language,
                target_language,
            } => self.on_join(
                meeting_id,
                attendee_id,
                attendee_name,
                spoken_language,
                target_language,
            ),
            ClientMessage::MicOn => self.forward(PipelineEvent::MicOn),
            ClientMessage::MicOff => self.forward(PipelineEvent::MicOff),
            ClientMessage::Stop => self.forward(PipelineEvent::Stop),
        }
    }

    fn forward(&self, event: PipelineEvent) -> ControlFlow<()> {
        match &self.pipeline {
            Some(pipeline) => pipeline.post(event),
            None => self.send_error("join the meeting first"),
        }
        ControlFlow::Continue(())
    }

    fn on_join(
        &mut self,
        meeting_id: String,
        attendee_id: String,
        attendee_name: String,
        spoken_language: String,
        target_language: String,
    ) -> ControlFlow<()> {
        if self.pipeline.is_some() {
            self.send_error("already joined");
            return ControlFlow::Continue(());
        }

        let participant = Participant {
            connection_id: self.connection_id.clone(),
            meeting_id,
            attendee_id,
            display_name: attendee_name,
            spoken_locale: spoken_language,
            target_locale: target_language,
        };

        let session = Arc::new(ParticipantSession::new(
            participant.clone(),
            self.out_tx.clone(),
        ));
        if let Err(error) = self.state.registry.add(session.clone()) {
            warn!(
                connection_id = %self.connection_id,
                meeting_id = %participant.meeting_id,
                %error,
                "join rejected"
            );
            self.send_error(error.to_string());
            // Capacity errors close the connection.
            return ControlFlow::Break(());
        }

        let pipeline = Pipeline::start(
            participant.clone(),
            self.state.registry.clone(),
            self.state.translator.clone(),
            self.state.synthesizer.clone(),
            self.state.recognizer.clone(),
        );

        info!(
            connection_id = %self.connection_id,
            meeting_id = %participant.meeting_id,
            attendee = %participant.display_name,
            spoken = %participant.spoken_locale,
            target = %participant.target_locale,
            "participant joined"
        );

        self.session = Some(session);
        self.pipeline = Some(pipeline);
        self.send(ServerEvent::Joined {
            connection_id: self.connection_id.clone(),
        });
        ControlFlow::Continue(())
    }

    fn teardown(&mut self) {
        if let Some(session) = &self.session {
            session.mark_closed();
        }
        if let Some(pipeline) = &self.pipeline {
            // The worker stops the recognizer and deregisters the session.
            pipeline.post(PipelineEvent::Shutdown);
        }
    }
}
