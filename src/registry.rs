//! Connection registry
//!
//! Process-global index of open client sessions keyed by connection id.
//! Enforces the two-party meeting cap and answers partner lookups. Mutations
//! are serialized behind one lock; no network I/O ever happens under it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use metrics::gauge;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::ServerEvent;
use crate::types::Participant;

/// Maximum participants per meeting.
pub const MEETING_CAP: usize = 2;

/// One open client session: participant identity plus its outbound event lane.
pub struct ParticipantSession {
    participant: Participant,
    outbound: mpsc::UnboundedSender<ServerEvent>,
    open: AtomicBool,
}

impl ParticipantSession {
    pub fn new(participant: Participant, outbound: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            participant,
            outbound,
            open: AtomicBool::new(true),
        }
    }

    pub fn participant(&self) -> &Participant {
        &self.participant
    }

    pub fn connection_id(&self) -> &str {
        &self.participant.connection_id
    }

    pub fn meeting_id(&self) -> &str {
        &self.participant.meeting_id
    }

    /// Whether the transport is still in its open state.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && !self.outbound.is_closed()
    }

    /// Mark the transport closed. Subsequent sends are dropped.
    pub fn mark_closed(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    /// Fire-and-forget event delivery. Events to a closed transport are dropped.
    pub fn send(&self, event: ServerEvent) {
        if !self.is_open() {
            debug!(
                connection_id = %self.participant.connection_id,
                "dropping event for closed transport"
            );
            return;
        }
        let _ = self.outbound.send(event);
    }
}

/// Snapshot of registry occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    pub connections: usize,
    pub meetings: usize,
}

/// Process-global session index.
#[derive(Default)]
pub struct ConnectionRegistry {
    sessions: RwLock<HashMap<String, Arc<ParticipantSession>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session, enforcing the per-meeting cap.
    pub fn add(&self, session: Arc<ParticipantSession>) -> Result<()> {
        let mut sessions = self.sessions.write().unwrap();
        let meeting_id = session.meeting_id();
        let members = sessions
            .values()
            .filter(|s| s.meeting_id() == meeting_id)
            .count();
        if members >= MEETING_CAP {
            return Err(Error::MeetingFull(meeting_id.to_string()));
        }
        sessions.insert(session.connection_id().to_string(), session.clone());
        gauge!("active_connections").set(sessions.len() as f64);
        Ok(())
    }

    /// Remove a session. Unknown ids are ignored.
    pub fn remove(&self, connection_id: &str) {
        let mut sessions = self.sessions.write().unwrap();
        if sessions.remove(connection_id).is_some() {
            debug!(connection_id, "session removed from registry");
        }
        gauge!("active_connections").set(sessions.len() as f64);
    }

    pub fn get(&self, connection_id: &str) -> Option<Arc<ParticipantSession>> {
        self.sessions.read().unwrap().get(connection_id).cloned()
    }

    /// The other live session in the meeting, if any.
    pub fn partner(&self, meeting_id: &str, connection_id: &str) -> Option<Arc<ParticipantSession>> {
        self.sessions
            .read()
            .unwrap()
            .values()
            .find(|s| {
                s.meeting_id() == meeting_id
                    && s.connection_id() != connection_id
                    && s.is_open()
            })
            .cloned()
    }

    /// All live sessions in a meeting.
    pub fn broadcast(&self, meeting_id: &str) -> Vec<Arc<ParticipantSession>> {
        self.sessions
            .read()
            .unwrap()
            .values()
            .filter(|s| s.meeting_id() == meeting_id && s.is_open())
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> RegistryStats {
        let sessions = self.sessions.read().unwrap();
        let mut meetings: Vec<&str> = sessions.values().map(|s| s.meeting_id()).collect();
        meetings.sort_unstable();
        meetings.dedup();
        RegistryStats {
            connections: sessions.len(),
            meetings: meetings.len(),
        }
    }
}
