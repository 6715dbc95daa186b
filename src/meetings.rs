//! Meeting metadata store
//!
//! Records created by the REST surface so a second participant can join an
//! existing meeting. The store is a seam: this build ships the in-memory
//! backend, with the table name from configuration logged for deployments
//! that front it with an external database.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// One meeting and its issued attendees.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingRecord {
    pub meeting_id: String,
    pub created_at: DateTime<Utc>,
    pub attendees: Vec<AttendeeRecord>,
}

impl MeetingRecord {
    pub fn new() -> Self {
        Self {
            meeting_id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            attendees: Vec::new(),
        }
    }
}

impl Default for MeetingRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// One issued attendee identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendeeRecord {
    pub attendee_id: String,
    pub attendee_name: String,
    pub join_token: String,
}

impl AttendeeRecord {
    pub fn new(attendee_name: &str) -> Self {
        Self {
            attendee_id: Uuid::new_v4().to_string(),
            attendee_name: attendee_name.to_string(),
            join_token: Uuid::new_v4().to_string(),
        }
    }
}

/// Persistence seam for meeting metadata.
#[async_trait]
pub trait MeetingStore: Send + Sync {
    async fn create_meeting(&self, record: MeetingRecord) -> Result<()>;

    async fn get_meeting(&self, meeting_id: &str) -> Result<Option<MeetingRecord>>;

    /// Append an attendee. Returns false when the meeting does not exist.
    async fn add_attendee(&self, meeting_id: &str, attendee: AttendeeRecord) -> Result<bool>;
}

/// HashMap-backed store for single-process deployments.
#[derive(Default)]
pub struct MemoryMeetingStore {
    meetings: RwLock<HashMap<String, MeetingRecord>>,
}

impl MemoryMeetingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MeetingStore for MemoryMeetingStore {
    async fn create_meeting(&self, record: MeetingRecord) -> Result<()> {
        self.meetings
            .write()
            .unwrap()
            .insert(record.meeting_id.clone(), record);
        Ok(())
    }

    async fn get_meeting(&self, meeting_id: &str) -> Result<Option<MeetingRecord>> {
        Ok(self.meetings.read().unwrap().get(meeting_id).cloned())
    }

    async fn add_attendee(&self, meeting_id: &str, attendee: AttendeeRecord) -> Result<bool> {
        let mut meetings = self.meetings.write().unwrap();
        match meetings.get_mut(meeting_id) {
            Some(meeting) => {
                meeting.attendees.push(attendee);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_fetch_meeting() {
        let store = MemoryMeetingStore::new();
        let mut meeting = MeetingRecord::new();
        meeting.attendees.push(AttendeeRecord::new("Ada"));
        let id = meeting.meeting_id.clone();
        store.create_meeting(meeting).await.unwrap();

        let fetched = store.get_meeting(&id).await.unwrap().unwrap();
        assert_eq!(fetched.attendees.len(), 1);
        assert_eq!(fetched.attendees[0].attendee_name, "Ada");
    }

    #[tokio::test]
    async fn add_attendee_to_missing_meeting_reports_absence() {
        let store = MemoryMeetingStore::new();
        let added = store
            .add_attendee("nope", AttendeeRecord::new("Grace"))
            .await
            .unwrap();
        assert!(!added);
    }

    #[tokio::test]
    async fn attendee_ids_are_unique() {
        let a = AttendeeRecord::new("Ada");
        let b = AttendeeRecord::new("Ada");
        assert_ne!(a.attendee_id, b.attendee_id);
        assert_ne!(a.join_token, b.join_token);
    }
}
