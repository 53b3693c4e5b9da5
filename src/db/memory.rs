use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::{
    NewParticipant, NewSession, ParticipantData, PlaybackPatch, PrimaryKey, Result, SessionData,
    SessionStore, StoreError,
};

/// An in-memory session store, used by tests and single-node deployments.
#[derive(Default)]
pub struct MemoryStore {
    sessions: Mutex<HashMap<PrimaryKey, SessionData>>,
    participants: Mutex<HashMap<PrimaryKey, ParticipantData>>,
    next_key: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Default::default()
    }

    fn next_key(&self) -> PrimaryKey {
        self.next_key.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn session_by_id(&self, session_id: PrimaryKey) -> Result<SessionData> {
        self.sessions
            .lock()
            .get(&session_id)
            .cloned()
            .ok_or(StoreError::NotFound {
                resource: "session",
                identifier: "id",
            })
    }

    async fn latest_session_by_code(&self, code: &str) -> Result<SessionData> {
        self.sessions
            .lock()
            .values()
            .filter(|s| s.code == code)
            .max_by_key(|s| (s.is_active, s.created_at))
            .cloned()
            .ok_or(StoreError::NotFound {
                resource: "session",
                identifier: "code",
            })
    }

    async fn create_session(&self, new_session: NewSession) -> Result<SessionData> {
        let mut sessions = self.sessions.lock();

        let collides = sessions
            .values()
            .any(|s| s.is_active && s.code == new_session.code);

        if collides {
            return Err(StoreError::Conflict {
                resource: "session",
                field: "code",
                value: new_session.code,
            });
        }

        let now = Utc::now();
        let session = SessionData {
            id: self.next_key(),
            host_user_id: new_session.host_user_id,
            name: new_session.name,
            code: new_session.code,
            is_active: true,
            current_track_id: None,
            current_position: 0.0,
            is_playing: false,
            queue: Vec::new(),
            max_participants: new_session.max_participants,
            created_at: now,
            updated_at: now,
            ended_at: None,
        };

        sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn update_playback(
        &self,
        session_id: PrimaryKey,
        patch: PlaybackPatch,
    ) -> Result<SessionData> {
        let mut sessions = self.sessions.lock();

        let session = sessions.get_mut(&session_id).ok_or(StoreError::NotFound {
            resource: "session",
            identifier: "id",
        })?;

        if let Some(track) = patch.current_track_id {
            session.current_track_id = track;
        }

        if let Some(position) = patch.current_position {
            session.current_position = position;
        }

        if let Some(playing) = patch.is_playing {
            session.is_playing = playing;
        }

        if let Some(queue) = patch.queue {
            session.queue = queue;
        }

        session.updated_at = Utc::now();
        Ok(session.clone())
    }

    async fn end_session(
        &self,
        session_id: PrimaryKey,
        ended_at: DateTime<Utc>,
    ) -> Result<SessionData> {
        let mut sessions = self.sessions.lock();

        let session = sessions
            .get_mut(&session_id)
            .filter(|s| s.is_active)
            .ok_or(StoreError::NotFound {
                resource: "session",
                identifier: "id",
            })?;

        session.is_active = false;
        session.ended_at = Some(ended_at);
        session.updated_at = ended_at;

        Ok(session.clone())
    }

    async fn idle_sessions(&self, cutoff: DateTime<Utc>) -> Result<Vec<SessionData>> {
        let sessions = self.sessions.lock();
        let participants = self.participants.lock();

        Ok(sessions
            .values()
            .filter(|s| {
                s.is_active
                    && s.updated_at < cutoff
                    && !participants
                        .values()
                        .any(|p| p.session_id == s.id && p.is_active)
            })
            .cloned()
            .collect())
    }

    async fn participant_by_pair(
        &self,
        session_id: PrimaryKey,
        user_id: &str,
    ) -> Result<ParticipantData> {
        self.participants
            .lock()
            .values()
            .find(|p| p.session_id == session_id && p.user_id == user_id)
            .cloned()
            .ok_or(StoreError::NotFound {
                resource: "participant",
                identifier: "session:user",
            })
    }

    async fn active_participants(&self, session_id: PrimaryKey) -> Result<Vec<ParticipantData>> {
        let mut active: Vec<_> = self
            .participants
            .lock()
            .values()
            .filter(|p| p.session_id == session_id && p.is_active)
            .cloned()
            .collect();

        active.sort_by_key(|p| p.joined_at);
        Ok(active)
    }

    async fn count_active_participants(&self, session_id: PrimaryKey) -> Result<u32> {
        let count = self
            .participants
            .lock()
            .values()
            .filter(|p| p.session_id == session_id && p.is_active)
            .count();

        Ok(count as u32)
    }

    async fn create_participant(
        &self,
        new_participant: NewParticipant,
        at: DateTime<Utc>,
    ) -> Result<ParticipantData> {
        let mut participants = self.participants.lock();

        let exists = participants.values().any(|p| {
            p.session_id == new_participant.session_id && p.user_id == new_participant.user_id
        });

        if exists {
            return Err(StoreError::Conflict {
                resource: "participant",
                field: "session:user",
                value: format!(
                    "{}:{}",
                    new_participant.session_id, new_participant.user_id
                ),
            });
        }

        let participant = ParticipantData {
            id: self.next_key(),
            session_id: new_participant.session_id,
            user_id: new_participant.user_id,
            joined_at: at,
            left_at: None,
            is_active: true,
            last_seen_at: at,
        };

        participants.insert(participant.id, participant.clone());
        Ok(participant)
    }

    async fn reactivate_participant(
        &self,
        participant_id: PrimaryKey,
        at: DateTime<Utc>,
    ) -> Result<ParticipantData> {
        let mut participants = self.participants.lock();

        let participant = participants
            .get_mut(&participant_id)
            .ok_or(StoreError::NotFound {
                resource: "participant",
                identifier: "id",
            })?;

        participant.is_active = true;
        participant.left_at = None;
        participant.joined_at = at;
        participant.last_seen_at = at;

        Ok(participant.clone())
    }

    async fn touch_participant(
        &self,
        session_id: PrimaryKey,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<ParticipantData> {
        let mut participants = self.participants.lock();

        let participant = participants
            .values_mut()
            .find(|p| p.session_id == session_id && p.user_id == user_id && p.is_active)
            .ok_or(StoreError::NotFound {
                resource: "participant",
                identifier: "session:user",
            })?;

        participant.last_seen_at = at;
        Ok(participant.clone())
    }

    async fn deactivate_participant(
        &self,
        session_id: PrimaryKey,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<ParticipantData> {
        let mut participants = self.participants.lock();

        let participant = participants
            .values_mut()
            .find(|p| p.session_id == session_id && p.user_id == user_id && p.is_active)
            .ok_or(StoreError::NotFound {
                resource: "participant",
                identifier: "session:user",
            })?;

        participant.is_active = false;
        participant.left_at = Some(at);

        Ok(participant.clone())
    }

    async fn stale_participants(&self, cutoff: DateTime<Utc>) -> Result<Vec<ParticipantData>> {
        Ok(self
            .participants
            .lock()
            .values()
            .filter(|p| p.is_active && p.last_seen_at < cutoff)
            .cloned()
            .collect())
    }
}
