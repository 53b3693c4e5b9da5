use chrono::Utc;
use log::info;

use crate::code::generate_code;
use crate::db::{NewSession, PrimaryKey, SessionData, SessionStore, StoreError};
use crate::errors::{JamError, JamResult};
use crate::profiles::ProfileProvider;
use crate::JamContext;

/// Maximum length of a session name.
const MAX_NAME_LENGTH: usize = 255;

/// Manages session lifecycle: creation, lookup, and ending.
pub struct SessionRegistry<S, P> {
    context: JamContext<S, P>,
}

impl<S, P> SessionRegistry<S, P>
where
    S: SessionStore,
    P: ProfileProvider,
{
    pub fn new(context: &JamContext<S, P>) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Creates a new session hosted by `host_user_id`, with a freshly
    /// allocated code and a clean playback state.
    pub async fn create(&self, host_user_id: &str, name: &str) -> JamResult<SessionData> {
        if name.is_empty() {
            return Err(JamError::Validation {
                field: "name",
                reason: "must not be empty",
            });
        }

        if name.len() > MAX_NAME_LENGTH {
            return Err(JamError::Validation {
                field: "name",
                reason: "must be at most 255 characters",
            });
        }

        // Codes are random, so an allocation can collide with a live
        // session. Retry a bounded number of times before reporting the
        // conflict to the caller.
        for _ in 0..self.context.config.max_code_attempts {
            let new_session = NewSession {
                host_user_id: host_user_id.to_string(),
                name: name.to_string(),
                code: generate_code(),
                max_participants: self.context.config.default_max_participants,
            };

            match self.context.store.create_session(new_session).await {
                Ok(session) => {
                    info!(
                        "Session \"{}\" created by {} with code {}",
                        session.name, session.host_user_id, session.code
                    );

                    return Ok(session);
                }
                Err(StoreError::Conflict { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(JamError::Conflict)
    }

    pub async fn session_by_id(&self, session_id: PrimaryKey) -> JamResult<SessionData> {
        Ok(self.context.store.session_by_id(session_id).await?)
    }

    /// Looks up an active session by its normalized code. Ended sessions are
    /// not visible through this read.
    pub async fn session_by_code(&self, code: &str) -> JamResult<SessionData> {
        let session = self.context.store.latest_session_by_code(code).await?;

        if !session.is_active {
            return Err(JamError::NotFound {
                resource: "session",
                identifier: "code",
            });
        }

        Ok(session)
    }

    /// Looks up the most recent session carrying a code, ended or not. The
    /// join path uses this so that joining an ended session reports it as
    /// ended rather than unknown.
    pub async fn latest_by_code(&self, code: &str) -> JamResult<SessionData> {
        Ok(self.context.store.latest_session_by_code(code).await?)
    }

    /// Ends a session. Only the host may end it; ending an already ended
    /// session is a no-op.
    pub async fn end(&self, session_id: PrimaryKey, requester_id: &str) -> JamResult<()> {
        let session = self.context.store.session_by_id(session_id).await?;

        if session.host_user_id != requester_id {
            return Err(JamError::Forbidden {
                action: "end the session",
            });
        }

        if !session.is_active {
            return Ok(());
        }

        match self.context.store.end_session(session_id, Utc::now()).await {
            Ok(session) => {
                info!("Session \"{}\" ended by host", session.name);
                Ok(())
            }
            // Lost a race against another end call; the session is ended
            // either way
            Err(StoreError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    use super::*;
    use crate::db::{
        MemoryStore, NewParticipant, ParticipantData, PlaybackPatch, Result as StoreResult,
    };
    use crate::profiles::MemoryProfiles;
    use crate::JamConfig;

    fn registry() -> SessionRegistry<MemoryStore, MemoryProfiles> {
        let context = JamContext {
            store: Arc::new(MemoryStore::new()),
            profiles: Arc::new(MemoryProfiles::new()),
            config: JamConfig::default(),
        };

        SessionRegistry::new(&context)
    }

    #[tokio::test]
    async fn created_sessions_start_clean() {
        let registry = registry();
        let session = registry.create("host", "Friday Mix").await.unwrap();

        assert!(session.is_active);
        assert!(session.queue.is_empty());
        assert!(!session.is_playing);
        assert_eq!(session.current_track_id, None);
        assert_eq!(session.current_position, 0.0);
        assert_eq!(session.max_participants, 8);
        assert_eq!(session.ended_at, None);
    }

    #[tokio::test]
    async fn names_are_validated() {
        let registry = registry();

        assert!(matches!(
            registry.create("host", "").await,
            Err(JamError::Validation { .. })
        ));
        assert!(matches!(
            registry.create("host", &"x".repeat(256)).await,
            Err(JamError::Validation { .. })
        ));
        assert!(registry.create("host", &"x".repeat(255)).await.is_ok());
    }

    #[tokio::test]
    async fn codes_are_unique_among_active_sessions() {
        let registry = registry();
        let mut codes = HashSet::new();

        for _ in 0..50 {
            let session = registry.create("host", "Listening party").await.unwrap();

            assert_eq!(session.code.len(), 6);
            assert!(codes.insert(session.code));
        }
    }

    #[tokio::test]
    async fn ended_sessions_are_invisible_by_code() {
        let registry = registry();
        let session = registry.create("host", "Friday Mix").await.unwrap();

        registry.end(session.id, "host").await.unwrap();

        assert!(matches!(
            registry.session_by_code(&session.code).await,
            Err(JamError::NotFound { .. })
        ));

        // The join path still resolves it, so it can report Ended
        let latest = registry.latest_by_code(&session.code).await.unwrap();
        assert_eq!(latest.id, session.id);
        assert!(!latest.is_active);
    }

    #[tokio::test]
    async fn ending_requires_the_host() {
        let registry = registry();
        let session = registry.create("host", "Friday Mix").await.unwrap();

        assert!(matches!(
            registry.end(session.id, "intruder").await,
            Err(JamError::Forbidden { .. })
        ));

        registry.end(session.id, "host").await.unwrap();

        let session = registry.session_by_id(session.id).await.unwrap();
        assert!(!session.is_active);
        assert!(session.ended_at.is_some());
    }

    #[tokio::test]
    async fn ending_twice_is_a_no_op() {
        let registry = registry();
        let session = registry.create("host", "Friday Mix").await.unwrap();

        registry.end(session.id, "host").await.unwrap();
        let first = registry.session_by_id(session.id).await.unwrap();

        registry.end(session.id, "host").await.unwrap();
        let second = registry.session_by_id(session.id).await.unwrap();

        assert_eq!(first.ended_at, second.ended_at);
    }

    /// A store whose inserts always collide, for exercising the retry loop.
    struct ConflictStore;

    #[async_trait]
    impl SessionStore for ConflictStore {
        async fn create_session(&self, new_session: NewSession) -> StoreResult<SessionData> {
            Err(StoreError::Conflict {
                resource: "session",
                field: "code",
                value: new_session.code,
            })
        }

        async fn session_by_id(&self, _: PrimaryKey) -> StoreResult<SessionData> {
            unreachable!()
        }

        async fn latest_session_by_code(&self, _: &str) -> StoreResult<SessionData> {
            unreachable!()
        }

        async fn update_playback(
            &self,
            _: PrimaryKey,
            _: PlaybackPatch,
        ) -> StoreResult<SessionData> {
            unreachable!()
        }

        async fn end_session(&self, _: PrimaryKey, _: DateTime<Utc>) -> StoreResult<SessionData> {
            unreachable!()
        }

        async fn idle_sessions(&self, _: DateTime<Utc>) -> StoreResult<Vec<SessionData>> {
            unreachable!()
        }

        async fn participant_by_pair(
            &self,
            _: PrimaryKey,
            _: &str,
        ) -> StoreResult<ParticipantData> {
            unreachable!()
        }

        async fn active_participants(&self, _: PrimaryKey) -> StoreResult<Vec<ParticipantData>> {
            unreachable!()
        }

        async fn count_active_participants(&self, _: PrimaryKey) -> StoreResult<u32> {
            unreachable!()
        }

        async fn create_participant(
            &self,
            _: NewParticipant,
            _: DateTime<Utc>,
        ) -> StoreResult<ParticipantData> {
            unreachable!()
        }

        async fn reactivate_participant(
            &self,
            _: PrimaryKey,
            _: DateTime<Utc>,
        ) -> StoreResult<ParticipantData> {
            unreachable!()
        }

        async fn touch_participant(
            &self,
            _: PrimaryKey,
            _: &str,
            _: DateTime<Utc>,
        ) -> StoreResult<ParticipantData> {
            unreachable!()
        }

        async fn deactivate_participant(
            &self,
            _: PrimaryKey,
            _: &str,
            _: DateTime<Utc>,
        ) -> StoreResult<ParticipantData> {
            unreachable!()
        }

        async fn stale_participants(&self, _: DateTime<Utc>) -> StoreResult<Vec<ParticipantData>> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn exhausted_code_allocation_reports_conflict() {
        let context = JamContext {
            store: Arc::new(ConflictStore),
            profiles: Arc::new(MemoryProfiles::new()),
            config: JamConfig::default(),
        };

        let registry = SessionRegistry::new(&context);

        assert!(matches!(
            registry.create("host", "Friday Mix").await,
            Err(JamError::Conflict)
        ));
    }
}
