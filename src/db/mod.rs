use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

mod data;
pub use data::*;

mod memory;
pub use memory::*;

mod pg;
pub use pg::*;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// An unknown or internal error happened with the store
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
    /// A resource already exists
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        /// The resource in question
        resource: &'static str,
        /// The field that is conflicting
        field: &'static str,
        /// The conflicting value
        value: String,
    },
    /// A resource in the store doesn't exist
    #[error("{resource}:{identifier} doesn't exist")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
}

/// Helper trait to reduce boilerplate
pub trait IntoStoreError {
    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> StoreError;
    fn any(self) -> StoreError;
}

/// Represents a type that holds all cross-request jam state. Every method is
/// a single atomic row operation by primary key or indexed field; the core
/// holds no session state in memory between calls.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    async fn session_by_id(&self, session_id: PrimaryKey) -> Result<SessionData>;
    /// The most recent session carrying this code, preferring active ones.
    /// Codes are only unique among active sessions, so an ended session may
    /// share its code with a newer one.
    async fn latest_session_by_code(&self, code: &str) -> Result<SessionData>;
    /// Inserts a new session with a clean playback state. Fails with
    /// [StoreError::Conflict] if an active session already carries the same
    /// code.
    async fn create_session(&self, new_session: NewSession) -> Result<SessionData>;
    /// Applies the present fields of the patch and bumps `updated_at`, as
    /// one atomic row update.
    async fn update_playback(
        &self,
        session_id: PrimaryKey,
        patch: PlaybackPatch,
    ) -> Result<SessionData>;
    /// Marks an active session as ended. Fails with [StoreError::NotFound]
    /// if the session doesn't exist or has already ended.
    async fn end_session(
        &self,
        session_id: PrimaryKey,
        ended_at: DateTime<Utc>,
    ) -> Result<SessionData>;
    /// Active sessions with no active participants and no write since the
    /// cutoff.
    async fn idle_sessions(&self, cutoff: DateTime<Utc>) -> Result<Vec<SessionData>>;

    async fn participant_by_pair(
        &self,
        session_id: PrimaryKey,
        user_id: &str,
    ) -> Result<ParticipantData>;
    async fn active_participants(&self, session_id: PrimaryKey) -> Result<Vec<ParticipantData>>;
    async fn count_active_participants(&self, session_id: PrimaryKey) -> Result<u32>;
    async fn create_participant(
        &self,
        new_participant: NewParticipant,
        at: DateTime<Utc>,
    ) -> Result<ParticipantData>;
    /// Reactivates a previously-left membership row: active again, `left_at`
    /// cleared, `joined_at` and `last_seen_at` refreshed.
    async fn reactivate_participant(
        &self,
        participant_id: PrimaryKey,
        at: DateTime<Utc>,
    ) -> Result<ParticipantData>;
    /// Updates `last_seen_at` of the pair's active row, leaving `joined_at`
    /// untouched.
    async fn touch_participant(
        &self,
        session_id: PrimaryKey,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<ParticipantData>;
    /// Retires the pair's active row. Fails with [StoreError::NotFound] if
    /// there is none.
    async fn deactivate_participant(
        &self,
        session_id: PrimaryKey,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<ParticipantData>;
    /// Active participant rows whose `last_seen_at` is older than the cutoff.
    async fn stale_participants(&self, cutoff: DateTime<Utc>) -> Result<Vec<ParticipantData>>;
}
