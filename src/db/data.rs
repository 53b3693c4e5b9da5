use chrono::{DateTime, Utc};
use serde::Serialize;

/// The type used for primary keys in the store.
pub type PrimaryKey = i64;

/// Opaque identity of a user, as resolved by the external identity layer.
pub type UserId = String;

/// Opaque reference to a playable track.
pub type TrackId = String;

/// A collaborative listening session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionData {
    pub id: PrimaryKey,
    /// The user that created the session, and the only one allowed to
    /// mutate its playback state or end it
    pub host_user_id: UserId,
    pub name: String,
    /// Short shareable join code, stored uppercase. Unique among sessions
    /// that have not ended.
    pub code: String,
    pub is_active: bool,
    pub current_track_id: Option<TrackId>,
    /// Playback offset in seconds
    pub current_position: f64,
    pub is_playing: bool,
    /// Upcoming tracks, in play order. Duplicates are allowed.
    pub queue: Vec<TrackId>,
    /// Occupancy cap, fixed at creation
    pub max_participants: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// A user's membership in a session. One row per (session, user) pair,
/// reused across repeated join/leave cycles.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParticipantData {
    pub id: PrimaryKey,
    pub session_id: PrimaryKey,
    pub user_id: UserId,
    /// Time of the most recent join or rejoin
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
    /// Whether the row counts toward the session's occupancy
    pub is_active: bool,
    /// Time of the most recent heartbeat or join
    pub last_seen_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NewSession {
    pub host_user_id: UserId,
    pub name: String,
    pub code: String,
    pub max_participants: u32,
}

#[derive(Debug)]
pub struct NewParticipant {
    pub session_id: PrimaryKey,
    pub user_id: UserId,
}

/// A partial update to a session's playback state. Fields left as [None]
/// are not touched.
#[derive(Debug, Clone, Default)]
pub struct PlaybackPatch {
    /// `Some(None)` clears the current track
    pub current_track_id: Option<Option<TrackId>>,
    pub current_position: Option<f64>,
    pub is_playing: Option<bool>,
    pub queue: Option<Vec<TrackId>>,
}
