use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, Error as SqlxError, FromRow, PgPool};

use super::{
    IntoStoreError, NewParticipant, NewSession, ParticipantData, PlaybackPatch, PrimaryKey, Result,
    SessionData, SessionStore, StoreError,
};

/// A postgres implementation of the session store. Every operation is a
/// single statement, so the row-level guarantees of postgres make each one
/// atomic.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn new(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| e.any())?;

        Ok(Self { pool })
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct SessionRow {
    id: i64,
    host_user_id: String,
    name: String,
    code: String,
    is_active: bool,
    current_track_id: Option<String>,
    current_position: f64,
    is_playing: bool,
    queue: Vec<String>,
    max_participants: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}

impl From<SessionRow> for SessionData {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            host_user_id: row.host_user_id,
            name: row.name,
            code: row.code,
            is_active: row.is_active,
            current_track_id: row.current_track_id,
            current_position: row.current_position,
            is_playing: row.is_playing,
            queue: row.queue,
            max_participants: row.max_participants as u32,
            created_at: row.created_at,
            updated_at: row.updated_at,
            ended_at: row.ended_at,
        }
    }
}

#[derive(FromRow)]
struct ParticipantRow {
    id: i64,
    session_id: i64,
    user_id: String,
    joined_at: DateTime<Utc>,
    left_at: Option<DateTime<Utc>>,
    is_active: bool,
    last_seen_at: DateTime<Utc>,
}

impl From<ParticipantRow> for ParticipantData {
    fn from(row: ParticipantRow) -> Self {
        Self {
            id: row.id,
            session_id: row.session_id,
            user_id: row.user_id,
            joined_at: row.joined_at,
            left_at: row.left_at,
            is_active: row.is_active,
            last_seen_at: row.last_seen_at,
        }
    }
}

fn is_unique_violation(error: &SqlxError) -> bool {
    matches!(error, SqlxError::Database(db) if db.code().as_deref() == Some("23505"))
}

#[async_trait]
impl SessionStore for PgStore {
    async fn session_by_id(&self, session_id: PrimaryKey) -> Result<SessionData> {
        sqlx::query_as::<_, SessionRow>("SELECT * FROM jam_sessions WHERE id = $1")
            .bind(session_id)
            .fetch_one(&self.pool)
            .await
            .map(Into::into)
            .map_err(|e| e.not_found_or("session", "id"))
    }

    async fn latest_session_by_code(&self, code: &str) -> Result<SessionData> {
        sqlx::query_as::<_, SessionRow>(
            "SELECT * FROM jam_sessions
             WHERE code = $1
             ORDER BY is_active DESC, created_at DESC
             LIMIT 1",
        )
        .bind(code)
        .fetch_one(&self.pool)
        .await
        .map(Into::into)
        .map_err(|e| e.not_found_or("session", "code"))
    }

    async fn create_session(&self, new_session: NewSession) -> Result<SessionData> {
        // The partial unique index on (code) WHERE is_active turns a code
        // collision into a constraint violation here.
        sqlx::query_as::<_, SessionRow>(
            "INSERT INTO jam_sessions (host_user_id, name, code, max_participants)
             VALUES ($1, $2, $3, $4)
             RETURNING *",
        )
        .bind(&new_session.host_user_id)
        .bind(&new_session.name)
        .bind(&new_session.code)
        .bind(new_session.max_participants as i32)
        .fetch_one(&self.pool)
        .await
        .map(Into::into)
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict {
                    resource: "session",
                    field: "code",
                    value: new_session.code.clone(),
                }
            } else {
                e.any()
            }
        })
    }

    async fn update_playback(
        &self,
        session_id: PrimaryKey,
        patch: PlaybackPatch,
    ) -> Result<SessionData> {
        sqlx::query_as::<_, SessionRow>(
            "UPDATE jam_sessions SET
                current_track_id = CASE WHEN $2 THEN $3 ELSE current_track_id END,
                current_position = COALESCE($4, current_position),
                is_playing = COALESCE($5, is_playing),
                queue = COALESCE($6, queue),
                updated_at = now()
             WHERE id = $1
             RETURNING *",
        )
        .bind(session_id)
        .bind(patch.current_track_id.is_some())
        .bind(patch.current_track_id.flatten())
        .bind(patch.current_position)
        .bind(patch.is_playing)
        .bind(patch.queue)
        .fetch_one(&self.pool)
        .await
        .map(Into::into)
        .map_err(|e| e.not_found_or("session", "id"))
    }

    async fn end_session(
        &self,
        session_id: PrimaryKey,
        ended_at: DateTime<Utc>,
    ) -> Result<SessionData> {
        sqlx::query_as::<_, SessionRow>(
            "UPDATE jam_sessions SET is_active = false, ended_at = $2, updated_at = $2
             WHERE id = $1 AND is_active = true
             RETURNING *",
        )
        .bind(session_id)
        .bind(ended_at)
        .fetch_one(&self.pool)
        .await
        .map(Into::into)
        .map_err(|e| e.not_found_or("session", "id"))
    }

    async fn idle_sessions(&self, cutoff: DateTime<Utc>) -> Result<Vec<SessionData>> {
        let rows = sqlx::query_as::<_, SessionRow>(
            "SELECT * FROM jam_sessions s
             WHERE s.is_active = true
               AND s.updated_at < $1
               AND NOT EXISTS (
                 SELECT 1 FROM jam_participants p
                 WHERE p.session_id = s.id AND p.is_active = true
               )",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn participant_by_pair(
        &self,
        session_id: PrimaryKey,
        user_id: &str,
    ) -> Result<ParticipantData> {
        sqlx::query_as::<_, ParticipantRow>(
            "SELECT * FROM jam_participants WHERE session_id = $1 AND user_id = $2",
        )
        .bind(session_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map(Into::into)
        .map_err(|e| e.not_found_or("participant", "session:user"))
    }

    async fn active_participants(&self, session_id: PrimaryKey) -> Result<Vec<ParticipantData>> {
        let rows = sqlx::query_as::<_, ParticipantRow>(
            "SELECT * FROM jam_participants
             WHERE session_id = $1 AND is_active = true
             ORDER BY joined_at",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn count_active_participants(&self, session_id: PrimaryKey) -> Result<u32> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM jam_participants WHERE session_id = $1 AND is_active = true",
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())?;

        Ok(count as u32)
    }

    async fn create_participant(
        &self,
        new_participant: NewParticipant,
        at: DateTime<Utc>,
    ) -> Result<ParticipantData> {
        sqlx::query_as::<_, ParticipantRow>(
            "INSERT INTO jam_participants (session_id, user_id, joined_at, last_seen_at)
             VALUES ($1, $2, $3, $3)
             RETURNING *",
        )
        .bind(new_participant.session_id)
        .bind(&new_participant.user_id)
        .bind(at)
        .fetch_one(&self.pool)
        .await
        .map(Into::into)
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict {
                    resource: "participant",
                    field: "session:user",
                    value: format!(
                        "{}:{}",
                        new_participant.session_id, new_participant.user_id
                    ),
                }
            } else {
                e.any()
            }
        })
    }

    async fn reactivate_participant(
        &self,
        participant_id: PrimaryKey,
        at: DateTime<Utc>,
    ) -> Result<ParticipantData> {
        sqlx::query_as::<_, ParticipantRow>(
            "UPDATE jam_participants
             SET is_active = true, left_at = NULL, joined_at = $2, last_seen_at = $2
             WHERE id = $1
             RETURNING *",
        )
        .bind(participant_id)
        .bind(at)
        .fetch_one(&self.pool)
        .await
        .map(Into::into)
        .map_err(|e| e.not_found_or("participant", "id"))
    }

    async fn touch_participant(
        &self,
        session_id: PrimaryKey,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<ParticipantData> {
        sqlx::query_as::<_, ParticipantRow>(
            "UPDATE jam_participants SET last_seen_at = $3
             WHERE session_id = $1 AND user_id = $2 AND is_active = true
             RETURNING *",
        )
        .bind(session_id)
        .bind(user_id)
        .bind(at)
        .fetch_one(&self.pool)
        .await
        .map(Into::into)
        .map_err(|e| e.not_found_or("participant", "session:user"))
    }

    async fn deactivate_participant(
        &self,
        session_id: PrimaryKey,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<ParticipantData> {
        sqlx::query_as::<_, ParticipantRow>(
            "UPDATE jam_participants SET is_active = false, left_at = $3
             WHERE session_id = $1 AND user_id = $2 AND is_active = true
             RETURNING *",
        )
        .bind(session_id)
        .bind(user_id)
        .bind(at)
        .fetch_one(&self.pool)
        .await
        .map(Into::into)
        .map_err(|e| e.not_found_or("participant", "session:user"))
    }

    async fn stale_participants(&self, cutoff: DateTime<Utc>) -> Result<Vec<ParticipantData>> {
        let rows = sqlx::query_as::<_, ParticipantRow>(
            "SELECT * FROM jam_participants WHERE is_active = true AND last_seen_at < $1",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

impl IntoStoreError for SqlxError {
    fn any(self) -> StoreError {
        StoreError::Internal(Box::new(self))
    }

    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> StoreError {
        match self {
            SqlxError::RowNotFound => StoreError::NotFound {
                resource,
                identifier,
            },
            e => Self::any(e),
        }
    }
}
