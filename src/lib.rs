//! The jam collab core: one host and a bounded set of participants share a
//! single playback timeline across independently polling clients. All
//! cross-request state lives in a [SessionStore]; the core itself is
//! stateless between calls, so any number of instances can serve the same
//! sessions.

mod code;
mod config;
mod db;
mod errors;
mod playback;
mod presence;
mod profiles;
mod registry;
mod sweep;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub use code::*;
pub use config::*;
pub use db::*;
pub use errors::*;
pub use playback::*;
pub use presence::*;
pub use profiles::*;
pub use registry::*;
pub use sweep::*;

/// The jam collab system, facilitating session lifecycle, presence, and
/// playback synchronization. This is the single entry point for the
/// embedding API layer; it normalizes input and delegates, nothing more.
pub struct Jam<S, P> {
    context: JamContext<S, P>,

    pub registry: SessionRegistry<S, P>,
    pub presence: PresenceManager<S, P>,
    pub playback: PlaybackReplicator<S, P>,
    pub sweeper: CleanupSweeper<S, P>,
}

/// A type passed to the components of the jam system, to access the store
/// and its collaborators.
pub struct JamContext<S, P> {
    pub store: Arc<S>,
    pub profiles: Arc<P>,
    pub config: JamConfig,
}

impl<S, P> Clone for JamContext<S, P> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            profiles: self.profiles.clone(),
            config: self.config.clone(),
        }
    }
}

/// A session by id or by human-entered code.
#[derive(Debug, Clone)]
pub enum SessionRef {
    Id(PrimaryKey),
    Code(String),
}

impl From<PrimaryKey> for SessionRef {
    fn from(value: PrimaryKey) -> Self {
        Self::Id(value)
    }
}

impl From<&str> for SessionRef {
    fn from(value: &str) -> Self {
        Self::Code(value.to_string())
    }
}

/// A session plus the server clock at the time of the read, so polling
/// clients can correct for their own clock drift.
#[derive(Debug, Serialize)]
pub struct SessionSnapshot {
    pub session: SessionData,
    pub server_time: DateTime<Utc>,
}

/// The combined session and active-participants read.
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub session: SessionData,
    pub participants: Vec<ActiveParticipant>,
    pub server_time: DateTime<Utc>,
}

impl<S, P> Jam<S, P>
where
    S: SessionStore,
    P: ProfileProvider,
{
    pub fn new(store: S, profiles: P) -> Self {
        Self::with_config(store, profiles, JamConfig::default())
    }

    pub fn with_config(store: S, profiles: P, config: JamConfig) -> Self {
        let context = JamContext {
            store: Arc::new(store),
            profiles: Arc::new(profiles),
            config,
        };

        Self {
            registry: SessionRegistry::new(&context),
            presence: PresenceManager::new(&context),
            playback: PlaybackReplicator::new(&context),
            sweeper: CleanupSweeper::new(&context),
            context,
        }
    }

    /// The underlying store, shared with every component.
    pub fn store(&self) -> Arc<S> {
        self.context.store.clone()
    }

    /// Creates a session hosted by `host_user_id`. The host is not counted
    /// as a participant; their authority comes from hosting, and they join
    /// like anyone else if they want to appear in the roster.
    pub async fn create_session(
        &self,
        host_user_id: &str,
        name: &str,
    ) -> JamResult<SessionSnapshot> {
        let session = self.registry.create(host_user_id, name.trim()).await?;

        Ok(SessionSnapshot {
            session,
            server_time: Utc::now(),
        })
    }

    /// Combined read of a session and its active participants.
    pub async fn session_with_participants(
        &self,
        reference: SessionRef,
    ) -> JamResult<SessionView> {
        let session = match reference {
            SessionRef::Id(id) => self.registry.session_by_id(id).await?,
            SessionRef::Code(raw) => {
                self.registry.session_by_code(&normalize_code(&raw)).await?
            }
        };

        let participants = self.presence.list_active(session.id).await?;

        Ok(SessionView {
            session,
            participants,
            server_time: Utc::now(),
        })
    }

    /// Joins the session carrying `code`.
    pub async fn join_by_code(&self, code: &str, user_id: &str) -> JamResult<SessionSnapshot> {
        let session = self.registry.latest_by_code(&normalize_code(code)).await?;

        self.presence.join(session.id, user_id).await
    }

    /// Host-only partial update of the shared playback state.
    pub async fn update_state(
        &self,
        session_id: PrimaryKey,
        requester_id: &str,
        patch: PlaybackPatch,
    ) -> JamResult<SessionData> {
        self.playback
            .update_state(session_id, requester_id, patch)
            .await
    }

    pub async fn heartbeat(
        &self,
        session_id: PrimaryKey,
        user_id: &str,
    ) -> JamResult<ParticipantData> {
        self.presence.heartbeat(session_id, user_id).await
    }

    pub async fn leave(&self, session_id: PrimaryKey, user_id: &str) -> JamResult<()> {
        self.presence.leave(session_id, user_id).await
    }

    /// Host-only, terminal. Ending twice is a no-op.
    pub async fn end_session(&self, session_id: PrimaryKey, requester_id: &str) -> JamResult<()> {
        self.registry.end(session_id, requester_id).await
    }

    /// Entry point for the external cleanup scheduler.
    pub async fn sweep(&self) -> JamResult<SweepReport> {
        self.sweeper.sweep().await
    }
}
