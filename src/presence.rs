use chrono::Utc;
use log::info;
use serde::Serialize;

use crate::db::{
    NewParticipant, ParticipantData, PrimaryKey, SessionData, SessionStore, StoreError,
};
use crate::errors::{JamError, JamResult};
use crate::profiles::{ProfileProvider, UserProfile};
use crate::{JamContext, SessionSnapshot};

/// A participant row paired with the public profile of its user.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveParticipant {
    pub participant: ParticipantData,
    pub profile: UserProfile,
}

/// Tracks who is currently in a session: joins, leaves, and heartbeats.
pub struct PresenceManager<S, P> {
    context: JamContext<S, P>,
}

impl<S, P> PresenceManager<S, P>
where
    S: SessionStore,
    P: ProfileProvider,
{
    pub fn new(context: &JamContext<S, P>) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Adds a user to a session, or refreshes their membership if they are
    /// already in it. Returns the current session snapshot with the server
    /// clock, for client drift correction.
    pub async fn join(&self, session_id: PrimaryKey, user_id: &str) -> JamResult<SessionSnapshot> {
        let session = self.context.store.session_by_id(session_id).await?;

        if !session.is_active {
            return Err(JamError::Ended);
        }

        let now = Utc::now();

        let existing = match self
            .context
            .store
            .participant_by_pair(session_id, user_id)
            .await
        {
            Ok(participant) => Some(participant),
            Err(StoreError::NotFound { .. }) => None,
            Err(e) => return Err(e.into()),
        };

        match existing {
            // Rejoining while already active refreshes liveness and succeeds
            // regardless of occupancy
            Some(participant) if participant.is_active => {
                self.context
                    .store
                    .touch_participant(session_id, user_id, now)
                    .await?;
            }
            Some(participant) => {
                self.ensure_capacity(&session).await?;

                self.context
                    .store
                    .reactivate_participant(participant.id, now)
                    .await?;

                info!("User {} rejoined session \"{}\"", user_id, session.name);
            }
            None => {
                self.ensure_capacity(&session).await?;

                self.context
                    .store
                    .create_participant(
                        NewParticipant {
                            session_id,
                            user_id: user_id.to_string(),
                        },
                        now,
                    )
                    .await?;

                info!("User {} joined session \"{}\"", user_id, session.name);
            }
        }

        Ok(SessionSnapshot {
            session,
            server_time: now,
        })
    }

    /// Records a liveness signal from an active participant.
    pub async fn heartbeat(
        &self,
        session_id: PrimaryKey,
        user_id: &str,
    ) -> JamResult<ParticipantData> {
        let session = self.context.store.session_by_id(session_id).await?;

        // A heartbeat against an ended session reports the membership gone;
        // only joins distinguish the ended state
        if !session.is_active {
            return Err(JamError::NotFound {
                resource: "participant",
                identifier: "session:user",
            });
        }

        Ok(self
            .context
            .store
            .touch_participant(session_id, user_id, Utc::now())
            .await?)
    }

    /// Removes a user from a session. Succeeds even if they already left.
    /// Leaving never ends the session, host or not.
    pub async fn leave(&self, session_id: PrimaryKey, user_id: &str) -> JamResult<()> {
        match self
            .context
            .store
            .deactivate_participant(session_id, user_id, Utc::now())
            .await
        {
            Ok(participant) => {
                info!(
                    "User {} left session {}",
                    user_id, participant.session_id
                );

                Ok(())
            }
            Err(StoreError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// All active participants of a session, with their public profiles.
    /// Users the profile collaborator can't resolve get a placeholder.
    pub async fn list_active(&self, session_id: PrimaryKey) -> JamResult<Vec<ActiveParticipant>> {
        let participants = self.context.store.active_participants(session_id).await?;

        let user_ids: Vec<_> = participants.iter().map(|p| p.user_id.clone()).collect();
        let profiles = self.context.profiles.profiles_by_ids(&user_ids).await?;

        Ok(participants
            .into_iter()
            .map(|participant| {
                let profile = profiles
                    .iter()
                    .find(|profile| profile.user_id == participant.user_id)
                    .cloned()
                    .unwrap_or_else(|| UserProfile::placeholder(&participant.user_id));

                ActiveParticipant {
                    participant,
                    profile,
                }
            })
            .collect())
    }

    /// Occupancy check before a membership write. Two concurrent joins may
    /// both observe an under-capacity count, so occupancy can briefly
    /// overshoot the cap rather than serializing joins behind a lock.
    async fn ensure_capacity(&self, session: &SessionData) -> JamResult<()> {
        let count = self
            .context
            .store
            .count_active_participants(session.id)
            .await?;

        if count >= session.max_participants {
            return Err(JamError::Full);
        }

        Ok(())
    }
}
