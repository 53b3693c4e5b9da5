use log::debug;

use crate::db::{PlaybackPatch, PrimaryKey, SessionData, SessionStore};
use crate::errors::{JamError, JamResult};
use crate::profiles::ProfileProvider;
use crate::JamContext;

/// Applies host-authoritative updates to a session's shared playback state.
pub struct PlaybackReplicator<S, P> {
    context: JamContext<S, P>,
}

impl<S, P> PlaybackReplicator<S, P>
where
    S: SessionStore,
    P: ProfileProvider,
{
    pub fn new(context: &JamContext<S, P>) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Applies the present fields of `patch` to the session's playback
    /// state, leaving absent fields untouched. Later writes overwrite
    /// earlier ones; no ordering is enforced between competing devices of
    /// the same host.
    ///
    /// Host identity is checked before session liveness, so a non-host
    /// probing an ended session only learns it is not theirs.
    pub async fn update_state(
        &self,
        session_id: PrimaryKey,
        requester_id: &str,
        patch: PlaybackPatch,
    ) -> JamResult<SessionData> {
        let session = self.context.store.session_by_id(session_id).await?;

        if session.host_user_id != requester_id {
            return Err(JamError::Forbidden {
                action: "update playback state",
            });
        }

        if !session.is_active {
            return Err(JamError::Ended);
        }

        if let Some(position) = patch.current_position {
            if !position.is_finite() || position < 0.0 {
                return Err(JamError::Validation {
                    field: "current_position",
                    reason: "must be a non-negative number of seconds",
                });
            }
        }

        let session = self.context.store.update_playback(session_id, patch).await?;
        debug!("Playback state of session {} updated", session.id);

        Ok(session)
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::db::MemoryStore;
    use crate::profiles::MemoryProfiles;
    use crate::registry::SessionRegistry;
    use crate::JamConfig;

    struct Fixture {
        context: JamContext<MemoryStore, MemoryProfiles>,
        registry: SessionRegistry<MemoryStore, MemoryProfiles>,
        playback: PlaybackReplicator<MemoryStore, MemoryProfiles>,
    }

    fn fixture() -> Fixture {
        let context = JamContext {
            store: Arc::new(MemoryStore::new()),
            profiles: Arc::new(MemoryProfiles::new()),
            config: JamConfig::default(),
        };

        Fixture {
            registry: SessionRegistry::new(&context),
            playback: PlaybackReplicator::new(&context),
            context,
        }
    }

    #[tokio::test]
    async fn non_host_updates_are_forbidden_and_change_nothing() {
        let f = fixture();
        let session = f.registry.create("host", "Friday Mix").await.unwrap();

        let before = f.context.store.session_by_id(session.id).await.unwrap();

        let result = f
            .playback
            .update_state(
                session.id,
                "intruder",
                PlaybackPatch {
                    current_track_id: Some(Some("abc".to_string())),
                    current_position: Some(30.0),
                    is_playing: Some(true),
                    queue: Some(vec!["abc".to_string()]),
                },
            )
            .await;

        assert!(matches!(result, Err(JamError::Forbidden { .. })));

        let after = f.context.store.session_by_id(session.id).await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn partial_patches_leave_absent_fields_untouched() {
        let f = fixture();
        let session = f.registry.create("host", "Friday Mix").await.unwrap();

        let first = f
            .playback
            .update_state(
                session.id,
                "host",
                PlaybackPatch {
                    current_track_id: Some(Some("abc".to_string())),
                    is_playing: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let second = f
            .playback
            .update_state(
                session.id,
                "host",
                PlaybackPatch {
                    current_position: Some(42.5),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(second.current_track_id, Some("abc".to_string()));
        assert!(second.is_playing);
        assert_eq!(second.current_position, 42.5);
        assert!(second.updated_at > first.created_at);
    }

    #[tokio::test]
    async fn the_current_track_can_be_cleared() {
        let f = fixture();
        let session = f.registry.create("host", "Friday Mix").await.unwrap();

        f.playback
            .update_state(
                session.id,
                "host",
                PlaybackPatch {
                    current_track_id: Some(Some("abc".to_string())),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let cleared = f
            .playback
            .update_state(
                session.id,
                "host",
                PlaybackPatch {
                    current_track_id: Some(None),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(cleared.current_track_id, None);
    }

    #[tokio::test]
    async fn queue_order_and_duplicates_are_preserved() {
        let f = fixture();
        let session = f.registry.create("host", "Friday Mix").await.unwrap();

        let queue = vec!["a".to_string(), "b".to_string(), "a".to_string()];

        let updated = f
            .playback
            .update_state(
                session.id,
                "host",
                PlaybackPatch {
                    queue: Some(queue.clone()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.queue, queue);
    }

    #[tokio::test]
    async fn bad_positions_are_rejected() {
        let f = fixture();
        let session = f.registry.create("host", "Friday Mix").await.unwrap();

        for position in [-1.0, f64::NAN, f64::INFINITY] {
            let result = f
                .playback
                .update_state(
                    session.id,
                    "host",
                    PlaybackPatch {
                        current_position: Some(position),
                        ..Default::default()
                    },
                )
                .await;

            assert!(matches!(result, Err(JamError::Validation { .. })));
        }
    }

    #[tokio::test]
    async fn updates_to_missing_or_ended_sessions_fail() {
        let f = fixture();

        assert!(matches!(
            f.playback
                .update_state(42, "host", Default::default())
                .await,
            Err(JamError::NotFound { .. })
        ));

        let session = f.registry.create("host", "Friday Mix").await.unwrap();
        f.registry.end(session.id, "host").await.unwrap();

        assert!(matches!(
            f.playback
                .update_state(session.id, "host", Default::default())
                .await,
            Err(JamError::Ended)
        ));

        // Forbidden wins over ended for non-hosts
        assert!(matches!(
            f.playback
                .update_state(session.id, "intruder", Default::default())
                .await,
            Err(JamError::Forbidden { .. })
        ));
    }

    #[tokio::test]
    async fn later_writes_win() {
        let f = fixture();
        let session = f.registry.create("host", "Friday Mix").await.unwrap();

        for position in [10.0, 5.0, 99.0] {
            f.playback
                .update_state(
                    session.id,
                    "host",
                    PlaybackPatch {
                        current_position: Some(position),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
        }

        let session = f.context.store.session_by_id(session.id).await.unwrap();
        assert_eq!(session.current_position, 99.0);
    }
}
