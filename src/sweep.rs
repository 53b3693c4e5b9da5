use chrono::Utc;
use log::{info, warn};
use serde::Serialize;

use crate::db::{SessionStore, StoreError};
use crate::errors::JamResult;
use crate::profiles::ProfileProvider;
use crate::JamContext;

/// Outcome of one cleanup pass.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct SweepReport {
    /// Participants retired for missing heartbeats
    pub retired: usize,
    /// Abandoned sessions ended
    pub ended: usize,
    /// Rows that failed to update and were skipped
    pub skipped: usize,
}

/// Retires participants that stopped heartbeating and ends sessions
/// everyone abandoned. Holds no timer of its own; an external scheduler
/// invokes [CleanupSweeper::sweep] at whatever cadence the deployment
/// chooses.
pub struct CleanupSweeper<S, P> {
    context: JamContext<S, P>,
}

impl<S, P> CleanupSweeper<S, P>
where
    S: SessionStore,
    P: ProfileProvider,
{
    pub fn new(context: &JamContext<S, P>) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Runs one cleanup pass. Safe to re-run at any cadence; a pass that
    /// finds nothing stale changes nothing. A row that fails to update is
    /// logged and skipped so the rest of the batch still goes through.
    pub async fn sweep(&self) -> JamResult<SweepReport> {
        let now = Utc::now();
        let mut report = SweepReport::default();

        let stale = self
            .context
            .store
            .stale_participants(now - self.context.config.staleness_threshold())
            .await?;

        for participant in stale {
            let result = self
                .context
                .store
                .deactivate_participant(participant.session_id, &participant.user_id, now)
                .await;

            match result {
                Ok(_) => report.retired += 1,
                // Already retired by a concurrent sweep or an explicit leave
                Err(StoreError::NotFound { .. }) => {}
                Err(e) => {
                    warn!(
                        "Failed to retire participant {} of session {}: {}",
                        participant.user_id, participant.session_id, e
                    );

                    report.skipped += 1;
                }
            }
        }

        let orphaned = self
            .context
            .store
            .idle_sessions(now - self.context.config.orphan_threshold())
            .await?;

        for session in orphaned {
            match self.context.store.end_session(session.id, now).await {
                Ok(_) => {
                    info!("Session \"{}\" ended after being abandoned", session.name);
                    report.ended += 1;
                }
                Err(StoreError::NotFound { .. }) => {}
                Err(e) => {
                    warn!("Failed to end abandoned session {}: {}", session.id, e);
                    report.skipped += 1;
                }
            }
        }

        if report.retired > 0 || report.ended > 0 {
            info!(
                "Sweep retired {} participants and ended {} sessions",
                report.retired, report.ended
            );
        }

        Ok(report)
    }
}
