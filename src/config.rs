use chrono::Duration;

/// Tunables of the jam core.
#[derive(Debug, Clone)]
pub struct JamConfig {
    /// How many users may be active in one session at a time
    pub default_max_participants: u32,
    /// How many codes to try before a create reports a conflict
    pub max_code_attempts: u32,
    /// How long a participant may go without a heartbeat before a sweep
    /// retires them
    pub staleness_threshold_secs: i64,
    /// How long an empty session may go without a playback write before a
    /// sweep ends it
    pub orphan_threshold_secs: i64,
}

impl JamConfig {
    pub fn staleness_threshold(&self) -> Duration {
        Duration::seconds(self.staleness_threshold_secs)
    }

    pub fn orphan_threshold(&self) -> Duration {
        Duration::seconds(self.orphan_threshold_secs)
    }
}

impl Default for JamConfig {
    fn default() -> Self {
        Self {
            default_max_participants: 8,
            max_code_attempts: 5,
            // Clients are expected to heartbeat every 15-30 seconds
            staleness_threshold_secs: 90,
            orphan_threshold_secs: 60 * 60,
        }
    }
}
