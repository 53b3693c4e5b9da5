use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use thiserror::Error;

use crate::db::UserId;

/// Public display fields of a user, owned by the external identity system.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserProfile {
    pub user_id: UserId,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

impl UserProfile {
    /// Stand-in profile for a user the identity system can't resolve.
    pub fn placeholder(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            display_name: "Unknown".to_string(),
            avatar_url: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("profile service unavailable: {0}")]
    Unavailable(String),
}

/// Represents a type that can resolve opaque user ids to public profiles.
#[async_trait]
pub trait ProfileProvider: Send + Sync + 'static {
    /// Returns the profiles it could resolve. Ids with no profile are simply
    /// absent from the result.
    async fn profiles_by_ids(&self, user_ids: &[UserId])
        -> Result<Vec<UserProfile>, ProfileError>;
}

/// An in-memory profile directory, used by tests and single-node
/// deployments.
#[derive(Default)]
pub struct MemoryProfiles {
    profiles: RwLock<HashMap<UserId, UserProfile>>,
}

impl MemoryProfiles {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn insert(&self, profile: UserProfile) {
        self.profiles.write().insert(profile.user_id.clone(), profile);
    }
}

#[async_trait]
impl ProfileProvider for MemoryProfiles {
    async fn profiles_by_ids(
        &self,
        user_ids: &[UserId],
    ) -> Result<Vec<UserProfile>, ProfileError> {
        let profiles = self.profiles.read();

        Ok(user_ids
            .iter()
            .filter_map(|id| profiles.get(id).cloned())
            .collect())
    }
}
