//! Player progress returned by the `/progress` endpoint.

use serde::{Deserialize, Serialize};

pub const DEFAULT_ATTITUDE: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    Common,
    Rare,
    Epic,
    Legendary,
}

/// One saved ability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreasuryEntry {
    pub ability_text: String,
    pub rarity: Rarity,
    /// RFC 3339 timestamp
    pub saved_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProgress {
    pub user_id: String,
    pub attitude: u32,
    pub total_generated: u64,
    pub combo_count: u32,
    pub daily_streak: u32,
    pub achievements: Vec<String>,
    pub treasury: Vec<TreasuryEntry>,
}

impl UserProgress {
    /// Snapshot for a user with no stored progress.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            attitude: DEFAULT_ATTITUDE,
            total_generated: 0,
            combo_count: 0,
            daily_streak: 0,
            achievements: Vec::new(),
            treasury: Vec::new(),
        }
    }
}

/// Loads progress for an authenticated user.
///
/// Called only after the bearer token has been verified; `user_id` is the
/// token's `sub`.
pub trait ProgressStore: Send + Sync {
    fn load_progress(&self, user_id: &str) -> anyhow::Result<UserProgress>;
}

/// Store without a backend: every user gets the default snapshot.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultProgressStore;

impl ProgressStore for DefaultProgressStore {
    fn load_progress(&self, user_id: &str) -> anyhow::Result<UserProgress> {
        Ok(UserProgress::new(user_id))
    }
}
