//! # Storage Module - Progress Persistence Layer
//!
//! The progress engine hands a frozen [`PlayerSnapshot`] to a
//! [`ProgressPersistence`] backend and never iterates live state while a write
//! is in flight. Two backends ship with the crate:
//!
//! - [`SledProgressStore`] - embedded sled database, bincode-encoded records
//! - [`JsonProgressStore`] - one pretty-printed JSON file per player
//!
//! ```text
//! data/
//! ├── progress.sled/      ← sled backend
//! └── playerdata/         ← JSON backend
//!     └── <uuid>.json
//! ```
//!
//! Both backends replace a player's durable record in one step (single key
//! insert, or temp file + rename), so a failed save leaves the previous
//! record intact.

pub mod json_store;
pub mod sled_store;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::QuestsError;
use crate::progress::ProgressValue;

pub use json_store::JsonProgressStore;
pub use sled_store::{SledProgressStore, SledProgressStoreBuilder};

pub const SNAPSHOT_SCHEMA_VERSION: u8 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskSnapshot {
    pub task_id: String,
    pub completed: bool,
    /// `None` round-trips as absent, never as a sentinel
    pub progress: Option<ProgressValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestSnapshot {
    pub quest_id: String,
    pub started: bool,
    pub completed: bool,
    pub completed_before: bool,
    pub completion_date: i64,
    pub tasks: Vec<TaskSnapshot>,
}

/// Everything persisted for one player, ordered by quest id then task id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerSnapshot {
    pub schema_version: u8,
    pub player_id: Uuid,
    #[serde(default)]
    pub tracked_quest: Option<String>,
    pub quests: Vec<QuestSnapshot>,
}

impl PlayerSnapshot {
    pub fn empty(player_id: Uuid) -> Self {
        Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            player_id,
            tracked_quest: None,
            quests: Vec::new(),
        }
    }

    pub(crate) fn check_schema(&self) -> Result<(), QuestsError> {
        if self.schema_version != SNAPSHOT_SCHEMA_VERSION {
            return Err(QuestsError::SchemaMismatch {
                entity: "player snapshot",
                expected: SNAPSHOT_SCHEMA_VERSION,
                found: self.schema_version,
            });
        }
        Ok(())
    }
}

/// Durable storage for player progress snapshots.
pub trait ProgressPersistence: Send + Sync {
    /// Backend label used in log lines.
    fn name(&self) -> &'static str;

    /// `Ok(None)` when the player has never been saved.
    fn load_snapshot(&self, player: Uuid) -> Result<Option<PlayerSnapshot>, QuestsError>;

    fn save_snapshot(&self, snapshot: &PlayerSnapshot) -> Result<(), QuestsError>;

    fn list_players(&self) -> Result<Vec<Uuid>, QuestsError>;
}
