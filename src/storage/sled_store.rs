use std::path::{Path, PathBuf};

use log::debug;
use sled::IVec;
use uuid::Uuid;

use super::{PlayerSnapshot, ProgressPersistence, SNAPSHOT_SCHEMA_VERSION};
use crate::errors::QuestsError;

const TREE_PROGRESS: &str = "quest_progress";
const PLAYER_PREFIX: &str = "players:";

/// Helper builder so tests can easily create throwaway stores with custom paths.
pub struct SledProgressStoreBuilder {
    path: PathBuf,
    flush_on_save: bool,
}

impl SledProgressStoreBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            flush_on_save: true,
        }
    }

    /// Skip the fsync after every save (sled still flushes periodically).
    pub fn without_flush(mut self) -> Self {
        self.flush_on_save = false;
        self
    }

    pub fn open(self) -> Result<SledProgressStore, QuestsError> {
        SledProgressStore::open_with_options(self.path, self.flush_on_save)
    }
}

/// Sled-backed persistence for player progress snapshots.
#[derive(Clone)]
pub struct SledProgressStore {
    _db: sled::Db,
    progress: sled::Tree,
    flush_on_save: bool,
}

impl SledProgressStore {
    /// Open (or create) the progress store rooted at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, QuestsError> {
        Self::open_with_options(path, true)
    }

    fn open_with_options<P: AsRef<Path>>(path: P, flush_on_save: bool) -> Result<Self, QuestsError> {
        let path_ref = path.as_ref();
        std::fs::create_dir_all(path_ref)?;
        let db = sled::open(path_ref)?;
        let progress = db.open_tree(TREE_PROGRESS)?;
        Ok(Self {
            _db: db,
            progress,
            flush_on_save,
        })
    }

    fn player_key(player: Uuid) -> Vec<u8> {
        format!("{}{}", PLAYER_PREFIX, player.hyphenated()).into_bytes()
    }

    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, QuestsError> {
        Ok(bincode::serialize(value)?)
    }

    fn deserialize<T: serde::de::DeserializeOwned>(bytes: IVec) -> Result<T, QuestsError> {
        Ok(bincode::deserialize::<T>(&bytes)?)
    }
}

impl ProgressPersistence for SledProgressStore {
    fn name(&self) -> &'static str {
        "sled"
    }

    fn load_snapshot(&self, player: Uuid) -> Result<Option<PlayerSnapshot>, QuestsError> {
        let key = Self::player_key(player);
        let Some(bytes) = self.progress.get(&key)? else {
            return Ok(None);
        };
        let snapshot: PlayerSnapshot = Self::deserialize(bytes)?;
        snapshot.check_schema()?;
        Ok(Some(snapshot))
    }

    fn save_snapshot(&self, snapshot: &PlayerSnapshot) -> Result<(), QuestsError> {
        let mut record = snapshot.clone();
        record.schema_version = SNAPSHOT_SCHEMA_VERSION;
        let key = Self::player_key(record.player_id);
        let bytes = Self::serialize(&record)?;
        self.progress.insert(key, bytes)?;
        if self.flush_on_save {
            self.progress.flush()?;
        }
        debug!(
            "sled: saved {} quest records for {}",
            record.quests.len(),
            record.player_id
        );
        Ok(())
    }

    fn list_players(&self) -> Result<Vec<Uuid>, QuestsError> {
        let mut ids = Vec::new();
        for entry in self.progress.scan_prefix(PLAYER_PREFIX.as_bytes()) {
            let (key, _) = entry?;
            let text = String::from_utf8_lossy(&key);
            if let Some(id) = text.strip_prefix(PLAYER_PREFIX) {
                if let Ok(uuid) = Uuid::parse_str(id) {
                    ids.push(uuid);
                }
            }
        }
        Ok(ids)
    }
}
