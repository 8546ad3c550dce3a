use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use log::{debug, warn};
use uuid::Uuid;

use super::{PlayerSnapshot, ProgressPersistence, SNAPSHOT_SCHEMA_VERSION};
use crate::errors::QuestsError;

const PLAYERDATA_DIR: &str = "playerdata";

/// One JSON document per player under `<data_dir>/playerdata/<uuid>.json`.
pub struct JsonProgressStore {
    dir: PathBuf,
}

impl JsonProgressStore {
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self, QuestsError> {
        let dir = data_dir.as_ref().join(PLAYERDATA_DIR);
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn player_path(&self, player: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", player.hyphenated()))
    }

    /// Write `content` to `path` under an exclusive lock: temp file, fsync, rename.
    fn write_file_locked(path: &Path, content: &[u8]) -> Result<(), QuestsError> {
        // The lock lives on a sidecar file so the rename never replaces the locked inode.
        let lock_path = path.with_extension("lock");
        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&lock_path)?;
        lock_file.lock_exclusive()?;

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let base = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("player.json");
        let mut counter = 0u32;
        let tmp_path = loop {
            let candidate = dir.join(format!(".{}.tmp-{}-{}", base, std::process::id(), counter));
            match OpenOptions::new().write(true).create_new(true).open(&candidate) {
                Ok(mut tmp) => {
                    if let Err(e) = tmp.write_all(content).and_then(|_| tmp.flush()) {
                        let _ = fs::remove_file(&candidate);
                        return Err(e.into());
                    }
                    let _ = tmp.sync_all();
                    break candidate;
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    counter = counter.saturating_add(1);
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        };

        if let Err(e) = fs::rename(&tmp_path, path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        if let Ok(dir_file) = File::open(dir) {
            let _ = dir_file.sync_all();
        }
        let _ = FileExt::unlock(&lock_file);
        Ok(())
    }
}

impl ProgressPersistence for JsonProgressStore {
    fn name(&self) -> &'static str {
        "json"
    }

    fn load_snapshot(&self, player: Uuid) -> Result<Option<PlayerSnapshot>, QuestsError> {
        let path = self.player_path(player);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let snapshot: PlayerSnapshot = serde_json::from_str(&contents)?;
        snapshot.check_schema()?;
        if snapshot.player_id != player {
            warn!(
                "json: {} holds progress for {}, ignoring",
                path.display(),
                snapshot.player_id
            );
            return Ok(None);
        }
        Ok(Some(snapshot))
    }

    fn save_snapshot(&self, snapshot: &PlayerSnapshot) -> Result<(), QuestsError> {
        let mut record = snapshot.clone();
        record.schema_version = SNAPSHOT_SCHEMA_VERSION;
        let bytes = serde_json::to_vec_pretty(&record)?;
        let path = self.player_path(record.player_id);
        Self::write_file_locked(&path, &bytes)?;
        debug!("json: saved {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    fn list_players(&self) -> Result<Vec<Uuid>, QuestsError> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(uuid) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| Uuid::parse_str(s).ok())
            {
                ids.push(uuid);
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::fixtures::sample_snapshot;
    use tempfile::TempDir;

    #[test]
    fn json_round_trip_keeps_unset_progress() {
        let dir = TempDir::new().expect("tempdir");
        let store = JsonProgressStore::open(dir.path()).expect("store");
        let player = Uuid::new_v4();
        let snapshot = sample_snapshot(player);
        store.save_snapshot(&snapshot).expect("save");

        let raw = fs::read_to_string(store.player_path(player)).unwrap();
        assert!(raw.contains("\"progress\": null"));

        let loaded = store.load_snapshot(player).expect("load").expect("present");
        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn overwrite_leaves_no_temp_files() {
        let dir = TempDir::new().expect("tempdir");
        let store = JsonProgressStore::open(dir.path()).expect("store");
        let player = Uuid::new_v4();
        let mut snapshot = sample_snapshot(player);
        store.save_snapshot(&snapshot).expect("first save");
        snapshot.quests.pop();
        store.save_snapshot(&snapshot).expect("second save");

        let loaded = store.load_snapshot(player).unwrap().unwrap();
        assert_eq!(loaded.quests.len(), 1);
        let leftovers: Vec<_> = fs::read_dir(dir.path().join(PLAYERDATA_DIR))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp-"))
            .collect();
        assert!(leftovers.is_empty());
        assert_eq!(store.list_players().unwrap(), vec![player]);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = TempDir::new().expect("tempdir");
        let store = JsonProgressStore::open(dir.path()).expect("store");
        let player = Uuid::new_v4();
        fs::write(store.player_path(player), "{ not json").unwrap();
        assert!(matches!(store.load_snapshot(player), Err(QuestsError::Json(_))));
    }
}
