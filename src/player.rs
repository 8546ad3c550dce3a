//! Registry of online players and their progress files.
//!
//! Players are loaded on [`PlayerManager::join`] and flushed and evicted on
//! [`PlayerManager::leave`]. Each player's [`QuestProgressFile`] sits behind
//! its own mutex, so events for different players never contend. A player
//! is evicted only after its final save succeeded; a handle taken before the
//! eviction sees [`QuestPlayer::lock_online`] return `None`.
//!
//! Lock order: a player's file lock before the registry lock.
//!
//! Saves copy the file into a [`PlayerSnapshot`] under the player lock and
//! write it without holding that lock. Every snapshot carries a generation
//! number; a snapshot older than the last one written is discarded, so an
//! async save that finishes late never overwrites newer progress.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use log::{debug, error, info, warn};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::errors::QuestsError;
use crate::progress::{QuestContext, QuestProgressFile};
use crate::storage::{PlayerSnapshot, ProgressPersistence};

/// Where a save runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    /// On the calling thread; use at shutdown and on leave.
    Sync,
    /// On tokio's blocking pool; falls back to `Sync` outside a runtime.
    Async,
}

/// Handle to a save that may still be running.
pub enum SaveTicket {
    Done(Result<(), QuestsError>),
    Pending(JoinHandle<Result<(), QuestsError>>),
}

impl SaveTicket {
    pub async fn wait(self) -> Result<(), QuestsError> {
        match self {
            SaveTicket::Done(result) => result,
            SaveTicket::Pending(handle) => handle
                .await
                .map_err(|e| QuestsError::Internal(format!("save task failed: {}", e)))?,
        }
    }
}

/// One online player.
pub struct QuestPlayer {
    player_id: Uuid,
    file: Mutex<QuestProgressFile>,
    next_generation: AtomicU64,
    saved_generation: Mutex<u64>,
    evicted: AtomicBool,
}

impl QuestPlayer {
    fn new(file: QuestProgressFile) -> Self {
        Self {
            player_id: file.player_id(),
            file: Mutex::new(file),
            next_generation: AtomicU64::new(0),
            saved_generation: Mutex::new(0),
            evicted: AtomicBool::new(false),
        }
    }

    pub fn player_id(&self) -> Uuid {
        self.player_id
    }

    /// Lock the progress file. Hold the guard for the whole read-modify-write.
    pub fn lock(&self) -> MutexGuard<'_, QuestProgressFile> {
        self.file.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Lock the progress file unless the player has left.
    pub fn lock_online(&self) -> Option<MutexGuard<'_, QuestProgressFile>> {
        let file = self.lock();
        if self.is_evicted() {
            return None;
        }
        Some(file)
    }

    pub fn is_evicted(&self) -> bool {
        self.evicted.load(Ordering::SeqCst)
    }

    pub fn with_file<R>(&self, f: impl FnOnce(&mut QuestProgressFile) -> R) -> R {
        let mut file = self.lock();
        f(&mut file)
    }

    fn take_snapshot(&self) -> (u64, PlayerSnapshot) {
        let file = self.lock();
        self.snapshot_locked(&file)
    }

    /// Snapshot with the next generation number. The caller holds the file lock.
    fn snapshot_locked(&self, file: &QuestProgressFile) -> (u64, PlayerSnapshot) {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        (generation, file.snapshot())
    }

    fn write_snapshot(
        &self,
        persistence: &dyn ProgressPersistence,
        generation: u64,
        snapshot: PlayerSnapshot,
    ) -> Result<(), QuestsError> {
        let mut saved = self.saved_generation.lock().unwrap_or_else(|e| e.into_inner());
        if *saved >= generation {
            debug!(
                "skipping stale snapshot {} for {} (already wrote {})",
                generation, self.player_id, *saved
            );
            return Ok(());
        }
        match persistence.save_snapshot(&snapshot) {
            Ok(()) => {
                *saved = generation;
                debug!(
                    "saved {} via {} (generation {})",
                    self.player_id,
                    persistence.name(),
                    generation
                );
                Ok(())
            }
            Err(e) => {
                error!("failed to save player {}: {}", self.player_id, e);
                Err(e)
            }
        }
    }
}

pub struct PlayerManager {
    players: RwLock<HashMap<Uuid, Arc<QuestPlayer>>>,
    persistence: Arc<dyn ProgressPersistence>,
    ctx: Arc<QuestContext>,
}

impl PlayerManager {
    pub fn new(ctx: Arc<QuestContext>, persistence: Arc<dyn ProgressPersistence>) -> Self {
        Self {
            players: RwLock::new(HashMap::new()),
            persistence,
            ctx,
        }
    }

    pub fn persistence(&self) -> &Arc<dyn ProgressPersistence> {
        &self.persistence
    }

    fn load_file(&self, player_id: Uuid) -> QuestProgressFile {
        match self.persistence.load_snapshot(player_id) {
            Ok(Some(snapshot)) => QuestProgressFile::from_snapshot(snapshot, self.ctx.clone()),
            Ok(None) => QuestProgressFile::new(player_id, self.ctx.clone()),
            Err(e) => {
                warn!(
                    "could not load progress for {} from {}, starting empty: {}",
                    player_id,
                    self.persistence.name(),
                    e
                );
                QuestProgressFile::new(player_id, self.ctx.clone())
            }
        }
    }

    /// Load `player_id` and make it online. Joining twice returns the loaded player.
    pub fn join(&self, player_id: Uuid) -> Arc<QuestPlayer> {
        if let Some(existing) = self.get(player_id) {
            // waits out a leave in progress; an evicted player is reloaded
            if existing.lock_online().is_some() {
                return existing;
            }
        }
        let mut file = self.load_file(player_id);
        file.clean();
        let player = Arc::new(QuestPlayer::new(file));

        let mut players = self.players.write().unwrap_or_else(|e| e.into_inner());
        let entry = players.entry(player_id).or_insert_with(|| player.clone());
        if Arc::ptr_eq(entry, &player) {
            info!("player {} joined", player_id);
        }
        entry.clone()
    }

    pub fn get(&self, player_id: Uuid) -> Option<Arc<QuestPlayer>> {
        self.players
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&player_id)
            .cloned()
    }

    pub fn online_players(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self
            .players
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .copied()
            .collect();
        ids.sort();
        ids
    }

    /// Save the player synchronously, then evict it. Returns false when not online.
    ///
    /// The file lock is held from the snapshot through the eviction, so no
    /// event lands between them. When the save fails the player stays online
    /// with its progress intact.
    pub fn leave(&self, player_id: Uuid) -> Result<bool, QuestsError> {
        let Some(player) = self.get(player_id) else {
            return Ok(false);
        };
        let Some(file) = player.lock_online() else {
            return Ok(false);
        };
        let (generation, snapshot) = player.snapshot_locked(&file);
        if let Err(e) = player.write_snapshot(self.persistence.as_ref(), generation, snapshot) {
            warn!("player {} stays online, final save failed: {}", player_id, e);
            return Err(e);
        }
        player.evicted.store(true, Ordering::SeqCst);
        {
            let mut players = self.players.write().unwrap_or_else(|e| e.into_inner());
            if players
                .get(&player_id)
                .map_or(false, |current| Arc::ptr_eq(current, &player))
            {
                players.remove(&player_id);
            }
        }
        drop(file);
        info!("player {} left", player_id);
        Ok(true)
    }

    fn save_player(&self, player: &QuestPlayer) -> Result<(), QuestsError> {
        let (generation, snapshot) = player.take_snapshot();
        player.write_snapshot(self.persistence.as_ref(), generation, snapshot)
    }

    pub fn save(&self, player: &Arc<QuestPlayer>, mode: SaveMode) -> SaveTicket {
        let handle = match mode {
            SaveMode::Sync => None,
            SaveMode::Async => match tokio::runtime::Handle::try_current() {
                Ok(handle) => Some(handle),
                Err(_) => {
                    debug!("no tokio runtime, saving {} synchronously", player.player_id());
                    None
                }
            },
        };
        let Some(handle) = handle else {
            return SaveTicket::Done(self.save_player(player));
        };

        let (generation, snapshot) = player.take_snapshot();
        let player = player.clone();
        let persistence = self.persistence.clone();
        SaveTicket::Pending(handle.spawn_blocking(move || {
            player.write_snapshot(persistence.as_ref(), generation, snapshot)
        }))
    }

    /// Save every online player synchronously. All players are attempted;
    /// the last failure is returned.
    pub fn save_all(&self) -> Result<usize, QuestsError> {
        let players = self.online_handles();
        let mut saved = 0;
        let mut last_error = None;
        for player in players {
            match self.save_player(&player) {
                Ok(()) => saved += 1,
                Err(e) => last_error = Some(e),
            }
        }
        match last_error {
            Some(e) => Err(e),
            None => Ok(saved),
        }
    }

    /// Clean every online player's file. Returns the number of quest records removed.
    pub fn clean_all(&self) -> usize {
        self.online_handles()
            .iter()
            .filter_map(|p| p.lock().clean())
            .map(|report| report.removed_quests.len())
            .sum()
    }

    /// Drop every online player's progress records.
    pub fn clear_all(&self) {
        for player in self.online_handles() {
            player.lock().clear();
        }
    }

    fn online_handles(&self) -> Vec<Arc<QuestPlayer>> {
        self.players
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }
}
