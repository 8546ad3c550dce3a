//! Test utilities & fixtures shared by the integration tests.
#![allow(dead_code)] // each test binary uses a different subset

use std::path::{Path, PathBuf};
use std::sync::Arc;

use questline::clock::ManualClock;
use questline::config::{Config, QuestOptions, StorageBackend};
use questline::engine::QuestEngine;
use questline::permission::PermissionTable;
use questline::tasktype::{IslandLevelTaskType, StatGainTaskType, StatTable};
use tempfile::TempDir;
use uuid::Uuid;

/// 2023-11-14T22:13:20Z
pub const T0: i64 = 1_700_000_000_000;

/// Path of the static quest definitions fixture.
pub fn quests_fixture() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join("quests.json")
}

pub fn options() -> QuestOptions {
    QuestOptions {
        quest_start_limit: 3,
        ..QuestOptions::default()
    }
}

/// A running engine plus the collaborators tests poke at.
pub struct TestWorld {
    pub engine: QuestEngine,
    pub clock: Arc<ManualClock>,
    pub stats: Arc<StatTable>,
    pub permissions: Arc<PermissionTable>,
    pub dir: TempDir,
}

impl TestWorld {
    /// Join the player and mark them reachable for permission checks.
    pub fn join(&self, player: Uuid) {
        self.permissions.set_online(player);
        self.engine.join(player);
    }
}

pub fn open_engine(
    dir: &Path,
    backend: StorageBackend,
    options: QuestOptions,
    clock: Arc<ManualClock>,
    stats: Arc<StatTable>,
    permissions: Arc<PermissionTable>,
) -> QuestEngine {
    let mut config = Config::default();
    config.storage.backend = backend;
    config.storage.data_dir = dir.to_string_lossy().into_owned();
    config.options = options;

    let engine = QuestEngine::from_config(&config)
        .expect("open persistence")
        .with_task_type(Arc::new(IslandLevelTaskType::new()))
        .with_task_type(Arc::new(StatGainTaskType::new(stats)))
        .with_clock(clock)
        .with_permissions(permissions)
        .build();
    engine
        .load_quests_from_file(quests_fixture())
        .expect("load fixture quests");
    engine
}

pub fn world(backend: StorageBackend, options: QuestOptions) -> TestWorld {
    let dir = TempDir::new().expect("tempdir");
    let clock = Arc::new(ManualClock::new(T0));
    let stats = Arc::new(StatTable::new());
    let permissions = Arc::new(PermissionTable::new());
    let engine = open_engine(
        dir.path(),
        backend,
        options,
        clock.clone(),
        stats.clone(),
        permissions.clone(),
    );
    TestWorld {
        engine,
        clock,
        stats,
        permissions,
        dir,
    }
}
