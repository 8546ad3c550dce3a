//! Process-wide entry point: owns the catalog, task types and online players.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use questline::config::Config;
//! use questline::engine::QuestEngine;
//! use questline::tasktype::{GameEvent, IslandLevelTaskType};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::load("questline.toml").await?;
//! let engine = QuestEngine::from_config(&config)?
//!     .with_task_type(Arc::new(IslandLevelTaskType::new()))
//!     .build();
//! engine.load_quests_from_file("quests.json")?;
//!
//! let player = uuid::Uuid::new_v4();
//! engine.join(player);
//! engine.start_quest(player, "island_1")?;
//! engine.handle_event(&GameEvent::IslandWorthCalculated { player, level: 12.0 });
//! engine.leave(player)?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::sync::Arc;

use log::{debug, info};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::config::{Config, QuestOptions};
use crate::errors::QuestsError;
use crate::permission::{AllowAll, PermissionOracle};
use crate::player::{PlayerManager, QuestPlayer};
use crate::progress::{CancelOutcome, Notifier, QuestContext, QuestProgressFile, QuestStartResult};
use crate::quest::loader::validate_definitions;
use crate::quest::{LoadReport, Quest, QuestCatalog, QuestDefinitions, StaticCatalog};
use crate::storage::ProgressPersistence;
use crate::tasktype::{DispatchOutcome, GameEvent, TaskType, TaskTypeManager};

pub struct QuestEngineBuilder {
    persistence: Arc<dyn ProgressPersistence>,
    options: QuestOptions,
    task_types: TaskTypeManager,
    permissions: Arc<dyn PermissionOracle>,
    clock: Arc<dyn Clock>,
    notifier: Notifier,
}

impl QuestEngineBuilder {
    pub fn with_options(mut self, options: QuestOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_task_type(mut self, task_type: Arc<dyn TaskType>) -> Self {
        self.task_types.register_task_type(task_type);
        self
    }

    pub fn with_permissions(mut self, permissions: Arc<dyn PermissionOracle>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn build(self) -> QuestEngine {
        let catalog = Arc::new(StaticCatalog::new());
        let task_types = Arc::new(self.task_types);
        let ctx = Arc::new(
            QuestContext::new(catalog.clone(), task_types.clone())
                .with_options(self.options)
                .with_permissions(self.permissions)
                .with_clock(self.clock)
                .with_notifier(self.notifier),
        );
        info!(
            "quest engine ready: task types {:?}, storage {}",
            task_types.type_ids(),
            self.persistence.name()
        );
        QuestEngine {
            players: PlayerManager::new(ctx.clone(), self.persistence),
            catalog,
            task_types,
            ctx,
        }
    }
}

pub struct QuestEngine {
    catalog: Arc<StaticCatalog>,
    task_types: Arc<TaskTypeManager>,
    players: PlayerManager,
    ctx: Arc<QuestContext>,
}

impl QuestEngine {
    pub fn builder(persistence: Arc<dyn ProgressPersistence>) -> QuestEngineBuilder {
        QuestEngineBuilder {
            persistence,
            options: QuestOptions::default(),
            task_types: TaskTypeManager::new(),
            permissions: Arc::new(AllowAll),
            clock: Arc::new(SystemClock),
            notifier: Notifier::disabled(),
        }
    }

    /// Builder with the configured options and persistence backend.
    pub fn from_config(config: &Config) -> anyhow::Result<QuestEngineBuilder> {
        let persistence = config.open_persistence()?;
        Ok(Self::builder(persistence).with_options(config.options.clone()))
    }

    pub fn catalog(&self) -> &Arc<StaticCatalog> {
        &self.catalog
    }

    pub fn task_types(&self) -> &Arc<TaskTypeManager> {
        &self.task_types
    }

    pub fn players(&self) -> &PlayerManager {
        &self.players
    }

    pub fn context(&self) -> &Arc<QuestContext> {
        &self.ctx
    }

    pub fn quest(&self, quest_id: &str) -> Option<Arc<Quest>> {
        self.catalog.quest_by_id(quest_id)
    }

    /// Replace the quest definitions.
    ///
    /// Cleaning is suspended while the catalog and registrations are swapped;
    /// online players are cleaned once the new definitions are live.
    pub fn reload_quests(&self, definitions: QuestDefinitions) -> LoadReport {
        self.catalog.begin_reload();
        self.task_types.open_registrations();

        let (quests, categories, report) = validate_definitions(definitions, &self.task_types);
        self.catalog.replace(quests, categories);
        for quest in self.catalog.quests() {
            self.task_types.register_quest(quest);
        }

        self.task_types.close_registrations();
        self.catalog.finish_reload();
        let removed = self.players.clean_all();
        debug!("post-reload clean removed {} quest records", removed);
        report
    }

    pub fn load_quests_from_file<P: AsRef<Path>>(&self, path: P) -> Result<LoadReport, QuestsError> {
        let definitions = QuestDefinitions::load_from_json(path)?;
        Ok(self.reload_quests(definitions))
    }

    pub fn join(&self, player: Uuid) -> Arc<QuestPlayer> {
        self.players.join(player)
    }

    pub fn leave(&self, player: Uuid) -> Result<bool, QuestsError> {
        self.players.leave(player)
    }

    /// Route a gameplay event to its player. Events for offline players are dropped.
    pub fn handle_event(&self, event: &GameEvent) -> DispatchOutcome {
        let Some(player) = self.players.get(event.player()) else {
            return DispatchOutcome::default();
        };
        // the player may have left between the lookup and the lock
        let Some(mut file) = player.lock_online() else {
            debug!("dropping event for {}: player left", event.player());
            return DispatchOutcome::default();
        };
        self.task_types.dispatch(event, &mut file)
    }

    /// Run `f` on an online player's file under its lock.
    fn with_online<R>(
        &self,
        player_id: Uuid,
        f: impl FnOnce(&mut QuestProgressFile) -> R,
    ) -> Result<R, QuestsError> {
        let offline = || QuestsError::NotFound(format!("player {}", player_id));
        let player = self.players.get(player_id).ok_or_else(offline)?;
        let mut file = player.lock_online().ok_or_else(offline)?;
        Ok(f(&mut file))
    }

    fn require_quest(&self, quest_id: &str) -> Result<Arc<Quest>, QuestsError> {
        self.quest(quest_id)
            .ok_or_else(|| QuestsError::NotFound(format!("quest {}", quest_id)))
    }

    pub fn start_quest(&self, player: Uuid, quest_id: &str) -> Result<QuestStartResult, QuestsError> {
        let quest = self.require_quest(quest_id)?;
        self.with_online(player, |file| file.start(&quest))
    }

    pub fn cancel_quest(&self, player: Uuid, quest_id: &str) -> Result<CancelOutcome, QuestsError> {
        let quest = self.require_quest(quest_id)?;
        self.with_online(player, |file| file.cancel(&quest))
    }

    pub fn track_quest(&self, player: Uuid, quest_id: Option<&str>) -> Result<bool, QuestsError> {
        let quest = quest_id.map(|id| self.require_quest(id)).transpose()?;
        self.with_online(player, |file| file.track(quest.as_deref()))
    }

    /// Save every online player synchronously.
    pub fn shutdown(&self) -> Result<usize, QuestsError> {
        let saved = self.players.save_all()?;
        info!("quest engine shut down, saved {} players", saved);
        Ok(saved)
    }
}
