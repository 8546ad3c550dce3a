//! Task type contract and the registry that routes gameplay events to it.
//!
//! Every task type declares which [`GameEventKind`]s it listens to. During a
//! quest reload the [`TaskTypeManager`] accepts quest registrations; each
//! accepted quest is registered with every task type that appears in its task
//! list. An incoming [`GameEvent`] is then offered to the subscribed task
//! types together with the quests registered to them.

pub mod island_level;
pub mod stat_gain;
pub mod util;

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use log::{debug, error, info, warn};
use uuid::Uuid;

use crate::errors::TaskTypeError;
use crate::logging::escape_log;
use crate::progress::QuestProgressFile;
use crate::quest::{ConfigProblem, Quest, Task, TaskConfig};

pub use island_level::IslandLevelTaskType;
pub use stat_gain::{StatGainTaskType, StatSource, StatTable};

/// Discriminant of [`GameEvent`], used as the subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameEventKind {
    IslandWorthCalculated,
    StatChanged,
}

/// A gameplay event raised by the host, correlated to one player.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    /// The player's island worth was recalculated.
    IslandWorthCalculated { player: Uuid, level: f64 },
    /// A tracked statistic of the player changed to `value`.
    StatChanged { player: Uuid, stat: String, value: i64 },
}

impl GameEvent {
    pub fn kind(&self) -> GameEventKind {
        match self {
            GameEvent::IslandWorthCalculated { .. } => GameEventKind::IslandWorthCalculated,
            GameEvent::StatChanged { .. } => GameEventKind::StatChanged,
        }
    }

    pub fn player(&self) -> Uuid {
        match self {
            GameEvent::IslandWorthCalculated { player, .. } | GameEvent::StatChanged { player, .. } => {
                *player
            }
        }
    }
}

/// Capability interface of one kind of gameplay-driven task.
pub trait TaskType: Send + Sync {
    /// Stable identifier referenced by `type` in task definitions.
    fn type_id(&self) -> &str;

    fn description(&self) -> &str;

    fn subscriptions(&self) -> &[GameEventKind];

    /// Check a task's config. `root` is the task's location, e.g. `tasks.mine`.
    fn validate_config(&self, root: &str, config: &TaskConfig) -> Vec<ConfigProblem>;

    /// Apply `event` to every started quest in `quests` for the player owning
    /// `file`. Completed tasks must be left alone. Returns how many task
    /// progress entries changed.
    fn on_event(&self, event: &GameEvent, quests: &[Arc<Quest>], file: &mut QuestProgressFile) -> usize;

    /// Called for each of this type's tasks when the containing quest starts,
    /// after its task progress was reset. Not called for autostarted quests.
    fn on_start(
        &self,
        _quest: &Quest,
        _task: &Task,
        _file: &mut QuestProgressFile,
    ) -> Result<(), TaskTypeError> {
        Ok(())
    }
}

/// Registry of task types plus the per-type quest registrations.
pub struct TaskTypeManager {
    types: HashMap<String, Arc<dyn TaskType>>,
    subscribers: HashMap<GameEventKind, Vec<Arc<dyn TaskType>>>,
    registrations: RwLock<HashMap<String, Vec<Arc<Quest>>>>,
    accepting: AtomicBool,
}

impl Default for TaskTypeManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskTypeManager {
    pub fn new() -> Self {
        Self {
            types: HashMap::new(),
            subscribers: HashMap::new(),
            registrations: RwLock::new(HashMap::new()),
            accepting: AtomicBool::new(false),
        }
    }

    /// Add a task type. A second type with an already used id is refused.
    pub fn register_task_type(&mut self, task_type: Arc<dyn TaskType>) -> bool {
        let id = task_type.type_id().to_string();
        if self.types.contains_key(&id) {
            warn!("task type {} already registered, ignoring duplicate", escape_log(&id));
            return false;
        }
        for kind in task_type.subscriptions() {
            self.subscribers.entry(*kind).or_default().push(task_type.clone());
        }
        debug!("registered task type {}", id);
        self.types.insert(id, task_type);
        true
    }

    pub fn get(&self, type_id: &str) -> Option<Arc<dyn TaskType>> {
        self.types.get(type_id).cloned()
    }

    pub fn type_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.types.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Drop all quest registrations and start accepting new ones.
    pub fn open_registrations(&self) {
        self.registrations
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.accepting.store(true, Ordering::SeqCst);
    }

    pub fn close_registrations(&self) {
        self.accepting.store(false, Ordering::SeqCst);
        let registrations = self.registrations.read().unwrap_or_else(|e| e.into_inner());
        for (type_id, quests) in registrations.iter() {
            info!("task type {} has {} registered quests", type_id, quests.len());
        }
    }

    pub fn registrations_accepted(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Register `quest` with every task type its tasks use.
    ///
    /// Returns false when registrations are closed.
    pub fn register_quest(&self, quest: Arc<Quest>) -> bool {
        if !self.registrations_accepted() {
            warn!(
                "quest {} offered while registrations are closed",
                escape_log(&quest.id)
            );
            return false;
        }
        let type_ids: BTreeSet<&str> = quest.tasks.iter().map(|t| t.task_type.as_str()).collect();
        let mut registrations = self.registrations.write().unwrap_or_else(|e| e.into_inner());
        for type_id in type_ids {
            if !self.types.contains_key(type_id) {
                continue;
            }
            registrations
                .entry(type_id.to_string())
                .or_default()
                .push(quest.clone());
        }
        true
    }

    pub fn registered_quests(&self, type_id: &str) -> Vec<Arc<Quest>> {
        self.registrations
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(type_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Run the start hook of every task on `quest`. Failures are logged, never propagated.
    pub fn run_start_hooks(&self, quest: &Quest, file: &mut QuestProgressFile) {
        for task in &quest.tasks {
            let Some(task_type) = self.types.get(&task.task_type) else {
                warn!(
                    "quest {} task {}: task type {} is not registered",
                    escape_log(&quest.id),
                    escape_log(&task.id),
                    escape_log(&task.task_type)
                );
                continue;
            };
            if let Err(e) = task_type.on_start(quest, task, file) {
                error!(
                    "start hook failed for quest {} task {} (player {}): {}",
                    escape_log(&quest.id),
                    escape_log(&task.id),
                    file.player_id(),
                    e
                );
            }
        }
    }

    /// Offer `event` to every subscribed task type, then complete quests whose
    /// tasks are all done. The caller holds the player's lock.
    pub fn dispatch(&self, event: &GameEvent, file: &mut QuestProgressFile) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();
        let Some(handlers) = self.subscribers.get(&event.kind()) else {
            return outcome;
        };

        let mut touched: Vec<Arc<Quest>> = Vec::new();
        for handler in handlers {
            let quests = self.registered_quests(handler.type_id());
            if quests.is_empty() {
                continue;
            }
            outcome.tasks_updated += handler.on_event(event, &quests, file);
            for quest in quests {
                if !touched.iter().any(|q| q.id == quest.id) {
                    touched.push(quest);
                }
            }
        }

        for quest in touched {
            let finished = file
                .quest_progress(&quest.id)
                .map_or(false, |p| p.all_tasks_completed());
            if finished && file.has_started(&quest) {
                file.complete(&quest);
                outcome.quests_completed.push(quest.id.clone());
            }
        }
        outcome
    }
}

/// What a single [`TaskTypeManager::dispatch`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub tasks_updated: usize,
    pub quests_completed: Vec<String>,
}
