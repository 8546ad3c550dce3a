use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use log::debug;
use uuid::Uuid;

use crate::errors::TaskTypeError;
use crate::progress::{ProgressValue, QuestProgressFile};
use crate::quest::{ConfigProblem, Quest, Task, TaskConfig};

use super::util::{validate_exists, validate_int, validate_text};
use super::{GameEvent, GameEventKind, TaskType};

pub const STAT_GAIN: &str = "stat_gain";

/// Reads a player's current statistic values from the host.
pub trait StatSource: Send + Sync {
    /// `None` when the player or statistic is unknown.
    fn current_value(&self, player: Uuid, stat: &str) -> Option<i64>;
}

/// In-memory stat values, updated by the host as statistics change.
#[derive(Debug, Default)]
pub struct StatTable {
    values: RwLock<HashMap<(Uuid, String), i64>>,
}

impl StatTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, player: Uuid, stat: &str, value: i64) {
        self.values
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert((player, stat.to_string()), value);
    }
}

impl StatSource for StatTable {
    fn current_value(&self, player: Uuid, stat: &str) -> Option<i64> {
        self.values
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(player, stat.to_string()))
            .copied()
    }
}

/// Gain `amount` of a statistic after the quest starts.
///
/// Config: `stat` (required text), `amount` (required positive integer).
///
/// Progress is stored as `List[Integer(baseline), Integer(gained)]`, so the
/// baseline survives restarts and is dropped whenever the quest resets the
/// task. The start hook records the stat value at start; without one the
/// first event after a reset becomes the baseline.
pub struct StatGainTaskType {
    source: Arc<dyn StatSource>,
}

impl StatGainTaskType {
    pub fn new(source: Arc<dyn StatSource>) -> Self {
        Self { source }
    }

    /// `(baseline, gained)` stored in a task's progress value.
    pub fn read_progress(progress: Option<&ProgressValue>) -> Option<(i64, i64)> {
        match progress {
            Some(ProgressValue::List(values)) => match values.as_slice() {
                [baseline, gained] => Some((baseline.as_int()?, gained.as_int()?)),
                _ => None,
            },
            _ => None,
        }
    }

    fn progress_value(baseline: i64, gained: i64) -> ProgressValue {
        ProgressValue::List(vec![
            ProgressValue::Integer(baseline),
            ProgressValue::Integer(gained),
        ])
    }
}

impl TaskType for StatGainTaskType {
    fn type_id(&self) -> &str {
        STAT_GAIN
    }

    fn description(&self) -> &str {
        "Increase a player statistic by a set amount."
    }

    fn subscriptions(&self) -> &[GameEventKind] {
        &[GameEventKind::StatChanged]
    }

    fn validate_config(&self, root: &str, config: &TaskConfig) -> Vec<ConfigProblem> {
        let mut problems = Vec::new();
        if validate_exists(root, config, "stat", STAT_GAIN, &mut problems) {
            validate_text(root, config, "stat", &mut problems);
        }
        if validate_exists(root, config, "amount", STAT_GAIN, &mut problems) {
            validate_int(root, config, "amount", false, false, &mut problems);
        }
        problems
    }

    fn on_event(&self, event: &GameEvent, quests: &[Arc<Quest>], file: &mut QuestProgressFile) -> usize {
        let GameEvent::StatChanged { player, stat, value } = event else {
            return 0;
        };
        let mut changed = 0;

        for quest in quests {
            if !file.has_started(quest) {
                continue;
            }
            for task in quest.tasks_of_type(STAT_GAIN) {
                if task.config.get_str("stat") != Some(stat.as_str()) {
                    continue;
                }
                let current = file.task_progress(&quest.id, &task.id);
                if current.map_or(false, |t| t.is_completed()) {
                    continue;
                }
                let Some(amount) = task.config.get_int("amount") else {
                    continue;
                };
                let baseline = match Self::read_progress(current.and_then(|t| t.progress())) {
                    Some((baseline, _)) => baseline,
                    None => {
                        debug!("no {} baseline for {}, starting from {}", stat, player, value);
                        *value
                    }
                };
                let gained = value.saturating_sub(baseline);
                file.set_task_progress(quest, &task.id, Some(Self::progress_value(baseline, gained)));
                changed += 1;
                if gained >= amount {
                    file.complete_task(quest, &task.id);
                }
            }
        }
        changed
    }

    fn on_start(&self, quest: &Quest, task: &Task, file: &mut QuestProgressFile) -> Result<(), TaskTypeError> {
        let player = file.player_id();
        let stat = task
            .config
            .get_str("stat")
            .ok_or_else(|| TaskTypeError::BadConfig {
                task_type: STAT_GAIN.to_string(),
                task_id: task.id.clone(),
                detail: "missing 'stat'".to_string(),
            })?;
        let current = self
            .source
            .current_value(player, stat)
            .ok_or_else(|| TaskTypeError::Unavailable {
                task_type: STAT_GAIN.to_string(),
                detail: format!("no value of {} for {}", stat, player),
            })?;
        file.set_task_progress(quest, &task.id, Some(Self::progress_value(current, 0)));
        Ok(())
    }
}
