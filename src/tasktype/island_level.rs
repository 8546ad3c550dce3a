use std::sync::Arc;

use log::debug;

use crate::progress::{ProgressValue, QuestProgressFile};
use crate::quest::{ConfigProblem, Quest, TaskConfig};

use super::util::{validate_exists, validate_int};
use super::{GameEvent, GameEventKind, TaskType};

pub const ISLAND_LEVEL: &str = "island_level";

/// Reach a minimum island level.
///
/// Config: `level` (required positive integer).
#[derive(Debug, Default)]
pub struct IslandLevelTaskType;

impl IslandLevelTaskType {
    pub fn new() -> Self {
        Self
    }
}

impl TaskType for IslandLevelTaskType {
    fn type_id(&self) -> &str {
        ISLAND_LEVEL
    }

    fn description(&self) -> &str {
        "Reach a certain island level."
    }

    fn subscriptions(&self) -> &[GameEventKind] {
        &[GameEventKind::IslandWorthCalculated]
    }

    fn validate_config(&self, root: &str, config: &TaskConfig) -> Vec<ConfigProblem> {
        let mut problems = Vec::new();
        if validate_exists(root, config, "level", ISLAND_LEVEL, &mut problems) {
            validate_int(root, config, "level", false, false, &mut problems);
        }
        problems
    }

    fn on_event(&self, event: &GameEvent, quests: &[Arc<Quest>], file: &mut QuestProgressFile) -> usize {
        let GameEvent::IslandWorthCalculated { player, level } = event else {
            return 0;
        };
        if !level.is_finite() {
            debug!("ignoring non-finite island level {} for {}", level, player);
            return 0;
        }
        // fractional worth counts as the level below it
        let reached = level.trunc() as i64;
        let mut changed = 0;

        for quest in quests {
            if !file.has_started(quest) {
                continue;
            }
            for task in quest.tasks_of_type(ISLAND_LEVEL) {
                let done = file
                    .task_progress(&quest.id, &task.id)
                    .map_or(false, |t| t.is_completed());
                if done {
                    continue;
                }
                let Some(needed) = task.config.get_int("level") else {
                    continue;
                };
                file.set_task_progress(quest, &task.id, Some(ProgressValue::Integer(reached)));
                changed += 1;
                if reached >= needed {
                    file.complete_task(quest, &task.id);
                }
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quest::catalog::QuestCatalog;
    use crate::progress::QuestContext;
    use crate::quest::{ConfigValue, StaticCatalog, Task};
    use crate::tasktype::TaskTypeManager;
    use uuid::Uuid;

    fn file_with(quests: Vec<Quest>) -> (Arc<StaticCatalog>, QuestProgressFile) {
        let catalog = Arc::new(StaticCatalog::with_quests(quests, Vec::new()));
        let ctx = QuestContext::new(catalog.clone(), Arc::new(TaskTypeManager::new()));
        (catalog, QuestProgressFile::new(Uuid::new_v4(), Arc::new(ctx)))
    }

    fn level_task(id: &str, level: i64) -> Task {
        Task::new(id, ISLAND_LEVEL).with_config("level", ConfigValue::Integer(level))
    }

    #[test]
    fn test_validate_requires_positive_level() {
        let task_type = IslandLevelTaskType::new();
        assert!(task_type
            .validate_config("tasks.t", &level_task("t", 3).config)
            .is_empty());
        let zero = task_type.validate_config("tasks.t", &level_task("t", 0).config);
        assert_eq!(zero.len(), 1);
        let missing = task_type.validate_config("tasks.t", &TaskConfig::new());
        assert_eq!(missing[0].location, "tasks.t.level");
    }

    #[test]
    fn test_progress_only_for_started_quests() {
        let (catalog, mut file) = file_with(vec![
            Quest::new("on", "on").with_task(level_task("t", 10)),
            Quest::new("off", "off").with_task(level_task("t", 10)),
        ]);
        let on = catalog.quest_by_id("on").unwrap();
        file.start(&on);
        let event = GameEvent::IslandWorthCalculated {
            player: file.player_id(),
            level: 7.9,
        };
        let changed = IslandLevelTaskType::new().on_event(&event, &catalog.quests(), &mut file);
        assert_eq!(changed, 1);
        assert_eq!(
            file.task_progress("on", "t").unwrap().progress(),
            Some(&ProgressValue::Integer(7))
        );
        assert!(file.quest_progress("off").is_none());
    }

    #[test]
    fn test_completed_task_never_regresses() {
        let (catalog, mut file) = file_with(vec![Quest::new("q", "q").with_task(level_task("t", 5))]);
        let q = catalog.quest_by_id("q").unwrap();
        file.start(&q);
        let player = file.player_id();
        let task_type = IslandLevelTaskType::new();
        let quests = vec![q];

        task_type.on_event(&GameEvent::IslandWorthCalculated { player, level: 6.0 }, &quests, &mut file);
        let changed =
            task_type.on_event(&GameEvent::IslandWorthCalculated { player, level: 1.0 }, &quests, &mut file);
        assert_eq!(changed, 0);
        let t = file.task_progress("q", "t").unwrap();
        assert!(t.is_completed());
        assert_eq!(t.progress(), Some(&ProgressValue::Integer(6)));
    }

    #[test]
    fn test_non_finite_level_is_ignored() {
        let (catalog, mut file) = file_with(vec![Quest::new("q", "q").with_task(level_task("t", 5))]);
        let q = catalog.quest_by_id("q").unwrap();
        file.start(&q);
        let player = file.player_id();
        let task_type = IslandLevelTaskType::new();
        let quests = vec![q];

        for level in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let event = GameEvent::IslandWorthCalculated { player, level };
            assert_eq!(task_type.on_event(&event, &quests, &mut file), 0);
        }
        let t = file.task_progress("q", "t").unwrap();
        assert!(t.progress().is_none());
        assert!(!t.is_completed());
    }

    #[test]
    fn test_quest_without_matching_tasks_is_noop() {
        let (catalog, mut file) = file_with(vec![
            Quest::new("q", "q").with_task(Task::new("other", "stat_gain")),
        ]);
        let q = catalog.quest_by_id("q").unwrap();
        file.start(&q);
        let event = GameEvent::IslandWorthCalculated {
            player: file.player_id(),
            level: 99.0,
        };
        assert_eq!(IslandLevelTaskType::new().on_event(&event, &[q], &mut file), 0);
    }
}
