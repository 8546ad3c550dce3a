//! The per-player progress store and quest lifecycle state machine.
//!
//! A [`QuestProgressFile`] owns every [`QuestProgress`] record of one player.
//! Quest records are created lazily on first access; lifecycle operations
//! (`start`, `cancel`, `complete`, `track`) and the task progress setters are
//! the only ways to mutate them. Callers are expected to hold the player's
//! lock (see [`crate::player::QuestPlayer`]) around every mutation.
//!
//! ```text
//! UNTRACKED ──first access──▶ NOT_STARTED ──start──▶ STARTED ──complete──▶ COMPLETED
//!                                  ▲                    │                    │
//!                                  └──────cancel────────┘    repeatable and  │
//!                                                            cooldown over ──┘──▶ STARTED
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Duration;
use log::{debug, info};
use uuid::Uuid;

use super::{
    PlayerPreferences, ProgressValue, QuestContext, QuestNotification, QuestProgress,
    QuestStartResult, QuestsProgressFilter, TaskProgress,
};
use crate::errors::QuestsError;
use crate::logging::escape_log;
use crate::quest::Quest;
use crate::storage::{PlayerSnapshot, QuestSnapshot, TaskSnapshot, SNAPSHOT_SCHEMA_VERSION};

/// Result of [`QuestProgressFile::cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    NotStarted,
}

impl CancelOutcome {
    pub fn is_cancelled(self) -> bool {
        self == CancelOutcome::Cancelled
    }
}

/// What a [`QuestProgressFile::clean`] pass removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanReport {
    pub removed_quests: Vec<String>,
    pub removed_tasks: usize,
}

impl CleanReport {
    pub fn is_empty(&self) -> bool {
        self.removed_quests.is_empty() && self.removed_tasks == 0
    }
}

pub struct QuestProgressFile {
    player_id: Uuid,
    preferences: PlayerPreferences,
    quest_progress: BTreeMap<String, QuestProgress>,
    ctx: Arc<QuestContext>,
}

impl QuestProgressFile {
    pub fn new(player_id: Uuid, ctx: Arc<QuestContext>) -> Self {
        Self {
            player_id,
            preferences: PlayerPreferences::default(),
            quest_progress: BTreeMap::new(),
            ctx,
        }
    }

    pub fn player_id(&self) -> Uuid {
        self.player_id
    }

    pub fn preferences(&self) -> &PlayerPreferences {
        &self.preferences
    }

    pub fn tracked_quest(&self) -> Option<&str> {
        self.preferences.tracked_quest_id()
    }

    pub fn context(&self) -> &Arc<QuestContext> {
        &self.ctx
    }

    fn blank_progress(quest: &Quest) -> QuestProgress {
        let mut progress = QuestProgress::new(&quest.id);
        for task in &quest.tasks {
            progress.add_task_progress(TaskProgress::new(&task.id));
        }
        progress
    }

    /// Progress for `quest`, created blank (one entry per defined task) when absent.
    pub fn get_or_create_progress(&mut self, quest: &Quest) -> &mut QuestProgress {
        self.quest_progress
            .entry(quest.id.clone())
            .or_insert_with(|| Self::blank_progress(quest))
    }

    /// Like [`Self::get_or_create_progress`], resolving the quest through the catalog.
    pub fn get_or_create_progress_by_id(
        &mut self,
        quest_id: &str,
    ) -> Result<&mut QuestProgress, QuestsError> {
        if !self.quest_progress.contains_key(quest_id) {
            let quest = self
                .ctx
                .catalog
                .quest_by_id(quest_id)
                .ok_or_else(|| QuestsError::NotFound(format!("quest {}", quest_id)))?;
            self.quest_progress
                .insert(quest.id.clone(), Self::blank_progress(&quest));
        }
        self.quest_progress
            .get_mut(quest_id)
            .ok_or_else(|| QuestsError::NotFound(format!("quest {}", quest_id)))
    }

    pub fn quest_progress(&self, quest_id: &str) -> Option<&QuestProgress> {
        self.quest_progress.get(quest_id)
    }

    pub fn has_progress(&self, quest: &Quest) -> bool {
        self.quest_progress.contains_key(&quest.id)
    }

    pub fn all_progress(&self) -> impl Iterator<Item = &QuestProgress> {
        self.quest_progress.values()
    }

    /// Number of records with the persisted `started` flag set.
    pub fn started_count(&self) -> usize {
        self.quest_progress.values().filter(|p| p.is_started()).count()
    }

    fn permits(&self, permission: &str) -> bool {
        match self.ctx.permissions.has_permission(self.player_id, permission) {
            Some(granted) => granted,
            None => {
                debug!(
                    "player {} unreachable, denying {}",
                    self.player_id,
                    escape_log(permission)
                );
                false
            }
        }
    }

    /// Decide whether `quest` could be started right now. Never mutates.
    pub fn evaluate_start(&self, quest: &Quest) -> QuestStartResult {
        let options = &self.ctx.options;
        if self.started_count() >= options.quest_start_limit && !options.quest_autostart {
            return QuestStartResult::LimitReached;
        }
        let record = self.quest_progress.get(&quest.id);
        if !quest.repeatable && record.map_or(false, QuestProgress::is_completed_before) {
            return QuestStartResult::AlreadyCompleted;
        }
        if self.cooldown_remaining(quest) > Duration::zero() {
            return QuestStartResult::OnCooldown;
        }
        if !self.requirements_met(quest) {
            return QuestStartResult::RequirementsNotMet;
        }
        if record.map_or(false, QuestProgress::is_started) {
            return QuestStartResult::AlreadyStarted;
        }
        if quest.permission_required && !self.permits(&format!("quests.quest.{}", quest.id)) {
            return QuestStartResult::NoPermission;
        }
        if let Some(category_id) = &quest.category {
            if let Some(category) = self.ctx.catalog.category_by_id(category_id) {
                if category.permission_required
                    && !self.permits(&format!("quests.category.{}", category_id))
                {
                    return QuestStartResult::NoCategoryPermission;
                }
            }
        }
        QuestStartResult::Success
    }

    /// Start `quest` if eligible. The evaluation code is returned either way.
    pub fn start(&mut self, quest: &Quest) -> QuestStartResult {
        let result = self.evaluate_start(quest);
        if !result.is_success() {
            let cooldown_millis = if result == QuestStartResult::OnCooldown {
                self.cooldown_remaining(quest).num_milliseconds()
            } else {
                0
            };
            debug!(
                "player {} cannot start {}: {}",
                self.player_id,
                escape_log(&quest.id),
                result
            );
            self.ctx.notifier.emit(QuestNotification::StartRejected {
                player: self.player_id,
                quest_id: quest.id.clone(),
                result,
                cooldown_millis,
            });
            return result;
        }

        let progress = self.get_or_create_progress(quest);
        for task in &quest.tasks {
            progress.task_entry(&task.id);
        }
        progress.set_started(true);
        for task_progress in progress.task_progress_values_mut() {
            task_progress.set_completed(false);
            task_progress.set_progress(None);
        }
        progress.set_completed(false);

        let options = &self.ctx.options;
        if options.allow_quest_track && options.quest_autotrack {
            self.track(Some(quest));
        }

        info!("player {} started quest {}", self.player_id, escape_log(&quest.id));
        self.ctx.notifier.emit(QuestNotification::Started {
            player: self.player_id,
            quest_id: quest.id.clone(),
            start_text: quest.start_text.clone(),
        });
        let task_types = self.ctx.task_types.clone();
        task_types.run_start_hooks(quest, self);
        result
    }

    /// Stop a started quest, dropping task progress but keeping task completion flags.
    pub fn cancel(&mut self, quest: &Quest) -> CancelOutcome {
        let started = self
            .quest_progress
            .get(&quest.id)
            .map_or(false, QuestProgress::is_started);
        if !started {
            self.ctx.notifier.emit(QuestNotification::CancelRejected {
                player: self.player_id,
                quest_id: quest.id.clone(),
            });
            return CancelOutcome::NotStarted;
        }

        if let Some(progress) = self.quest_progress.get_mut(&quest.id) {
            progress.set_started(false);
            for task_progress in progress.task_progress_values_mut() {
                task_progress.set_progress(None);
            }
        }
        info!("player {} cancelled quest {}", self.player_id, escape_log(&quest.id));
        self.ctx.notifier.emit(QuestNotification::Cancelled {
            player: self.player_id,
            quest_id: quest.id.clone(),
        });
        CancelOutcome::Cancelled
    }

    /// Mark `quest` completed. The caller has already checked the tasks.
    pub fn complete(&mut self, quest: &Quest) {
        let now = self.ctx.clock.now_millis();
        let progress = self.get_or_create_progress(quest);
        progress.set_started(false);
        for task_progress in progress.task_progress_values_mut() {
            task_progress.set_completed(false);
            task_progress.set_progress(None);
        }
        progress.set_completed(true);
        progress.set_completion_date(now);

        let options = &self.ctx.options;
        let restartable_now = quest.repeatable && !quest.cooldown.enabled;
        if options.allow_quest_track && options.quest_autotrack && !restartable_now {
            self.track(None);
        }

        info!("player {} completed quest {}", self.player_id, escape_log(&quest.id));
        self.ctx.notifier.emit(QuestNotification::Completed {
            player: self.player_id,
            quest_id: quest.id.clone(),
            rewards: quest.rewards.clone(),
            reward_text: quest.reward_text.clone(),
        });
    }

    /// Track `quest`, or stop tracking with `None`. Returns whether tracking changed.
    ///
    /// A quest the player has not started is silently ignored.
    pub fn track(&mut self, quest: Option<&Quest>) -> bool {
        match quest {
            None => {
                let previous = self.preferences.set_tracked_quest_id(None);
                self.ctx.notifier.emit(QuestNotification::TrackStopped {
                    player: self.player_id,
                    quest_id: previous,
                });
                true
            }
            Some(quest) if self.has_started(quest) => {
                self.preferences.set_tracked_quest_id(Some(quest.id.clone()));
                self.ctx.notifier.emit(QuestNotification::TrackStarted {
                    player: self.player_id,
                    quest_id: quest.id.clone(),
                });
                true
            }
            Some(_) => false,
        }
    }

    /// Time left before `quest` may be started again; never negative.
    pub fn cooldown_remaining(&self, quest: &Quest) -> Duration {
        if !quest.cooldown.enabled {
            return Duration::zero();
        }
        let Some(progress) = self.quest_progress.get(&quest.id) else {
            return Duration::zero();
        };
        if !progress.is_completed() || progress.completion_date() <= 0 {
            return Duration::zero();
        }
        let ends_at = progress
            .completion_date()
            .saturating_add(quest.cooldown_duration().num_milliseconds());
        let remaining = ends_at.saturating_sub(self.ctx.clock.now_millis());
        Duration::milliseconds(remaining.max(0))
    }

    /// With autostart on, a quest counts as started whenever it is eligible or
    /// already started; otherwise only the persisted flag counts.
    pub fn has_started(&self, quest: &Quest) -> bool {
        if self.ctx.options.quest_autostart {
            matches!(
                self.evaluate_start(quest),
                QuestStartResult::Success | QuestStartResult::AlreadyStarted
            )
        } else {
            self.quest_progress
                .get(&quest.id)
                .map_or(false, QuestProgress::is_started)
        }
    }

    /// Every known prerequisite must have been completed at least once.
    pub fn requirements_met(&self, quest: &Quest) -> bool {
        quest.requirements.iter().all(|required| {
            if self.ctx.catalog.quest_by_id(required).is_none() {
                return true;
            }
            self.quest_progress
                .get(required)
                .map_or(false, QuestProgress::is_completed_before)
        })
    }

    /// Drop records for quests and tasks the catalog no longer defines.
    ///
    /// Returns `None` without touching anything while definitions are reloading.
    pub fn clean(&mut self) -> Option<CleanReport> {
        if self.ctx.catalog.is_reloading() || self.ctx.task_types.registrations_accepted() {
            debug!("skipping clean of {}: quest reload in progress", self.player_id);
            return None;
        }
        let catalog = &self.ctx.catalog;
        let mut report = CleanReport::default();
        self.quest_progress
            .retain(|quest_id, progress| match catalog.quest_by_id(quest_id) {
                None => {
                    report.removed_quests.push(quest_id.clone());
                    false
                }
                Some(quest) => {
                    report.removed_tasks +=
                        progress.retain_tasks(|task_id| quest.task_by_id(task_id).is_some());
                    true
                }
            });
        if !report.is_empty() {
            debug!(
                "cleaned {}: {} quests, {} tasks removed",
                self.player_id,
                report.removed_quests.len(),
                report.removed_tasks
            );
        }
        Some(report)
    }

    /// Drop every progress record. Preferences are kept.
    pub fn clear(&mut self) {
        self.quest_progress.clear();
    }

    /// Set a task's progress value. Returns false when `quest` declares no such task.
    pub fn set_task_progress(
        &mut self,
        quest: &Quest,
        task_id: &str,
        value: Option<ProgressValue>,
    ) -> bool {
        if quest.task_by_id(task_id).is_none() {
            return false;
        }
        self.get_or_create_progress(quest)
            .task_entry(task_id)
            .set_progress(value);
        true
    }

    /// Mark a task completed. Returns false when `quest` declares no such task.
    pub fn complete_task(&mut self, quest: &Quest, task_id: &str) -> bool {
        if quest.task_by_id(task_id).is_none() {
            return false;
        }
        self.get_or_create_progress(quest)
            .task_entry(task_id)
            .set_completed(true);
        true
    }

    pub fn task_progress(&self, quest_id: &str, task_id: &str) -> Option<&TaskProgress> {
        self.quest_progress
            .get(quest_id)
            .and_then(|p| p.task_progress(task_id))
    }

    /// Quests with a persisted `started` flag. Under autostart prefer [`Self::has_started`].
    pub fn started_quests(&self) -> Vec<Arc<Quest>> {
        self.quests_from_progress(QuestsProgressFilter::Started)
    }

    /// Catalog quests the player has a matching record for, in quest id order.
    pub fn quests_from_progress(&self, filter: QuestsProgressFilter) -> Vec<Arc<Quest>> {
        self.quest_progress
            .values()
            .filter(|p| filter.matches(p))
            .filter_map(|p| self.ctx.catalog.quest_by_id(p.quest_id()))
            .collect()
    }

    /// Copy every record into a frozen snapshot for persistence.
    pub fn snapshot(&self) -> PlayerSnapshot {
        let quests = self
            .quest_progress
            .values()
            .map(|progress| QuestSnapshot {
                quest_id: progress.quest_id().to_string(),
                started: progress.is_started(),
                completed: progress.is_completed(),
                completed_before: progress.is_completed_before(),
                completion_date: progress.completion_date(),
                tasks: progress
                    .all_task_progress()
                    .map(|task| TaskSnapshot {
                        task_id: task.task_id().to_string(),
                        completed: task.is_completed(),
                        progress: task.progress().cloned(),
                    })
                    .collect(),
            })
            .collect();
        PlayerSnapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            player_id: self.player_id,
            tracked_quest: self.preferences.tracked_quest_id().map(str::to_string),
            quests,
        }
    }

    /// Rebuild a progress file from a persisted snapshot.
    pub fn from_snapshot(snapshot: PlayerSnapshot, ctx: Arc<QuestContext>) -> Self {
        let mut file = Self::new(snapshot.player_id, ctx);
        file.preferences = PlayerPreferences::new(snapshot.tracked_quest);
        for quest in snapshot.quests {
            let mut progress = QuestProgress::restore(
                quest.quest_id,
                quest.started,
                quest.completed,
                quest.completed_before,
                quest.completion_date,
            );
            for task in quest.tasks {
                progress.add_task_progress(TaskProgress::restore(
                    task.task_id,
                    task.progress,
                    task.completed,
                ));
            }
            file.quest_progress
                .insert(progress.quest_id().to_string(), progress);
        }
        file
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quest::catalog::QuestCatalog;
    use crate::clock::ManualClock;
    use crate::config::QuestOptions;
    use crate::errors::TaskTypeError;
    use crate::permission::PermissionTable;
    use crate::progress::Notifier;
    use crate::quest::{Category, ConfigProblem, StaticCatalog, Task, TaskConfig};
    use crate::tasktype::{GameEvent, GameEventKind, TaskType, TaskTypeManager};
    use std::sync::Mutex;

    const T0: i64 = 1_700_000_000_000;

    struct Harness {
        catalog: Arc<StaticCatalog>,
        clock: Arc<ManualClock>,
        permissions: Arc<PermissionTable>,
        ctx: Arc<QuestContext>,
    }

    fn options() -> QuestOptions {
        QuestOptions {
            quest_start_limit: 2,
            quest_autostart: false,
            quest_autotrack: false,
            allow_quest_track: true,
        }
    }

    fn harness_with(
        quests: Vec<Quest>,
        categories: Vec<Category>,
        options: QuestOptions,
        task_types: TaskTypeManager,
    ) -> Harness {
        let catalog = Arc::new(StaticCatalog::with_quests(quests, categories));
        let clock = Arc::new(ManualClock::new(T0));
        let permissions = Arc::new(PermissionTable::new());
        let ctx = QuestContext::new(catalog.clone(), Arc::new(task_types))
            .with_options(options)
            .with_clock(clock.clone())
            .with_permissions(permissions.clone());
        Harness {
            catalog,
            clock,
            permissions,
            ctx: Arc::new(ctx),
        }
    }

    fn harness(quests: Vec<Quest>) -> Harness {
        harness_with(quests, Vec::new(), options(), TaskTypeManager::new())
    }

    fn online_file(h: &Harness) -> QuestProgressFile {
        let player = Uuid::new_v4();
        h.permissions.set_online(player);
        QuestProgressFile::new(player, h.ctx.clone())
    }

    fn quest(h: &Harness, id: &str) -> Arc<Quest> {
        h.catalog.quest_by_id(id).expect("quest in catalog")
    }

    fn two_task_quest(id: &str) -> Quest {
        Quest::new(id, id)
            .with_task(Task::new("a", "noop"))
            .with_task(Task::new("b", "noop"))
    }

    #[test]
    fn lazy_record_has_every_task_unstarted() {
        let h = harness(vec![two_task_quest("q")]);
        let mut file = online_file(&h);
        let q = quest(&h, "q");
        assert!(!file.has_progress(&q));
        let progress = file.get_or_create_progress(&q);
        assert_eq!(progress.task_count(), 2);
        assert!(!progress.is_started() && !progress.is_completed() && !progress.is_completed_before());
        assert!(file.has_progress(&q));
        assert!(matches!(
            file.get_or_create_progress_by_id("ghost"),
            Err(QuestsError::NotFound(_))
        ));
        assert!(file.get_or_create_progress_by_id("q").is_ok());
    }

    #[test]
    fn evaluate_start_does_not_create_records() {
        let h = harness(vec![two_task_quest("q")]);
        let file = online_file(&h);
        assert_eq!(file.evaluate_start(&quest(&h, "q")), QuestStartResult::Success);
        assert_eq!(file.all_progress().count(), 0);
    }

    #[test]
    fn start_resets_tasks_and_marks_started() {
        let h = harness(vec![two_task_quest("q")]);
        let mut file = online_file(&h);
        let q = quest(&h, "q");
        file.set_task_progress(&q, "a", Some(ProgressValue::Integer(3)));
        file.complete_task(&q, "b");

        assert_eq!(file.start(&q), QuestStartResult::Success);
        assert!(file.has_started(&q));
        let progress = file.quest_progress("q").unwrap();
        assert!(progress.is_active());
        for task in progress.all_task_progress() {
            assert!(task.progress().is_none());
            assert!(!task.is_completed());
        }
        assert_eq!(file.start(&q), QuestStartResult::AlreadyStarted);
    }

    #[test]
    fn start_limit_blocks_unless_autostart() {
        let quests = vec![two_task_quest("a"), two_task_quest("b"), two_task_quest("c")];
        let h = harness(quests.clone());
        let mut file = online_file(&h);
        assert!(file.start(&quest(&h, "a")).is_success());
        assert!(file.start(&quest(&h, "b")).is_success());
        assert_eq!(file.start(&quest(&h, "c")), QuestStartResult::LimitReached);

        let mut autostart = options();
        autostart.quest_autostart = true;
        let h = harness_with(quests, Vec::new(), autostart, TaskTypeManager::new());
        let mut file = online_file(&h);
        assert!(file.start(&quest(&h, "a")).is_success());
        assert!(file.start(&quest(&h, "b")).is_success());
        assert!(file.start(&quest(&h, "c")).is_success());
    }

    #[test]
    fn cancel_clears_progress_but_keeps_completion_flags() {
        let h = harness(vec![two_task_quest("q")]);
        let mut file = online_file(&h);
        let q = quest(&h, "q");
        assert_eq!(file.cancel(&q), CancelOutcome::NotStarted);
        assert!(!file.has_progress(&q), "cancel never creates records");

        file.start(&q);
        file.set_task_progress(&q, "a", Some(ProgressValue::Integer(7)));
        file.complete_task(&q, "a");
        assert!(file.cancel(&q).is_cancelled());

        let a = file.task_progress("q", "a").unwrap();
        assert!(a.progress().is_none());
        assert!(a.is_completed());
        assert!(!file.has_started(&q));

        file.start(&q);
        assert!(!file.task_progress("q", "a").unwrap().is_completed());
    }

    #[test]
    fn complete_is_idempotent_in_effect() {
        let h = harness(vec![two_task_quest("q")]);
        let mut file = online_file(&h);
        let q = quest(&h, "q");
        file.start(&q);
        file.complete(&q);
        let progress = file.quest_progress("q").unwrap();
        assert!(progress.is_completed_before());
        assert!(!progress.is_started());
        assert_eq!(progress.completion_date(), T0);

        h.clock.advance(Duration::seconds(1));
        file.complete(&q);
        let progress = file.quest_progress("q").unwrap();
        assert!(progress.is_completed_before());
        assert!(!progress.is_started());
        assert_eq!(progress.completion_date(), T0 + 1_000);
    }

    #[test]
    fn cooldown_counts_down_to_zero() {
        let h = harness(vec![
            two_task_quest("plain").repeatable(true),
            two_task_quest("cool").repeatable(true).with_cooldown_minutes(10),
        ]);
        let mut file = online_file(&h);
        let plain = quest(&h, "plain");
        let cool = quest(&h, "cool");

        file.complete(&plain);
        assert_eq!(file.cooldown_remaining(&plain), Duration::zero());

        assert_eq!(file.cooldown_remaining(&cool), Duration::zero());
        file.complete(&cool);
        assert_eq!(file.cooldown_remaining(&cool), Duration::minutes(10));
        assert_eq!(file.evaluate_start(&cool), QuestStartResult::OnCooldown);

        h.clock.advance(Duration::minutes(4));
        assert_eq!(file.cooldown_remaining(&cool), Duration::minutes(6));
        h.clock.advance(Duration::minutes(6));
        assert_eq!(file.cooldown_remaining(&cool), Duration::zero());
        h.clock.advance(Duration::minutes(60));
        assert_eq!(file.cooldown_remaining(&cool), Duration::zero());
        assert!(file.start(&cool).is_success());
    }

    #[test]
    fn cooldown_is_checked_before_requirements() {
        let h = harness(vec![
            two_task_quest("pre"),
            two_task_quest("both")
                .repeatable(true)
                .with_cooldown_minutes(5)
                .with_requirement("pre"),
        ]);
        let mut file = online_file(&h);
        let both = quest(&h, "both");
        file.complete(&both);
        assert!(!file.requirements_met(&both));
        assert_eq!(file.evaluate_start(&both), QuestStartResult::OnCooldown);

        h.clock.advance(Duration::minutes(5));
        assert_eq!(file.evaluate_start(&both), QuestStartResult::RequirementsNotMet);
    }

    #[test]
    fn already_completed_beats_cooldown() {
        let h = harness(vec![two_task_quest("once").with_cooldown_minutes(5)]);
        let mut file = online_file(&h);
        let once = quest(&h, "once");
        file.complete(&once);
        assert_eq!(file.evaluate_start(&once), QuestStartResult::AlreadyCompleted);
    }

    #[test]
    fn unknown_requirements_are_ignored() {
        let h = harness(vec![
            two_task_quest("pre"),
            two_task_quest("q").with_requirement("ghost").with_requirement("pre"),
        ]);
        let mut file = online_file(&h);
        let q = quest(&h, "q");
        assert!(!file.requirements_met(&q));
        file.get_or_create_progress(&quest(&h, "pre"));
        assert!(!file.requirements_met(&q), "record without completion still blocks");
        file.complete(&quest(&h, "pre"));
        assert!(file.requirements_met(&q));
    }

    #[test]
    fn permission_checks_deny_offline_players() {
        let h = harness_with(
            vec![
                two_task_quest("secret").with_permission_required(),
                two_task_quest("vip").in_category("vip"),
                two_task_quest("open").in_category("nowhere"),
            ],
            vec![Category::new("vip", true)],
            options(),
            TaskTypeManager::new(),
        );
        let offline = QuestProgressFile::new(Uuid::new_v4(), h.ctx.clone());
        assert_eq!(offline.evaluate_start(&quest(&h, "secret")), QuestStartResult::NoPermission);
        assert_eq!(
            offline.evaluate_start(&quest(&h, "vip")),
            QuestStartResult::NoCategoryPermission
        );
        assert_eq!(offline.evaluate_start(&quest(&h, "open")), QuestStartResult::Success);

        let file = online_file(&h);
        assert_eq!(file.evaluate_start(&quest(&h, "secret")), QuestStartResult::NoPermission);
        h.permissions.grant(file.player_id(), "quests.quest.secret");
        h.permissions.grant(file.player_id(), "quests.category.vip");
        assert_eq!(file.evaluate_start(&quest(&h, "secret")), QuestStartResult::Success);
        assert_eq!(file.evaluate_start(&quest(&h, "vip")), QuestStartResult::Success);
    }

    #[test]
    fn autostart_reports_eligible_quests_as_started() {
        let mut autostart = options();
        autostart.quest_autostart = true;
        let h = harness_with(
            vec![two_task_quest("free"), two_task_quest("locked").with_requirement("free")],
            Vec::new(),
            autostart,
            TaskTypeManager::new(),
        );
        let file = online_file(&h);
        assert!(file.has_started(&quest(&h, "free")));
        assert!(!file.has_started(&quest(&h, "locked")));
        assert!(file.started_quests().is_empty());
        assert_eq!(file.all_progress().count(), 0);

        let h = harness(vec![two_task_quest("free")]);
        let file = online_file(&h);
        assert!(!file.has_started(&quest(&h, "free")));
    }

    #[test]
    fn track_requires_started_quest() {
        let h = harness(vec![two_task_quest("q"), two_task_quest("other")]);
        let mut file = online_file(&h);
        let q = quest(&h, "q");
        assert!(!file.track(Some(&q)));
        assert_eq!(file.tracked_quest(), None);
        file.start(&q);
        assert!(file.track(Some(&q)));
        assert_eq!(file.tracked_quest(), Some("q"));
        assert!(!file.track(Some(&quest(&h, "other"))));
        assert_eq!(file.tracked_quest(), Some("q"));
        assert!(file.track(None));
        assert_eq!(file.tracked_quest(), None);
    }

    #[test]
    fn autotrack_follows_start_and_complete() {
        let mut autotrack = options();
        autotrack.quest_autotrack = true;
        let h = harness_with(
            vec![two_task_quest("q"), two_task_quest("loop").repeatable(true)],
            Vec::new(),
            autotrack,
            TaskTypeManager::new(),
        );
        let mut file = online_file(&h);
        let q = quest(&h, "q");
        file.start(&q);
        assert_eq!(file.tracked_quest(), Some("q"));
        file.complete(&q);
        assert_eq!(file.tracked_quest(), None);

        let looping = quest(&h, "loop");
        file.start(&looping);
        file.complete(&looping);
        assert_eq!(file.tracked_quest(), Some("loop"), "instantly repeatable quests stay tracked");
    }

    #[test]
    fn notifications_follow_transitions() {
        let (notifier, mut rx) = Notifier::channel();
        let catalog = Arc::new(StaticCatalog::with_quests(
            vec![two_task_quest("q").with_reward("give {player} diamond")],
            Vec::new(),
        ));
        let ctx = QuestContext::new(catalog.clone(), Arc::new(TaskTypeManager::new()))
            .with_notifier(notifier);
        let mut file = QuestProgressFile::new(Uuid::new_v4(), Arc::new(ctx));
        let q = catalog.quest_by_id("q").unwrap();

        file.cancel(&q);
        file.start(&q);
        file.start(&q);
        file.complete(&q);

        let kinds: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(kinds[0].kind(), "cancel_rejected");
        assert_eq!(kinds[1].kind(), "started");
        assert!(matches!(
            kinds[2],
            QuestNotification::StartRejected {
                result: QuestStartResult::AlreadyStarted,
                ..
            }
        ));
        match &kinds[3] {
            QuestNotification::Completed { rewards, .. } => {
                assert_eq!(rewards, &vec!["give {player} diamond".to_string()]);
            }
            other => panic!("unexpected notification {:?}", other),
        }
    }

    #[test]
    fn clean_prunes_stale_quests_and_tasks() {
        let h = harness(vec![two_task_quest("keep"), two_task_quest("gone")]);
        let mut file = online_file(&h);
        file.start(&quest(&h, "keep"));
        file.start(&quest(&h, "gone"));
        file.set_task_progress(&quest(&h, "keep"), "a", Some(ProgressValue::Integer(1)));

        h.catalog.replace(
            vec![Quest::new("keep", "keep").with_task(Task::new("a", "noop"))],
            Vec::new(),
        );
        let report = file.clean().expect("catalog stable");
        assert_eq!(report.removed_quests, vec!["gone".to_string()]);
        assert_eq!(report.removed_tasks, 1);
        assert!(file.quest_progress("gone").is_none());
        assert_eq!(
            file.task_progress("keep", "a").unwrap().progress(),
            Some(&ProgressValue::Integer(1))
        );
        assert!(file.task_progress("keep", "b").is_none());
    }

    #[test]
    fn clean_is_skipped_during_reload() {
        let h = harness(vec![two_task_quest("q")]);
        let mut file = online_file(&h);
        file.start(&quest(&h, "q"));
        h.catalog.begin_reload();
        h.catalog.replace(Vec::new(), Vec::new());
        assert_eq!(file.clean(), None);
        assert!(file.quest_progress("q").is_some());
        h.catalog.finish_reload();
        assert_eq!(file.clean().unwrap().removed_quests, vec!["q".to_string()]);
    }

    #[test]
    fn clear_keeps_preferences() {
        let h = harness(vec![two_task_quest("q")]);
        let mut file = online_file(&h);
        let q = quest(&h, "q");
        file.start(&q);
        file.track(Some(&q));
        file.clear();
        assert_eq!(file.all_progress().count(), 0);
        assert_eq!(file.tracked_quest(), Some("q"));
    }

    #[test]
    fn task_setters_reject_undeclared_tasks() {
        let h = harness(vec![two_task_quest("q")]);
        let mut file = online_file(&h);
        let q = quest(&h, "q");
        assert!(!file.set_task_progress(&q, "zzz", Some(ProgressValue::Bool(true))));
        assert!(!file.complete_task(&q, "zzz"));
        assert!(file.task_progress("q", "zzz").is_none());
    }

    #[test]
    fn filters_select_matching_quests() {
        let h = harness(vec![two_task_quest("a"), two_task_quest("b"), two_task_quest("c")]);
        let mut file = online_file(&h);
        file.start(&quest(&h, "a"));
        file.complete(&quest(&h, "b"));
        file.get_or_create_progress(&quest(&h, "c"));

        let ids = |filter| {
            file.quests_from_progress(filter)
                .iter()
                .map(|q| q.id.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(QuestsProgressFilter::All), vec!["a", "b", "c"]);
        assert_eq!(ids(QuestsProgressFilter::Started), vec!["a"]);
        assert_eq!(ids(QuestsProgressFilter::Completed), vec!["b"]);
        assert_eq!(ids(QuestsProgressFilter::CompletedBefore), vec!["b"]);
        assert_eq!(file.started_quests().len(), 1);
    }

    #[test]
    fn snapshot_restores_identical_state() {
        let h = harness(vec![two_task_quest("a"), two_task_quest("b")]);
        let mut file = online_file(&h);
        let a = quest(&h, "a");
        file.start(&a);
        file.set_task_progress(&a, "a", Some(ProgressValue::Float(2.5)));
        file.complete_task(&a, "b");
        file.track(Some(&a));
        file.complete(&quest(&h, "b"));

        let snapshot = file.snapshot();
        let restored = QuestProgressFile::from_snapshot(snapshot.clone(), h.ctx.clone());
        assert_eq!(restored.snapshot(), snapshot);
        assert_eq!(restored.tracked_quest(), Some("a"));
        assert!(restored.task_progress("a", "b").unwrap().progress().is_none());
    }

    struct HookRecorder {
        id: &'static str,
        fail: bool,
        calls: Mutex<Vec<String>>,
    }

    impl HookRecorder {
        fn new(id: &'static str, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                id,
                fail,
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    impl TaskType for HookRecorder {
        fn type_id(&self) -> &str {
            self.id
        }

        fn description(&self) -> &str {
            "records start hook calls"
        }

        fn subscriptions(&self) -> &[GameEventKind] {
            &[]
        }

        fn validate_config(&self, _root: &str, _config: &TaskConfig) -> Vec<ConfigProblem> {
            Vec::new()
        }

        fn on_event(
            &self,
            _event: &GameEvent,
            _quests: &[Arc<Quest>],
            _file: &mut QuestProgressFile,
        ) -> usize {
            0
        }

        fn on_start(
            &self,
            _quest: &Quest,
            task: &Task,
            _file: &mut QuestProgressFile,
        ) -> Result<(), TaskTypeError> {
            self.calls.lock().unwrap().push(task.id.clone());
            if self.fail {
                return Err(TaskTypeError::Unavailable {
                    task_type: self.id.to_string(),
                    detail: "hook failure".into(),
                });
            }
            Ok(())
        }
    }

    #[test]
    fn failing_start_hook_does_not_abort_start() {
        let failing = HookRecorder::new("failing", true);
        let working = HookRecorder::new("working", false);
        let mut task_types = TaskTypeManager::new();
        task_types.register_task_type(failing.clone());
        task_types.register_task_type(working.clone());

        let q = Quest::new("q", "q")
            .with_task(Task::new("first", "failing"))
            .with_task(Task::new("second", "working"))
            .with_task(Task::new("third", "missing-type"));
        let h = harness_with(vec![q], Vec::new(), options(), task_types);
        let mut file = online_file(&h);

        assert_eq!(file.start(&quest(&h, "q")), QuestStartResult::Success);
        assert!(file.quest_progress("q").unwrap().is_started());
        assert_eq!(*failing.calls.lock().unwrap(), vec!["first".to_string()]);
        assert_eq!(*working.calls.lock().unwrap(), vec!["second".to_string()]);
    }
}
