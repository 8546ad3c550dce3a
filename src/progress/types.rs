use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Task-type specific progress payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ProgressValue {
    Integer(i64),
    Float(f64),
    Text(String),
    Bool(bool),
    List(Vec<ProgressValue>),
}

impl ProgressValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ProgressValue::Integer(v) => Some(*v),
            ProgressValue::Float(v) => Some(*v as i64),
            _ => None,
        }
    }
}

/// Progress of a single task for one player.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskProgress {
    task_id: String,
    progress: Option<ProgressValue>,
    completed: bool,
}

impl TaskProgress {
    pub fn new(task_id: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            progress: None,
            completed: false,
        }
    }

    pub(crate) fn restore(task_id: String, progress: Option<ProgressValue>, completed: bool) -> Self {
        Self {
            task_id,
            progress,
            completed,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn progress(&self) -> Option<&ProgressValue> {
        self.progress.as_ref()
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub(crate) fn set_progress(&mut self, progress: Option<ProgressValue>) {
        self.progress = progress;
    }

    pub(crate) fn set_completed(&mut self, completed: bool) {
        self.completed = completed;
    }
}

/// Progress of one quest for one player.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestProgress {
    quest_id: String,
    started: bool,
    completed: bool,
    completed_before: bool,
    /// Milliseconds since the epoch of the latest completion, 0 when never completed
    completion_date: i64,
    task_progress: BTreeMap<String, TaskProgress>,
}

impl QuestProgress {
    pub fn new(quest_id: &str) -> Self {
        Self {
            quest_id: quest_id.to_string(),
            started: false,
            completed: false,
            completed_before: false,
            completion_date: 0,
            task_progress: BTreeMap::new(),
        }
    }

    pub(crate) fn restore(
        quest_id: String,
        started: bool,
        completed: bool,
        completed_before: bool,
        completion_date: i64,
    ) -> Self {
        Self {
            quest_id,
            started,
            completed,
            // a completed record has always been completed before
            completed_before: completed_before || completed,
            completion_date,
            task_progress: BTreeMap::new(),
        }
    }

    pub fn quest_id(&self) -> &str {
        &self.quest_id
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn is_completed_before(&self) -> bool {
        self.completed_before
    }

    pub fn completion_date(&self) -> i64 {
        self.completion_date
    }

    /// Started and not yet finished.
    pub fn is_active(&self) -> bool {
        self.started && !self.completed
    }

    pub fn task_progress(&self, task_id: &str) -> Option<&TaskProgress> {
        self.task_progress.get(task_id)
    }

    pub fn all_task_progress(&self) -> impl Iterator<Item = &TaskProgress> {
        self.task_progress.values()
    }

    pub fn task_count(&self) -> usize {
        self.task_progress.len()
    }

    /// True when there is at least one task and every task is completed.
    pub fn all_tasks_completed(&self) -> bool {
        !self.task_progress.is_empty() && self.task_progress.values().all(TaskProgress::is_completed)
    }

    pub(crate) fn set_started(&mut self, started: bool) {
        self.started = started;
    }

    pub(crate) fn set_completed(&mut self, completed: bool) {
        self.completed = completed;
        if completed {
            self.completed_before = true;
        }
    }

    pub(crate) fn set_completion_date(&mut self, millis: i64) {
        self.completion_date = millis;
    }

    pub(crate) fn add_task_progress(&mut self, task: TaskProgress) {
        self.task_progress.insert(task.task_id.clone(), task);
    }

    #[cfg(test)]
    pub(crate) fn task_progress_mut(&mut self, task_id: &str) -> Option<&mut TaskProgress> {
        self.task_progress.get_mut(task_id)
    }

    /// Task progress for `task_id`, inserted blank when missing.
    pub(crate) fn task_entry(&mut self, task_id: &str) -> &mut TaskProgress {
        self.task_progress
            .entry(task_id.to_string())
            .or_insert_with(|| TaskProgress::new(task_id))
    }

    pub(crate) fn task_progress_values_mut(&mut self) -> impl Iterator<Item = &mut TaskProgress> {
        self.task_progress.values_mut()
    }

    pub(crate) fn retain_tasks<F: FnMut(&str) -> bool>(&mut self, mut keep: F) -> usize {
        let before = self.task_progress.len();
        self.task_progress.retain(|id, _| keep(id));
        before - self.task_progress.len()
    }
}
