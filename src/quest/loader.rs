//! Quest definition loading and aggregated validation.
//!
//! Definitions are read from a JSON document so admins can edit quests without
//! recompiling. Every problem across every quest is collected before anything
//! is accepted; quests carrying an error never reach the catalog.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::{Category, Quest};
use crate::errors::QuestsError;
use crate::logging::escape_log;
use crate::tasktype::TaskTypeManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemSeverity {
    Error,
    Warning,
}

/// A single structured problem found in a quest definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigProblem {
    pub severity: ProblemSeverity,
    pub description: String,
    /// Dotted path inside the quest definition, e.g. `tasks.mine.level`
    pub location: String,
}

impl ConfigProblem {
    pub fn error(location: &str, description: impl Into<String>) -> Self {
        Self {
            severity: ProblemSeverity::Error,
            description: description.into(),
            location: location.to_string(),
        }
    }

    pub fn warning(location: &str, description: impl Into<String>) -> Self {
        Self {
            severity: ProblemSeverity::Warning,
            description: description.into(),
            location: location.to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == ProblemSeverity::Error
    }
}

impl fmt::Display for ConfigProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.severity {
            ProblemSeverity::Error => "error",
            ProblemSeverity::Warning => "warning",
        };
        write!(f, "[{}] {}: {}", label, self.location, self.description)
    }
}

/// Raw on-disk document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuestDefinitions {
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub quests: Vec<Quest>,
}

impl QuestDefinitions {
    pub fn from_json_str(contents: &str) -> Result<Self, QuestsError> {
        Ok(serde_json::from_str(contents)?)
    }

    pub fn load_from_json<P: AsRef<Path>>(path: P) -> Result<Self, QuestsError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        serde_json::from_str(&contents).map_err(|e| {
            QuestsError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Failed to parse {}: {}", path.display(), e),
            ))
        })
    }
}

/// Outcome of validating a definitions document.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Problems keyed by quest id (categories use `category:<id>`)
    pub problems: BTreeMap<String, Vec<ConfigProblem>>,
    pub accepted: Vec<String>,
    pub rejected: Vec<String>,
}

impl LoadReport {
    pub fn has_errors(&self) -> bool {
        self.problems.values().flatten().any(ConfigProblem::is_error)
    }

    pub fn problem_count(&self) -> usize {
        self.problems.values().map(Vec::len).sum()
    }

    fn push(&mut self, owner: &str, problem: ConfigProblem) {
        self.problems.entry(owner.to_string()).or_default().push(problem);
    }
}

/// Validate every quest against the registered task types and return the
/// quests that are safe to register alongside the full problem report.
pub fn validate_definitions(
    definitions: QuestDefinitions,
    task_types: &TaskTypeManager,
) -> (Vec<Quest>, Vec<Category>, LoadReport) {
    let mut report = LoadReport::default();

    let mut category_ids = HashSet::new();
    let mut categories = Vec::new();
    for category in definitions.categories {
        if !category_ids.insert(category.id.clone()) {
            report.push(
                &format!("category:{}", category.id),
                ConfigProblem::error("id", "duplicate category id, later definition ignored"),
            );
            continue;
        }
        categories.push(category);
    }

    let quest_ids: HashSet<String> = definitions.quests.iter().map(|q| q.id.clone()).collect();
    let mut seen_quests = HashSet::new();
    let mut accepted = Vec::new();

    for quest in definitions.quests {
        let mut problems = Vec::new();

        if !seen_quests.insert(quest.id.clone()) {
            problems.push(ConfigProblem::error("id", "duplicate quest id"));
        }

        let mut seen_tasks = HashSet::new();
        for task in &quest.tasks {
            let root = format!("tasks.{}", task.id);
            if !seen_tasks.insert(task.id.as_str()) {
                problems.push(ConfigProblem::error(&root, "duplicate task id"));
            }
            match task_types.get(&task.task_type) {
                Some(task_type) => problems.extend(task_type.validate_config(&root, &task.config)),
                None => problems.push(ConfigProblem::error(
                    &format!("{}.type", root),
                    format!("task type '{}' does not exist", task.task_type),
                )),
            }
        }

        if quest.tasks.is_empty() {
            problems.push(ConfigProblem::warning("tasks", "quest has no tasks and can never progress"));
        }

        for requirement in &quest.requirements {
            if !quest_ids.contains(requirement) {
                problems.push(ConfigProblem::warning(
                    "requirements",
                    format!("required quest '{}' does not exist and will be ignored", requirement),
                ));
            }
        }

        if let Some(category) = &quest.category {
            if !category_ids.contains(category) {
                problems.push(ConfigProblem::warning(
                    "category",
                    format!("category '{}' does not exist", category),
                ));
            }
        }

        let rejected = problems.iter().any(ConfigProblem::is_error);
        for problem in problems {
            report.push(&quest.id, problem);
        }
        if rejected {
            report.rejected.push(quest.id.clone());
        } else {
            report.accepted.push(quest.id.clone());
            accepted.push(quest);
        }
    }

    for (owner, problems) in &report.problems {
        for problem in problems {
            warn!("quest {}: {}", escape_log(owner), problem);
        }
    }
    info!(
        "validated quest definitions: {} accepted, {} rejected, {} problems",
        report.accepted.len(),
        report.rejected.len(),
        report.problem_count()
    );

    (accepted, categories, report)
}
