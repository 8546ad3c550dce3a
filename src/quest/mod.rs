//! Quest and task definitions as the catalog hands them to the progress engine.
//!
//! Definitions are immutable once loaded; the engine only ever reads them
//! through [`catalog::QuestCatalog`].

pub mod catalog;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use catalog::{QuestCatalog, StaticCatalog};
pub use loader::{ConfigProblem, LoadReport, ProblemSeverity, QuestDefinitions};

/// A typed task config value as read from a quest definition file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<ConfigValue>),
}

impl ConfigValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ConfigValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Short type label used in config problem descriptions.
    pub fn kind(&self) -> &'static str {
        match self {
            ConfigValue::Bool(_) => "boolean",
            ConfigValue::Integer(_) => "integer",
            ConfigValue::Float(_) => "decimal",
            ConfigValue::Text(_) => "text",
            ConfigValue::List(_) => "list",
        }
    }
}

/// Field name → value map carried by every task definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct TaskConfig(BTreeMap<String, ConfigValue>);

impl TaskConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: &str, value: ConfigValue) -> Self {
        self.0.insert(field.to_string(), value);
        self
    }

    pub fn get(&self, field: &str) -> Option<&ConfigValue> {
        self.0.get(field)
    }

    pub fn get_int(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(ConfigValue::as_int)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(ConfigValue::as_str)
    }
}

/// One measurable sub-goal of a quest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    #[serde(rename = "type")]
    pub task_type: String,
    #[serde(flatten)]
    pub config: TaskConfig,
}

impl Task {
    pub fn new(id: &str, task_type: &str) -> Self {
        Self {
            id: id.to_string(),
            task_type: task_type.to_string(),
            config: TaskConfig::new(),
        }
    }

    pub fn with_config(mut self, field: &str, value: ConfigValue) -> Self {
        self.config = self.config.with(field, value);
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CooldownSettings {
    #[serde(default)]
    pub enabled: bool,
    /// Cooldown length in minutes.
    #[serde(default)]
    pub minutes: u64,
}

/// Quest definition: ordered tasks, gating rules and completion rewards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Quest {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub repeatable: bool,
    #[serde(default)]
    pub cooldown: CooldownSettings,
    #[serde(default)]
    pub permission_required: bool,
    #[serde(default)]
    pub category: Option<String>,
    /// Quest IDs that must have been completed before this one can start
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    /// Reward commands, `{player}` is substituted by the reward executor
    #[serde(default)]
    pub rewards: Vec<String>,
    #[serde(default)]
    pub reward_text: Vec<String>,
    #[serde(default)]
    pub start_text: Vec<String>,
}

impl Quest {
    pub fn new(id: &str, display_name: &str) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            repeatable: false,
            cooldown: CooldownSettings::default(),
            permission_required: false,
            category: None,
            requirements: Vec::new(),
            tasks: Vec::new(),
            rewards: Vec::new(),
            reward_text: Vec::new(),
            start_text: Vec::new(),
        }
    }

    pub fn with_task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn with_requirement(mut self, quest_id: &str) -> Self {
        self.requirements.push(quest_id.to_string());
        self
    }

    pub fn repeatable(mut self, repeatable: bool) -> Self {
        self.repeatable = repeatable;
        self
    }

    pub fn with_cooldown_minutes(mut self, minutes: u64) -> Self {
        self.cooldown = CooldownSettings {
            enabled: true,
            minutes,
        };
        self
    }

    pub fn with_permission_required(mut self) -> Self {
        self.permission_required = true;
        self
    }

    pub fn in_category(mut self, category_id: &str) -> Self {
        self.category = Some(category_id.to_string());
        self
    }

    pub fn with_reward(mut self, command: &str) -> Self {
        self.rewards.push(command.to_string());
        self
    }

    pub fn task_by_id(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    pub fn tasks_of_type<'a>(&'a self, task_type: &'a str) -> impl Iterator<Item = &'a Task> + 'a {
        self.tasks.iter().filter(move |t| t.task_type == task_type)
    }

    pub fn cooldown_duration(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.cooldown.minutes.min(i64::MAX as u64 / 60_000) as i64)
    }

    /// Falls back to the id when no display name was configured.
    pub fn display_name(&self) -> &str {
        if self.display_name.is_empty() {
            &self.id
        } else {
            &self.display_name
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub permission_required: bool,
}

impl Category {
    pub fn new(id: &str, permission_required: bool) -> Self {
        Self {
            id: id.to_string(),
            display_name: id.to_string(),
            permission_required,
        }
    }
}
