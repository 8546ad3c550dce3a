//! Player quest progress: entities, the per-player progress file that drives
//! the quest lifecycle, and the notifications it emits.

pub mod file;
pub mod notify;
pub mod preferences;
pub mod types;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::config::QuestOptions;
use crate::permission::{AllowAll, PermissionOracle};
use crate::quest::QuestCatalog;
use crate::tasktype::TaskTypeManager;

pub use file::{CancelOutcome, CleanReport, QuestProgressFile};
pub use notify::{Notifier, QuestNotification};
pub use preferences::PlayerPreferences;
pub use types::{ProgressValue, QuestProgress, TaskProgress};

/// Outcome of evaluating (or attempting) a quest start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestStartResult {
    Success,
    LimitReached,
    AlreadyCompleted,
    OnCooldown,
    RequirementsNotMet,
    AlreadyStarted,
    NoPermission,
    NoCategoryPermission,
}

impl QuestStartResult {
    pub fn is_success(self) -> bool {
        self == QuestStartResult::Success
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QuestStartResult::Success => "success",
            QuestStartResult::LimitReached => "limit_reached",
            QuestStartResult::AlreadyCompleted => "already_completed",
            QuestStartResult::OnCooldown => "on_cooldown",
            QuestStartResult::RequirementsNotMet => "requirements_not_met",
            QuestStartResult::AlreadyStarted => "already_started",
            QuestStartResult::NoPermission => "no_permission",
            QuestStartResult::NoCategoryPermission => "no_category_permission",
        }
    }
}

impl fmt::Display for QuestStartResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Filter for [`QuestProgressFile::quests_from_progress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestsProgressFilter {
    All,
    Started,
    Completed,
    CompletedBefore,
}

impl QuestsProgressFilter {
    /// Parse the names used by older menus and placeholders; unknown names mean `All`.
    pub fn from_legacy(name: &str) -> Self {
        match name {
            "started" => QuestsProgressFilter::Started,
            "completed" => QuestsProgressFilter::Completed,
            "completedBefore" => QuestsProgressFilter::CompletedBefore,
            _ => QuestsProgressFilter::All,
        }
    }

    pub fn legacy_name(self) -> &'static str {
        match self {
            QuestsProgressFilter::All => "all",
            QuestsProgressFilter::Started => "started",
            QuestsProgressFilter::Completed => "completed",
            QuestsProgressFilter::CompletedBefore => "completedBefore",
        }
    }

    pub fn matches(self, progress: &QuestProgress) -> bool {
        match self {
            QuestsProgressFilter::All => true,
            QuestsProgressFilter::Started => progress.is_started(),
            QuestsProgressFilter::Completed => progress.is_completed(),
            QuestsProgressFilter::CompletedBefore => progress.is_completed_before(),
        }
    }
}

/// Collaborators shared by every progress file.
pub struct QuestContext {
    pub catalog: Arc<dyn QuestCatalog>,
    pub task_types: Arc<TaskTypeManager>,
    pub permissions: Arc<dyn PermissionOracle>,
    pub options: QuestOptions,
    pub clock: Arc<dyn Clock>,
    pub notifier: Notifier,
}

impl QuestContext {
    pub fn new(catalog: Arc<dyn QuestCatalog>, task_types: Arc<TaskTypeManager>) -> Self {
        Self {
            catalog,
            task_types,
            permissions: Arc::new(AllowAll),
            options: QuestOptions::default(),
            clock: Arc::new(SystemClock),
            notifier: Notifier::disabled(),
        }
    }

    pub fn with_permissions(mut self, permissions: Arc<dyn PermissionOracle>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_options(mut self, options: QuestOptions) -> Self {
        self.options = options;
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
}
