use serde::{Deserialize, Serialize};

/// Per-player settings owned by the progress file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerPreferences {
    tracked_quest_id: Option<String>,
}

impl PlayerPreferences {
    pub fn new(tracked_quest_id: Option<String>) -> Self {
        Self { tracked_quest_id }
    }

    pub fn tracked_quest_id(&self) -> Option<&str> {
        self.tracked_quest_id.as_deref()
    }

    pub(crate) fn set_tracked_quest_id(&mut self, quest_id: Option<String>) -> Option<String> {
        std::mem::replace(&mut self.tracked_quest_id, quest_id)
    }
}
