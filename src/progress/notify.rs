//! Outbound notifications emitted on lifecycle transitions.
//!
//! Presentation (chat, titles) and reward execution consume these on their
//! own schedule. Emitting never blocks and never fails the transition.

use log::trace;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

use super::QuestStartResult;

#[derive(Debug, Clone, PartialEq)]
pub enum QuestNotification {
    Started {
        player: Uuid,
        quest_id: String,
        start_text: Vec<String>,
    },
    StartRejected {
        player: Uuid,
        quest_id: String,
        result: QuestStartResult,
        /// Remaining cooldown in milliseconds when the rejection is a cooldown
        cooldown_millis: i64,
    },
    Cancelled {
        player: Uuid,
        quest_id: String,
    },
    CancelRejected {
        player: Uuid,
        quest_id: String,
    },
    Completed {
        player: Uuid,
        quest_id: String,
        /// Reward commands for the reward executor, `{player}` left unsubstituted
        rewards: Vec<String>,
        reward_text: Vec<String>,
    },
    TrackStarted {
        player: Uuid,
        quest_id: String,
    },
    TrackStopped {
        player: Uuid,
        /// The quest that was tracked before, if any
        quest_id: Option<String>,
    },
}

impl QuestNotification {
    pub fn player(&self) -> Uuid {
        match self {
            QuestNotification::Started { player, .. }
            | QuestNotification::StartRejected { player, .. }
            | QuestNotification::Cancelled { player, .. }
            | QuestNotification::CancelRejected { player, .. }
            | QuestNotification::Completed { player, .. }
            | QuestNotification::TrackStarted { player, .. }
            | QuestNotification::TrackStopped { player, .. } => *player,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            QuestNotification::Started { .. } => "started",
            QuestNotification::StartRejected { .. } => "start_rejected",
            QuestNotification::Cancelled { .. } => "cancelled",
            QuestNotification::CancelRejected { .. } => "cancel_rejected",
            QuestNotification::Completed { .. } => "completed",
            QuestNotification::TrackStarted { .. } => "track_started",
            QuestNotification::TrackStopped { .. } => "track_stopped",
        }
    }
}

/// Cloneable, optional sender half.
#[derive(Debug, Clone, Default)]
pub struct Notifier {
    tx: Option<UnboundedSender<QuestNotification>>,
}

impl Notifier {
    /// A notifier that drops everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn channel() -> (Self, UnboundedReceiver<QuestNotification>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn emit(&self, notification: QuestNotification) {
        if let Some(tx) = &self.tx {
            trace!("notify {} for {}", notification.kind(), notification.player());
            // receiver gone means nobody is listening any more
            let _ = tx.send(notification);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_reaches_receiver() {
        let (notifier, mut rx) = Notifier::channel();
        let player = Uuid::new_v4();
        notifier.emit(QuestNotification::Cancelled {
            player,
            quest_id: "q".into(),
        });
        let got = rx.try_recv().unwrap();
        assert_eq!(got.kind(), "cancelled");
        assert_eq!(got.player(), player);
    }

    #[test]
    fn emit_survives_dropped_receiver() {
        let (notifier, rx) = Notifier::channel();
        drop(rx);
        notifier.emit(QuestNotification::TrackStopped {
            player: Uuid::new_v4(),
            quest_id: None,
        });
        Notifier::disabled().emit(QuestNotification::TrackStopped {
            player: Uuid::new_v4(),
            quest_id: None,
        });
    }
}
