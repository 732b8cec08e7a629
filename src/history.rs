use std::collections::VecDeque;

use serde::Serialize;

use crate::backend::CommandResult;

/// Maximum number of commands kept; older ones fall off the end.
pub const MAX_HISTORY_ITEMS: usize = 10;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CommandHistoryItem {
    pub timestamp: String,
    pub command: String,
    pub result: CommandResult,
}

impl CommandHistoryItem {
    /// Stamped with the current time.
    #[must_use]
    pub fn now(command: impl Into<String>, result: CommandResult) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            command: command.into(),
            result,
        }
    }
}

/// Most-recent-first log of the session's commands. Nothing is persisted.
#[derive(Default)]
pub struct CommandHistory {
    items: VecDeque<CommandHistoryItem>,
}

impl CommandHistory {
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: VecDeque::with_capacity(MAX_HISTORY_ITEMS + 1),
        }
    }

    pub fn record(&mut self, item: CommandHistoryItem) {
        self.items.push_front(item);
        self.items.truncate(MAX_HISTORY_ITEMS);
    }

    /// Newest first.
    pub fn items(&self) -> impl Iterator<Item = &CommandHistoryItem> {
        self.items.iter()
    }
}
