//! Bounded log of executed commands

use chrono::{DateTime, Utc};
use guildbridge_common::truncate_string;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use uuid::Uuid;

/// Default number of retained entries
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Stored results longer than this are cut with an ellipsis
pub const MAX_RESULT_CHARS: usize = 2000;

/// One executed command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandHistoryEntry {
    /// Entry identifier
    pub id: Uuid,
    /// Raw command line as entered
    pub command: String,
    /// When it ran
    pub timestamp: DateTime<Utc>,
    /// Whether it succeeded
    pub success: bool,
    /// Reply JSON on success, error message on failure
    pub result: String,
    /// Marked as favorite
    pub favorite: bool,
    /// User tags
    pub tags: BTreeSet<String>,
}

/// Most recent commands, newest first, oldest evicted past the limit
#[derive(Debug, Clone)]
pub struct CommandHistory {
    entries: VecDeque<CommandHistoryEntry>,
    limit: usize,
}

impl CommandHistory {
    /// Create an empty history keeping at most `limit` entries
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(limit),
            limit: limit.max(1),
        }
    }

    /// Append an entry and return its id
    pub fn record(&mut self, command: impl Into<String>, success: bool, result: impl Into<String>) -> Uuid {
        let entry = CommandHistoryEntry {
            id: Uuid::new_v4(),
            command: command.into(),
            timestamp: Utc::now(),
            success,
            result: truncate_string(&result.into(), MAX_RESULT_CHARS),
            favorite: false,
            tags: BTreeSet::new(),
        };
        let id = entry.id;
        self.entries.push_front(entry);
        self.entries.truncate(self.limit);
        id
    }

    /// Entries, newest first
    pub fn entries(&self) -> impl Iterator<Item = &CommandHistoryEntry> {
        self.entries.iter()
    }

    /// Look up an entry
    pub fn get(&self, id: Uuid) -> Option<&CommandHistoryEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    fn get_mut(&mut self, id: Uuid) -> Option<&mut CommandHistoryEntry> {
        self.entries.iter_mut().find(|e| e.id == id)
    }

    /// Flip the favorite flag; returns the new value
    pub fn toggle_favorite(&mut self, id: Uuid) -> Option<bool> {
        let entry = self.get_mut(id)?;
        entry.favorite = !entry.favorite;
        Some(entry.favorite)
    }

    /// Add a tag. Returns `false` if the entry is unknown or the tag is blank.
    pub fn add_tag(&mut self, id: Uuid, tag: &str) -> bool {
        let tag = tag.trim();
        if tag.is_empty() {
            return false;
        }
        match self.get_mut(id) {
            Some(entry) => {
                entry.tags.insert(tag.to_string());
                true
            }
            None => false,
        }
    }

    /// Remove a tag. Returns whether it was present.
    pub fn remove_tag(&mut self, id: Uuid, tag: &str) -> bool {
        self.get_mut(id)
            .is_some_and(|entry| entry.tags.remove(tag.trim()))
    }

    /// Favorite entries, newest first
    pub fn favorites(&self) -> Vec<&CommandHistoryEntry> {
        self.entries.iter().filter(|e| e.favorite).collect()
    }

    /// Entries carrying `tag`, newest first
    pub fn with_tag(&self, tag: &str) -> Vec<&CommandHistoryEntry> {
        self.entries
            .iter()
            .filter(|e| e.tags.contains(tag))
            .collect()
    }

    /// Remove everything
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the history is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for CommandHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oldest_entries_are_evicted() {
        let mut history = CommandHistory::default();
        for i in 0..25 {
            history.record(format!("getRoles {}", i), true, "{}");
        }

        assert_eq!(history.len(), 20);
        let newest = history.entries().next().unwrap();
        assert_eq!(newest.command, "getRoles 24");
        let oldest = history.entries().last().unwrap();
        assert_eq!(oldest.command, "getRoles 5");
    }

    #[test]
    fn test_favorites_and_tags() {
        let mut history = CommandHistory::new(5);
        let a = history.record("test", true, "{}");
        let b = history.record("authorized", false, "Bot is not connected");

        assert_eq!(history.toggle_favorite(a), Some(true));
        assert_eq!(history.favorites().len(), 1);
        assert_eq!(history.toggle_favorite(a), Some(false));
        assert!(history.favorites().is_empty());
        assert_eq!(history.toggle_favorite(Uuid::new_v4()), None);

        assert!(history.add_tag(b, " debug "));
        assert!(!history.add_tag(b, "   "));
        assert!(history.add_tag(a, "debug"));
        assert_eq!(history.with_tag("debug").len(), 2);

        assert!(history.remove_tag(b, "debug"));
        assert!(!history.remove_tag(b, "debug"));
        assert_eq!(history.with_tag("debug").len(), 1);

        history.clear();
        assert!(history.is_empty());
    }
}
