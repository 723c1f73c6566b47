//! User-facing notices.
//!
//! The identifier is stable per command kind so a UI can replace an earlier
//! notice instead of stacking a new one for every repeated failure.

use crate::error::CommandError;
use serde::Serialize;

/// Notice severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    /// Informational
    Info,
    /// The command did not run
    Warning,
    /// The command failed
    Error,
}

/// A notification with a stable identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    /// `command-<name>`
    pub id: String,
    /// Severity
    pub level: NoticeLevel,
    /// Short heading
    pub title: String,
    /// Detail
    pub message: String,
}

impl Notice {
    /// Identifier used for notices about `command`
    pub fn id_for(command: &str) -> String {
        format!("command-{}", command)
    }

    /// Notice describing a failed command. `command` is `None` when the
    /// command line could not be resolved to a command.
    pub fn for_failure(command: Option<&str>, error: &CommandError) -> Self {
        let name = command.unwrap_or("unknown");
        let level = if error.is_rejection() {
            NoticeLevel::Warning
        } else {
            NoticeLevel::Error
        };
        Self {
            id: Self::id_for(name),
            level,
            title: format!("{} failed", name),
            message: error.to_string(),
        }
    }
}
