//! Cooldown and in-flight guards keyed by command signature

use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

/// Errors raised by the command guards
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GuardError {
    /// The signature ran within the cooldown window
    #[error("'{signature}' is on cooldown ({}ms remaining)", .remaining.as_millis())]
    OnCooldown {
        /// Command signature
        signature: String,
        /// Time left in the window
        remaining: Duration,
    },
    /// The signature is still executing
    #[error("'{0}' is already running")]
    AlreadyRunning(String),
}

/// Tracked signatures above which expired entries are dropped on acquire
pub const DEFAULT_PRUNE_THRESHOLD: usize = 256;

/// Per-signature cooldown tracker
#[derive(Debug)]
pub struct CooldownManager {
    window: Duration,
    prune_threshold: usize,
    cooldowns: DashMap<String, Instant>,
}

impl CooldownManager {
    /// Create a manager with the given window
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            prune_threshold: DEFAULT_PRUNE_THRESHOLD,
            cooldowns: DashMap::new(),
        }
    }

    /// Prune expired entries whenever more than `threshold` are tracked
    pub fn with_prune_threshold(mut self, threshold: usize) -> Self {
        self.prune_threshold = threshold;
        self
    }

    /// Cooldown window
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Reject `signature` if it was used within the window, otherwise start a
    /// new window for it.
    pub fn try_acquire(&self, signature: &str) -> Result<(), GuardError> {
        if self.cooldowns.len() > self.prune_threshold {
            self.cleanup_expired();
        }

        let now = Instant::now();
        match self.cooldowns.entry(signature.to_string()) {
            Entry::Occupied(mut entry) => {
                let elapsed = now.saturating_duration_since(*entry.get());
                if elapsed < self.window {
                    return Err(GuardError::OnCooldown {
                        signature: signature.to_string(),
                        remaining: self.window - elapsed,
                    });
                }
                entry.insert(now);
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
            }
        }

        debug!(signature, "Cooldown applied");
        Ok(())
    }

    /// Time left before `signature` may run again
    pub fn remaining(&self, signature: &str) -> Option<Duration> {
        let last_used = *self.cooldowns.get(signature)?;
        self.window.checked_sub(last_used.elapsed()).filter(|d| !d.is_zero())
    }

    /// Forget the cooldown of one signature
    pub fn clear(&self, signature: &str) {
        self.cooldowns.remove(signature);
    }

    /// Number of tracked signatures
    pub fn active_cooldowns(&self) -> usize {
        self.cooldowns.len()
    }

    /// Drop entries whose window has passed
    pub fn cleanup_expired(&self) {
        let before = self.cooldowns.len();
        self.cooldowns
            .retain(|_, last_used| last_used.elapsed() < self.window);
        debug!(removed = before.saturating_sub(self.cooldowns.len()), "Cleaned up expired cooldowns");
    }
}

impl Default for CooldownManager {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

/// Set of signatures currently executing
#[derive(Debug, Default, Clone)]
pub struct InFlightSet {
    running: Arc<DashSet<String>>,
}

impl InFlightSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `signature` as running until the returned guard is dropped
    pub fn try_enter(&self, signature: &str) -> Result<InFlightGuard, GuardError> {
        if self.running.insert(signature.to_string()) {
            Ok(InFlightGuard {
                running: Arc::clone(&self.running),
                signature: signature.to_string(),
            })
        } else {
            Err(GuardError::AlreadyRunning(signature.to_string()))
        }
    }

    /// Whether `signature` is running
    pub fn contains(&self, signature: &str) -> bool {
        self.running.contains(signature)
    }

    /// Number of running signatures
    pub fn len(&self) -> usize {
        self.running.len()
    }

    /// Whether nothing is running
    pub fn is_empty(&self) -> bool {
        self.running.is_empty()
    }
}

/// Removes its signature from the in-flight set on drop
#[derive(Debug)]
pub struct InFlightGuard {
    running: Arc<DashSet<String>>,
    signature: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.running.remove(&self.signature);
    }
}
