//! Thread-safe configuration caching with arc-swap for lock-free reads.

use crate::schema::Config;
use arc_swap::ArcSwap;
use std::sync::Arc;
use tracing::debug;

/// Thread-safe configuration cache using arc-swap for lock-free reads.
pub struct ConfigCache {
    config: ArcSwap<Config>,
}

impl ConfigCache {
    /// Creates a new configuration cache with the given initial configuration.
    pub fn new(config: Config) -> Self {
        Self {
            config: ArcSwap::from_pointee(config),
        }
    }

    /// Gets the current configuration.
    pub fn get(&self) -> Arc<Config> {
        self.config.load_full()
    }

    /// Replaces the configuration atomically. Readers holding the previous
    /// `Arc` keep seeing it until they call [`get`](Self::get) again.
    pub fn update(&self, config: Config) {
        self.config.store(Arc::new(config));
        debug!("Configuration cache updated");
    }

    /// Applies `f` to a copy of the current configuration and stores the result.
    pub fn modify<F>(&self, f: F)
    where
        F: Fn(&mut Config),
    {
        self.config.rcu(|current| {
            let mut next = Config::clone(current);
            f(&mut next);
            next
        });
    }
}

impl Default for ConfigCache {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modify_keeps_other_fields() {
        let cache = ConfigCache::default();
        cache.modify(|config| config.discord.token = "t".to_string());

        let config = cache.get();
        assert_eq!(config.discord.token, "t");
        assert_eq!(config.transfer.batch_size, 10);
    }
}
