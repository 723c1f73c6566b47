//! Test utilities and shared test helpers for GuildBridge.
//!
//! Enabled for the crate's own tests and, through the `testing` feature, for
//! every other crate in the workspace.

use crate::{ChannelId, GuildId, RoleId, UserId};
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize logging for tests once per test binary.
///
/// Honors `RUST_LOG`, defaults to `debug`, and writes through the test
/// harness so output is only shown for failing tests.
pub fn init_test_logging() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"));

        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter(filter)
            .try_init();
    });
}

/// Test fixture for creating a fixed timestamp.
pub fn mock_timestamp(
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    min: u32,
    sec: u32,
) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
        .unwrap()
}

/// Discord-related fixtures.
pub mod discord_fixtures {
    use super::*;

    /// Token used by tests; never a real credential.
    pub const TEST_TOKEN: &str = "test-bot-token";

    /// A test guild ID.
    pub fn test_guild_id() -> GuildId {
        GuildId(613425648685547541)
    }

    /// A test channel ID.
    pub fn test_channel_id() -> ChannelId {
        ChannelId(123456789012345678)
    }

    /// A test role ID.
    pub fn test_role_id() -> RoleId {
        RoleId(41771983423143936)
    }

    /// A test user ID.
    pub fn test_user_id() -> UserId {
        UserId(987654321098765432)
    }

    /// Sequential guild IDs for multi-guild scenarios.
    pub fn test_guild_ids(count: usize) -> Vec<GuildId> {
        (0..count)
            .map(|i| GuildId(100000000000000000 + i as u64))
            .collect()
    }
}

/// Property-based testing strategies.
#[cfg(feature = "proptest")]
pub mod property_testing {
    use crate::GuildId;
    use proptest::prelude::*;

    /// Strategy for generating valid Discord guild IDs.
    pub fn guild_id_strategy() -> impl Strategy<Value = GuildId> {
        (100000000000000000u64..=999999999999999999u64).prop_map(GuildId)
    }

    /// Strategy for transfer amounts in a realistic range.
    pub fn transfer_amount_strategy() -> impl Strategy<Value = u32> {
        1u32..=500u32
    }
}
