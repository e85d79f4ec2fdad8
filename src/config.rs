//! Session tuning knobs loaded from environment variables.
//!
//! Every value is optional; unset or unparseable variables fall back to the
//! defaults in [`crate::consts`].

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use std::time::Duration;

use crate::consts::{
    DEFAULT_BATCH_INTERVAL_MS, DEFAULT_COMMAND_QUEUE_CAPACITY, DEFAULT_MAX_UNDO_SETS, DEFAULT_PING_LIFETIME_MS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// How often the driver batches unqueued actions into an update.
    pub batch_interval: Duration,
    /// How long a ping lives before it is swept.
    pub ping_lifetime: Duration,
    /// Maximum sealed undo sets kept.
    pub max_undo_sets: usize,
    /// Bounded channel capacity for driver commands.
    pub command_queue_capacity: usize,
}

impl SessionConfig {
    /// Build config from environment variables.
    ///
    /// Optional:
    /// - `BOARDSYNC_BATCH_INTERVAL_MS`: default 50
    /// - `BOARDSYNC_PING_LIFETIME_MS`: default 3000
    /// - `BOARDSYNC_MAX_UNDO_SETS`: default 100
    /// - `BOARDSYNC_COMMAND_QUEUE_CAPACITY`: default 64
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            batch_interval: Duration::from_millis(
                env_parse("BOARDSYNC_BATCH_INTERVAL_MS", DEFAULT_BATCH_INTERVAL_MS).max(1),
            ),
            ping_lifetime: Duration::from_millis(env_parse("BOARDSYNC_PING_LIFETIME_MS", DEFAULT_PING_LIFETIME_MS)),
            max_undo_sets: env_parse("BOARDSYNC_MAX_UNDO_SETS", DEFAULT_MAX_UNDO_SETS),
            command_queue_capacity: env_parse("BOARDSYNC_COMMAND_QUEUE_CAPACITY", DEFAULT_COMMAND_QUEUE_CAPACITY)
                .max(1),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            batch_interval: Duration::from_millis(DEFAULT_BATCH_INTERVAL_MS),
            ping_lifetime: Duration::from_millis(DEFAULT_PING_LIFETIME_MS),
            max_undo_sets: DEFAULT_MAX_UNDO_SETS,
            command_queue_capacity: DEFAULT_COMMAND_QUEUE_CAPACITY,
        }
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key).map_or(default, |raw| raw.trim().parse::<T>().unwrap_or(default))
}
