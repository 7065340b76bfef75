//! Environment abstraction for deterministic testing.
//!
//! The channel stamps every audit-log entry with wall-clock milliseconds.
//! Reading the clock goes through [`Environment`] so simulations can use
//! virtual time and tests can pin timestamps exactly.
//!
//! Implementations:
//!
//! 1. [`SystemEnv`] (here): the real system clock
//! 2. `SimEnv` / `ManualEnv` (shuffle-harness): Turmoil virtual time and a
//!    hand-advanced clock
//!
//! # Invariants
//!
//! - Isolation: implementations must not share global state
//! - Timestamps need not be monotonic; the audit log orders entries itself

use std::time::{SystemTime, UNIX_EPOCH};

/// Source of wall-clock time for the channel.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Milliseconds since the Unix epoch.
    fn wall_clock_millis(&self) -> u64;
}

/// Production environment backed by [`SystemTime`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl Environment for SystemEnv {
    fn wall_clock_millis(&self) -> u64 {
        // A clock set before 1970 stamps entries at zero rather than failing
        // the data path.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_past_2020() {
        // 2020-01-01T00:00:00Z
        assert!(SystemEnv.wall_clock_millis() > 1_577_836_800_000);
    }
}
