//! Deterministic `Environment` implementations.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use shuffle_core::env::Environment;

/// Fixed wall-clock origin for simulations (2024-01-01T00:00:00Z)
pub const SIM_EPOCH_MILLIS: u64 = 1_704_067_200_000;

/// Simulation environment using Turmoil's virtual time.
///
/// `wall_clock_millis()` is a fixed epoch plus the virtual time elapsed since
/// the environment was created, so audit-log timestamps advance with
/// `tokio::time::sleep` and are identical across runs.
///
/// Create it inside the simulation (in a `sim.host` or `sim.client`
/// closure); outside one, elapsed time is real time.
#[derive(Clone, Copy, Debug)]
pub struct SimEnv {
    start: tokio::time::Instant,
    epoch_millis: u64,
}

impl SimEnv {
    /// Environment starting at [`SIM_EPOCH_MILLIS`]
    pub fn new() -> Self {
        Self::starting_at(SIM_EPOCH_MILLIS)
    }

    /// Environment whose clock reads `epoch_millis` now
    pub fn starting_at(epoch_millis: u64) -> Self {
        Self { start: tokio::time::Instant::now(), epoch_millis }
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for SimEnv {
    fn wall_clock_millis(&self) -> u64 {
        let elapsed = u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.epoch_millis.saturating_add(elapsed)
    }
}

/// Hand-cranked clock for unit tests that need exact timestamps.
///
/// Clones share the same clock.
#[derive(Clone, Debug, Default)]
pub struct ManualEnv {
    millis: Arc<AtomicU64>,
}

impl ManualEnv {
    /// Clock reading `millis`
    pub fn at(millis: u64) -> Self {
        Self { millis: Arc::new(AtomicU64::new(millis)) }
    }

    /// Move the clock to `millis`. Going backwards is allowed.
    pub fn set(&self, millis: u64) {
        self.millis.store(millis, Ordering::SeqCst);
    }

    /// Move the clock forward by `millis`
    pub fn advance(&self, millis: u64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Environment for ManualEnv {
    fn wall_clock_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}
