//! Deterministic simulation harness for shuffle channel testing.
//!
//! Turmoil-based implementations of the `Environment` and `Transport` traits,
//! a scriptable coordination server, and participant fixtures, so the real
//! driver can be exercised under reproducible network conditions.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod sim_env;
pub mod sim_server;
pub mod sim_transport;

pub use fixtures::{Participant, frame_of, roster_of};
pub use sim_env::{ManualEnv, SimEnv};
pub use sim_server::{ServerConnection, SimServer};
pub use sim_transport::SimTransport;
