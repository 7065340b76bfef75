//! Connection lifecycle state machine.
//!
//! Pure bookkeeping: no I/O, no clock. The channel calls these transitions
//! as transport callbacks arrive and the driver performs the actual I/O.
//!
//! # State Machine
//!
//! ```text
//! ┌──────────────┐  begin_connect  ┌────────────┐  open  ┌──────┐
//! │ Disconnected │────────────────>│ Connecting │───────>│ Open │
//! └──────────────┘                 └────────────┘        └──────┘
//!        │                               │                   │
//!        │ fail                          │ close / fail      │ close / fail
//!        ↓                               ↓                   ↓
//!   ┌────────┐                      ┌───────────────────────────┐
//!   │ Failed │                      │     Closed  |  Failed     │
//!   └────────┘                      └───────────────────────────┘
//! ```
//!
//! `Closed` and `Failed` are terminal. There is no reconnect: a new
//! connection needs a new channel.

use crate::{config::ServerAddress, error::ConnectionError};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No connection attempted yet
    Disconnected,
    /// Transport connect in progress
    Connecting,
    /// Handshake completed, frames flow
    Open,
    /// Transport closed (terminal)
    Closed,
    /// Transport or address failure (terminal)
    Failed,
}

impl ConnectionState {
    /// True for `Closed` and `Failed`
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }
}

/// Traffic counters for one connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Frames handed to the channel while open
    pub frames_received: u64,
    /// Frames handed to the transport
    pub frames_sent: u64,
    /// Frames that arrived while not open and were discarded
    pub frames_dropped: u64,
    /// Wall-clock time the connection opened
    pub opened_at_millis: Option<u64>,
}

/// Connection state machine
///
/// One per channel. Transitions out of a terminal state are rejected with
/// [`ConnectionError::InvalidState`].
#[derive(Debug, Clone)]
pub struct Connection {
    state: ConnectionState,
    address: Option<ServerAddress>,
    stats: ConnectionStats,
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

impl Connection {
    /// Create a connection in `Disconnected` state
    pub fn new() -> Self {
        Self { state: ConnectionState::Disconnected, address: None, stats: ConnectionStats::default() }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Server this connection targets, once `begin_connect` was called
    #[must_use]
    pub fn address(&self) -> Option<&ServerAddress> {
        self.address.as_ref()
    }

    /// Traffic counters
    #[must_use]
    pub fn stats(&self) -> ConnectionStats {
        self.stats
    }

    /// Transition to `Connecting`.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless `Disconnected`
    pub fn begin_connect(&mut self, address: ServerAddress) -> Result<(), ConnectionError> {
        self.expect(ConnectionState::Disconnected, "connect")?;
        self.state = ConnectionState::Connecting;
        self.address = Some(address);
        Ok(())
    }

    /// Transition to `Open`.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless `Connecting`
    pub fn open(&mut self, now_millis: u64) -> Result<(), ConnectionError> {
        self.expect(ConnectionState::Connecting, "open")?;
        self.state = ConnectionState::Open;
        self.stats.opened_at_millis = Some(now_millis);
        Ok(())
    }

    /// Transition to `Closed`.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless `Connecting` or `Open`
    pub fn close(&mut self) -> Result<(), ConnectionError> {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Open => {
                self.state = ConnectionState::Closed;
                Ok(())
            },
            state => Err(ConnectionError::InvalidState { state, operation: "close" }),
        }
    }

    /// Transition to `Failed`.
    ///
    /// # Errors
    ///
    /// `InvalidState` if already terminal
    pub fn fail(&mut self) -> Result<(), ConnectionError> {
        if self.state.is_terminal() {
            return Err(ConnectionError::InvalidState { state: self.state, operation: "fail" });
        }
        self.state = ConnectionState::Failed;
        Ok(())
    }

    /// Check that `operation` may run now.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless `Open`
    pub fn require_open(&self, operation: &'static str) -> Result<(), ConnectionError> {
        self.expect(ConnectionState::Open, operation)
    }

    /// Count an inbound frame
    pub fn record_received(&mut self) {
        self.stats.frames_received += 1;
    }

    /// Count a frame discarded because the connection was not open
    pub fn record_dropped(&mut self) {
        self.stats.frames_dropped += 1;
    }

    /// Count an outbound frame
    pub fn record_sent(&mut self) {
        self.stats.frames_sent += 1;
    }

    fn expect(
        &self,
        expected: ConnectionState,
        operation: &'static str,
    ) -> Result<(), ConnectionError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(ConnectionError::InvalidState { state: self.state, operation })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> ServerAddress {
        "ws://127.0.0.1:1337".parse().unwrap()
    }

    #[test]
    fn connection_lifecycle() {
        let mut conn = Connection::new();
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(conn.require_open("send").is_err());

        conn.begin_connect(address()).unwrap();
        assert_eq!(conn.state(), ConnectionState::Connecting);
        assert_eq!(conn.address(), Some(&address()));

        conn.open(1_000).unwrap();
        assert_eq!(conn.state(), ConnectionState::Open);
        assert_eq!(conn.stats().opened_at_millis, Some(1_000));
        conn.require_open("send").unwrap();

        conn.close().unwrap();
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(conn.state().is_terminal());
    }

    #[test]
    fn terminal_states_reject_transitions() {
        let mut conn = Connection::new();
        conn.begin_connect(address()).unwrap();
        conn.fail().unwrap();

        assert_eq!(
            conn.close(),
            Err(ConnectionError::InvalidState { state: ConnectionState::Failed, operation: "close" })
        );
        assert!(conn.fail().is_err());
        assert!(conn.open(0).is_err());
        assert!(conn.begin_connect(address()).is_err());
    }

    #[test]
    fn second_connect_is_rejected() {
        let mut conn = Connection::new();
        conn.begin_connect(address()).unwrap();

        assert_eq!(
            conn.begin_connect(address()),
            Err(ConnectionError::InvalidState {
                state: ConnectionState::Connecting,
                operation: "connect",
            })
        );
    }

    #[test]
    fn bad_address_fails_from_disconnected() {
        let mut conn = Connection::new();
        conn.fail().unwrap();
        assert_eq!(conn.state(), ConnectionState::Failed);
        assert_eq!(conn.address(), None);
    }

    #[test]
    fn counters() {
        let mut conn = Connection::new();
        conn.record_received();
        conn.record_received();
        conn.record_sent();
        conn.record_dropped();

        assert_eq!(
            conn.stats(),
            ConnectionStats {
                frames_received: 2,
                frames_sent: 1,
                frames_dropped: 1,
                opened_at_millis: None,
            }
        );
    }
}
