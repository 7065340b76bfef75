//! Shuffle client communication channel.
//!
//! The channel keeps one connection to a coordination server, classifies
//! every inbound frame, verifies each signed sub-packet against the round's
//! roster, and keeps a time-ordered audit trail of everything sent and
//! received.
//!
//! # Architecture
//!
//! [`CommChannel`] is a Sans-IO state machine. It never touches a socket:
//! transport callbacks (`handle_open`, `handle_frame`, `handle_close`,
//! `handle_transport_error`) are fed in by a driver, and
//! [`CommChannel::send`] hands encoded bytes back for the driver to write.
//! Consumers observe the channel through the synchronous
//! [`EventDispatcher`].
//!
//! [`ChannelDriver`] is the production driver. It owns the transport, runs
//! frame processing and outbound writes on a single task, and exposes a
//! cloneable [`ChannelHandle`] for callers on other tasks.
//!
//! # Components
//!
//! - [`audit`]: Append-only inbox/outbox log and debug dumps
//! - [`verifier`]: Per-sub-packet signature verdicts
//! - [`codec`]: Codec boundary and the CBOR reference codec
//! - [`connection`]: Connection lifecycle state machine
//! - [`dispatch`]: Typed event publish/subscribe
//! - [`channel`]: The channel itself, including the outbound send path
//! - [`driver`]: Async runtime for a channel
//! - [`transport`]: Transport abstraction and length-prefixed streams
//! - [`mod@env`]: Wall-clock abstraction
//! - `ws`: WebSocket transport (feature `websocket`)

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod audit;
pub mod channel;
pub mod codec;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod driver;
pub mod env;
pub mod error;
pub mod event;
pub mod message;
pub mod roster;
pub mod transport;
pub mod verifier;

#[cfg(feature = "websocket")]
pub mod ws;

pub use audit::{AuditLog, DebugDump, LogEntry, PayloadSnapshot};
pub use channel::CommChannel;
pub use codec::{CborCodec, MessageCodec};
pub use config::{ChannelConfig, ServerAddress};
pub use connection::{Connection, ConnectionState, ConnectionStats};
pub use dispatch::{EventDispatcher, SubscriptionId};
pub use driver::{ChannelDriver, ChannelHandle};
pub use env::{Environment, SystemEnv};
pub use error::{ConfigError, ConnectionError, DecodeError, EncodeError, ExportError, SendError};
pub use event::{ChannelEvent, ConnectionErrorKind, Culprit, EventKind, ViolationKind};
pub use message::{
    BlameParams, BroadcastParams, ClassifiedMessage, EncodedMessage, EncryptionKeyParams,
    EquivocationCheckParams, MessageSummary, OutboundMessage, RegistrationParams, ShuffleParams,
    SignaturesParams,
};
pub use roster::{Player, Roster, RoundSnapshot, StaticRoster};
pub use transport::{FrameSink, FrameSource, FramedSink, FramedSource, Inbound, Transport, framed};
pub use verifier::{Verdict, check_sub_packet};
#[cfg(feature = "websocket")]
pub use ws::{WsSink, WsSource, WsTransport};
