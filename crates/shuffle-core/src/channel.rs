//! The communication channel.
//!
//! [`CommChannel`] ties the pieces together: it owns the [`Connection`]
//! state machine, the [`AuditLog`] and the [`EventDispatcher`], borrows the
//! round's [`Roster`] for signature checks and delegates every byte of
//! parsing to a [`MessageCodec`].
//!
//! It performs no I/O. Transport callbacks are fed in through the
//! `handle_*` methods and outbound bytes are returned from [`send`] for the
//! caller to write. Each callback runs to completion, including event
//! dispatch, before it returns, which is what keeps frame processing
//! sequential.
//!
//! # Inbound
//!
//! ```text
//! bytes ─> decode_and_classify ─┬─> Err ─> ConnectionError(MalformedMessage)
//!                               └─> Ok  ─> record_inbound
//!                                          └─> per sub-packet:
//!                                              Unsigned | Verified ─> ServerMessage
//!                                              Rejected            ─> ProtocolViolation
//! ```
//!
//! # Outbound
//!
//! Kind resolution, then the `Open` check, then encoding, then the outbox
//! entry. Any failure before the outbox entry leaves the log and the
//! transport untouched.
//!
//! [`send`]: CommChannel::send

use bytes::Bytes;
use ciborium::Value;

use crate::{
    audit::{AuditLog, DebugDump},
    codec::MessageCodec,
    config::{ChannelConfig, ServerAddress},
    connection::{Connection, ConnectionState},
    dispatch::EventDispatcher,
    env::Environment,
    error::{ConnectionError, SendError},
    event::{ChannelEvent, ConnectionErrorKind, ViolationKind},
    message::OutboundMessage,
    roster::Roster,
    verifier::{Verdict, check_sub_packet},
};

/// Detail reported when a transport error carries no message
pub const UNKNOWN_TRANSPORT_ERROR: &str = "unknown error";

/// Client-side channel to a coordination server
pub struct CommChannel<E, C, R> {
    config: ChannelConfig,
    env: E,
    codec: C,
    roster: R,
    connection: Connection,
    audit: AuditLog,
    events: EventDispatcher,
}

impl<E, C, R> CommChannel<E, C, R>
where
    E: Environment,
    C: MessageCodec,
    R: Roster,
{
    /// Create a disconnected channel
    pub fn new(config: ChannelConfig, env: E, codec: C, roster: R) -> Self {
        Self {
            config,
            env,
            codec,
            roster,
            connection: Connection::new(),
            audit: AuditLog::new(),
            events: EventDispatcher::new(),
        }
    }

    /// Subscription surface
    pub fn events_mut(&mut self) -> &mut EventDispatcher {
        &mut self.events
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Connection state machine, for address and counters
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Audit trail so far
    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    /// Roster the channel verifies against
    pub fn roster(&self) -> &R {
        &self.roster
    }

    /// Codec in use
    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Configuration the channel was built with
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Validate `server_uri` and move to `Connecting`.
    ///
    /// The caller (normally the driver) performs the transport connect with
    /// the returned address and reports back through `handle_open` or
    /// `handle_transport_error`.
    ///
    /// A missing or malformed address emits
    /// `ConnectionError(BadAddress)` and fails the channel; no transport
    /// connection may be attempted.
    ///
    /// # Errors
    ///
    /// - `InvalidState` if this channel already connected once
    /// - `BadAddress` if the address does not validate
    pub fn connect(&mut self, server_uri: &str) -> Result<ServerAddress, ConnectionError> {
        if self.connection.state() != ConnectionState::Disconnected {
            return Err(ConnectionError::InvalidState {
                state: self.connection.state(),
                operation: "connect",
            });
        }

        let address = match server_uri.parse::<ServerAddress>() {
            Ok(address) => address,
            Err(err) => {
                tracing::warn!(uri = server_uri, error = %err, "Rejected server address");
                self.connection.fail()?;
                self.events.publish(&ChannelEvent::ConnectionError {
                    kind: ConnectionErrorKind::BadAddress,
                    detail: err.to_string(),
                });
                return Err(err.into());
            },
        };

        self.connection.begin_connect(address.clone())?;
        tracing::info!(address = %address, "Connecting to coordination server");
        Ok(address)
    }

    /// [`connect`](Self::connect) to the configured `server_uri`.
    ///
    /// # Errors
    ///
    /// As `connect`; a missing `server_uri` is a bad address.
    pub fn connect_configured(&mut self) -> Result<ServerAddress, ConnectionError> {
        let uri = self.config.server_uri.clone().unwrap_or_default();
        self.connect(&uri)
    }

    /// Transport handshake completed.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless `Connecting`
    pub fn handle_open(&mut self) -> Result<(), ConnectionError> {
        self.connection.open(self.env.wall_clock_millis())?;

        let Some(address) = self.connection.address().cloned() else {
            return Err(ConnectionError::InvalidState {
                state: self.connection.state(),
                operation: "open",
            });
        };

        tracing::info!(address = %address, "Connected to coordination server");
        self.events.publish(&ChannelEvent::Connected { address });
        Ok(())
    }

    /// One frame arrived.
    ///
    /// Dropped unless the connection is open; drops are logged at `warn`
    /// and counted in [`ConnectionStats::frames_dropped`](crate::connection::ConnectionStats).
    /// Returns the number of outcome events published (one per sub-packet,
    /// or one `MalformedMessage`).
    pub fn handle_frame(&mut self, frame: &[u8]) -> usize {
        if self.connection.state() != ConnectionState::Open {
            self.connection.record_dropped();
            tracing::warn!(
                state = ?self.connection.state(),
                len = frame.len(),
                "Dropping frame received while not open"
            );
            return 0;
        }
        self.connection.record_received();

        let message = match self.codec.decode_and_classify(frame) {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!(len = frame.len(), error = %err, "Malformed frame");
                self.events.publish(&ChannelEvent::ConnectionError {
                    kind: ConnectionErrorKind::MalformedMessage,
                    detail: err.to_string(),
                });
                return 1;
            },
        };

        self.audit.record_inbound(&message, self.env.wall_clock_millis());

        tracing::debug!(
            message_type = %message.message_type(),
            sub_packets = message.sub_packets().len(),
            "Received message"
        );

        let mut emitted = 0;
        for sub_packet in message.sub_packets() {
            let event = match check_sub_packet(&self.codec, &self.roster, sub_packet) {
                Verdict::Unsigned | Verdict::Verified(_) => {
                    ChannelEvent::ServerMessage { summary: message.summary().clone() }
                },
                Verdict::Rejected(culprit) => {
                    tracing::warn!(
                        message_type = %message.message_type(),
                        culprit = %culprit.key(),
                        "Bad signature on sub-packet"
                    );
                    ChannelEvent::ProtocolViolation {
                        kind: ViolationKind::BadSignature,
                        culprit,
                        message: message.summary().clone(),
                    }
                },
            };
            self.events.publish(&event);
            emitted += 1;
        }
        emitted
    }

    /// Transport closed.
    ///
    /// Emits `Disconnected` once; later calls after the connection is
    /// terminal are ignored.
    pub fn handle_close(&mut self, reason: &str) {
        if let Err(err) = self.connection.close() {
            tracing::debug!(reason, error = %err, "Ignoring close on finished connection");
            return;
        }

        tracing::info!(reason, "Disconnected from coordination server");
        self.events.publish(&ChannelEvent::Disconnected { reason: reason.to_string() });
    }

    /// Transport failed (connect, read or write).
    ///
    /// Emits `ConnectionError(TransportError)` once and fails the channel.
    pub fn handle_transport_error(&mut self, detail: Option<&str>) {
        let detail = detail.filter(|d| !d.is_empty()).unwrap_or(UNKNOWN_TRANSPORT_ERROR);

        if let Err(err) = self.connection.fail() {
            tracing::debug!(detail, error = %err, "Ignoring transport error on finished connection");
            return;
        }

        tracing::error!(detail, "Transport error");
        self.events.publish(&ChannelEvent::ConnectionError {
            kind: ConnectionErrorKind::TransportError,
            detail: detail.to_string(),
        });
    }

    /// Encode `message`, record it and return the frame to write.
    ///
    /// The outbox entry exists before the bytes are returned, so it
    /// survives a write that fails later.
    ///
    /// # Errors
    ///
    /// - `InvalidState` unless `Open`
    /// - `Encode` if the codec rejects the message
    pub fn send(&mut self, message: &OutboundMessage) -> Result<Bytes, SendError> {
        self.connection.require_open("send")?;

        let encoded = self.codec.encode(message).map_err(|err| {
            tracing::warn!(message_type = %message.message_type(), error = %err, "Encode failed");
            err
        })?;

        self.audit.record_outbound(&encoded, self.env.wall_clock_millis());
        self.connection.record_sent();

        tracing::debug!(
            message_type = %encoded.message_type,
            len = encoded.packed.len(),
            "Sending message"
        );
        Ok(encoded.packed)
    }

    /// [`send`](Self::send) a message named at runtime.
    ///
    /// # Errors
    ///
    /// - `UnknownMessageType` before anything else
    /// - then as `send`, with `InvalidParams` for parameters that do not fit
    ///   the named kind
    pub fn send_named(&mut self, name: &str, params: &Value) -> Result<Bytes, SendError> {
        OutboundMessage::sendable_type(name)?;
        self.connection.require_open("send")?;

        let message = OutboundMessage::from_named(name, params)?;
        self.send(&message)
    }

    /// Debug dump of the audit log with the round's current snapshot
    pub fn export(&self) -> DebugDump {
        self.audit.export(self.roster.snapshot())
    }
}

impl<E, C, R> std::fmt::Debug for CommChannel<E, C, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommChannel")
            .field("state", &self.connection.state())
            .field("address", &self.connection.address())
            .field("inbox", &self.audit.inbox_len())
            .field("outbox", &self.audit.outbox_len())
            .finish_non_exhaustive()
    }
}
