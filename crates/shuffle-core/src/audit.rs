//! Append-only audit trail of inbound and outbound messages.
//!
//! Entries are bucketed by [`MessageType`]. Each bucket is kept
//! most-recent-first by sorted insertion: a new entry goes before every
//! entry with an older or equal timestamp, so among equal timestamps the
//! later insertion comes first. The same rule applies whether or not the
//! bucket already exists.
//!
//! The log is write-mostly. Nothing in the channel reads it to make a
//! decision; it exists to be exported as a [`DebugDump`] after a failure.

use std::{
    collections::{BTreeMap, BTreeSet},
    io,
};

use serde::{Deserialize, Serialize};
use shuffle_proto::{MessageType, Packets};

use crate::{
    error::ExportError,
    message::{ClassifiedMessage, EncodedMessage, MessageSummary},
    roster::RoundSnapshot,
};

/// Message content captured by a log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadSnapshot {
    /// Full decoded packets, signatures included
    pub unpacked: Packets,
    /// Signature-free summary
    pub components: MessageSummary,
}

/// One audit-log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Bucket key
    pub message_type: MessageType,
    /// Wall-clock time of the send or receive
    pub timestamp_millis: u64,
    /// What was sent or received
    pub payload: PayloadSnapshot,
}

type Buckets = BTreeMap<MessageType, Vec<LogEntry>>;

/// Inbox and outbox of a channel
#[derive(Debug, Clone, Default)]
pub struct AuditLog {
    inbox: Buckets,
    outbox: Buckets,
    sent: BTreeSet<MessageType>,
}

impl AuditLog {
    /// Empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a received message.
    pub fn record_inbound(&mut self, message: &ClassifiedMessage, now_millis: u64) {
        insert(
            &mut self.inbox,
            LogEntry {
                message_type: message.message_type(),
                timestamp_millis: now_millis,
                payload: PayloadSnapshot {
                    unpacked: message.full().clone(),
                    components: message.summary().clone(),
                },
            },
        );
    }

    /// Record a message about to be written to the transport.
    pub fn record_outbound(&mut self, message: &EncodedMessage, now_millis: u64) {
        self.sent.insert(message.message_type);
        insert(
            &mut self.outbox,
            LogEntry {
                message_type: message.message_type,
                timestamp_millis: now_millis,
                payload: PayloadSnapshot {
                    unpacked: message.unpacked.clone(),
                    components: message.components.clone(),
                },
            },
        );
    }

    /// Received entries of `message_type`, most recent first
    pub fn inbox(&self, message_type: MessageType) -> &[LogEntry] {
        self.inbox.get(&message_type).map_or(&[], Vec::as_slice)
    }

    /// Sent entries of `message_type`, most recent first
    pub fn outbox(&self, message_type: MessageType) -> &[LogEntry] {
        self.outbox.get(&message_type).map_or(&[], Vec::as_slice)
    }

    /// True once a message of `message_type` has been sent
    pub fn has_sent(&self, message_type: MessageType) -> bool {
        self.sent.contains(&message_type)
    }

    /// Total received entries
    pub fn inbox_len(&self) -> usize {
        self.inbox.values().map(Vec::len).sum()
    }

    /// Total sent entries
    pub fn outbox_len(&self) -> usize {
        self.outbox.values().map(Vec::len).sum()
    }

    /// Self-contained snapshot for post-mortem debugging
    pub fn export(&self, session: RoundSnapshot) -> DebugDump {
        DebugDump {
            session,
            inbox: self.inbox.clone(),
            outbox: self.outbox.clone(),
            sent: self.sent.clone(),
        }
    }
}

fn insert(buckets: &mut Buckets, entry: LogEntry) {
    let bucket = buckets.entry(entry.message_type).or_default();
    let at = bucket.partition_point(|e| e.timestamp_millis > entry.timestamp_millis);
    bucket.insert(at, entry);
}

/// Exported audit log plus the round context it was taken in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugDump {
    /// Round snapshot supplied by the caller
    pub session: RoundSnapshot,
    /// Received messages by type, most recent first
    pub inbox: BTreeMap<MessageType, Vec<LogEntry>>,
    /// Sent messages by type, most recent first
    pub outbox: BTreeMap<MessageType, Vec<LogEntry>>,
    /// Message types ever sent
    pub sent: BTreeSet<MessageType>,
}

impl DebugDump {
    /// Pretty-printed JSON
    pub fn to_json(&self) -> Result<String, ExportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write pretty-printed JSON to `writer`.
    pub fn write_json(&self, mut writer: impl io::Write) -> Result<(), ExportError> {
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    /// Compact CBOR
    pub fn to_cbor(&self) -> Result<Vec<u8>, ExportError> {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(self, &mut buf).map_err(|e| ExportError::Cbor(e.to_string()))?;
        Ok(buf)
    }
}
