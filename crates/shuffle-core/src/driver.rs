//! Async driver for a [`CommChannel`].
//!
//! The driver owns the channel and the transport for the lifetime of one
//! connection. It runs a single task:
//!
//! 1. Validate the configured address and connect the transport
//! 2. Spawn a reader task that forwards inbound frames over a queue
//! 3. Loop over inbound events and [`ChannelHandle`] commands, feeding the
//!    channel one at a time
//!
//! Frames and sends are therefore processed strictly one after another, and
//! every transport write happens on this task (single writer). The reader
//! task only ever moves bytes into the queue, so `select!` never cancels a
//! partially read frame.
//!
//! `run` returns the channel once the connection is over, so the caller can
//! still export its audit log.

use bytes::Bytes;
use ciborium::Value;
use tokio::sync::{mpsc, oneshot};

use crate::{
    audit::DebugDump,
    channel::CommChannel,
    codec::MessageCodec,
    env::Environment,
    error::SendError,
    message::OutboundMessage,
    roster::Roster,
    transport::{FrameSink, FrameSource, Inbound, Transport},
};

/// Reason reported when the client closes the connection itself
pub const LOCAL_CLOSE: &str = "closed by client";

/// Depth of the reader-to-driver queue
const INBOUND_QUEUE: usize = 64;

type Reply<T> = oneshot::Sender<T>;

enum Command {
    Send { message: OutboundMessage, reply: Reply<Result<(), SendError>> },
    SendNamed { name: String, params: Value, reply: Reply<Result<(), SendError>> },
    Export { reply: Reply<DebugDump> },
    Close { reply: Reply<()> },
}

enum ReaderEvent {
    Frame(Bytes),
    Closed(String),
    Failed(String),
}

/// Cloneable handle for talking to a running driver
#[derive(Clone, Debug)]
pub struct ChannelHandle {
    commands: mpsc::Sender<Command>,
}

impl ChannelHandle {
    /// Send a message.
    ///
    /// Resolves once the frame has been handed to the transport. A write
    /// failure after that point surfaces as a `ConnectionError` event, not
    /// here.
    ///
    /// # Errors
    ///
    /// Any [`SendError`] from the channel, or `DriverStopped`.
    pub async fn send(&self, message: OutboundMessage) -> Result<(), SendError> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Send { message, reply }).await?;
        rx.await.map_err(|_| SendError::DriverStopped)?
    }

    /// Send a message named at runtime.
    ///
    /// # Errors
    ///
    /// As [`CommChannel::send_named`], or `DriverStopped`.
    pub async fn send_named(
        &self,
        name: impl Into<String>,
        params: Value,
    ) -> Result<(), SendError> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::SendNamed { name: name.into(), params, reply }).await?;
        rx.await.map_err(|_| SendError::DriverStopped)?
    }

    /// Snapshot the audit log.
    ///
    /// # Errors
    ///
    /// `DriverStopped` once the connection is over; use the channel
    /// returned by [`ChannelDriver::run`] instead.
    pub async fn export(&self) -> Result<DebugDump, SendError> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Export { reply }).await?;
        rx.await.map_err(|_| SendError::DriverStopped)
    }

    /// Close the connection. Terminal.
    ///
    /// # Errors
    ///
    /// `DriverStopped` if the connection is already over.
    pub async fn close(&self) -> Result<(), SendError> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Close { reply }).await?;
        rx.await.map_err(|_| SendError::DriverStopped)
    }

    async fn request(&self, command: Command) -> Result<(), SendError> {
        self.commands.send(command).await.map_err(|_| SendError::DriverStopped)
    }
}

/// Runs one connection of a [`CommChannel`]
pub struct ChannelDriver<T, E, C, R> {
    transport: T,
    channel: CommChannel<E, C, R>,
    commands: mpsc::Receiver<Command>,
}

impl<T, E, C, R> ChannelDriver<T, E, C, R>
where
    T: Transport,
    E: Environment,
    C: MessageCodec,
    R: Roster,
{
    /// Wrap `channel`; the handle queue depth comes from its config.
    pub fn new(transport: T, channel: CommChannel<E, C, R>) -> (Self, ChannelHandle) {
        let (tx, rx) = mpsc::channel(channel.config().command_capacity.max(1));
        (Self { transport, channel, commands: rx }, ChannelHandle { commands: tx })
    }

    /// Channel being driven, for subscribing before `run`
    pub fn channel_mut(&mut self) -> &mut CommChannel<E, C, R> {
        &mut self.channel
    }

    /// Connect and process the connection until it ends.
    pub async fn run(self) -> CommChannel<E, C, R> {
        let Self { transport, mut channel, mut commands } = self;

        let Ok(address) = channel.connect_configured() else {
            return channel;
        };

        let (mut sink, source) = match transport.connect(&address).await {
            Ok(halves) => halves,
            Err(err) => {
                channel.handle_transport_error(Some(&err.to_string()));
                return channel;
            },
        };

        if let Err(err) = channel.handle_open() {
            tracing::error!(error = %err, "Channel refused open");
            return channel;
        }

        let (inbound_tx, mut inbound) = mpsc::channel(INBOUND_QUEUE);
        let reader = tokio::spawn(read_loop(source, inbound_tx));
        let mut accepting_commands = true;

        loop {
            tokio::select! {
                biased;

                event = inbound.recv() => match event {
                    Some(ReaderEvent::Frame(frame)) => {
                        channel.handle_frame(&frame);
                    },
                    Some(ReaderEvent::Closed(reason)) => {
                        channel.handle_close(&reason);
                        break;
                    },
                    Some(ReaderEvent::Failed(detail)) => {
                        channel.handle_transport_error(Some(&detail));
                        break;
                    },
                    None => {
                        channel.handle_transport_error(Some("reader task stopped"));
                        break;
                    },
                },

                command = commands.recv(), if accepting_commands => match command {
                    Some(Command::Send { message, reply }) => {
                        let outcome = channel.send(&message);
                        if !deliver(&mut channel, &mut sink, outcome, reply).await {
                            break;
                        }
                    },
                    Some(Command::SendNamed { name, params, reply }) => {
                        let outcome = channel.send_named(&name, &params);
                        if !deliver(&mut channel, &mut sink, outcome, reply).await {
                            break;
                        }
                    },
                    Some(Command::Export { reply }) => {
                        let _ = reply.send(channel.export());
                    },
                    Some(Command::Close { reply }) => {
                        if let Err(err) = sink.close().await {
                            tracing::debug!(error = %err, "Transport close failed");
                        }
                        channel.handle_close(LOCAL_CLOSE);
                        let _ = reply.send(());
                        break;
                    },
                    None => {
                        tracing::debug!("All channel handles dropped");
                        accepting_commands = false;
                    },
                },
            }
        }

        reader.abort();
        channel
    }
}

/// Write an accepted send and answer the caller. False if the transport
/// failed and the loop must stop.
async fn deliver<E, C, R, S>(
    channel: &mut CommChannel<E, C, R>,
    sink: &mut S,
    outcome: Result<Bytes, SendError>,
    reply: Reply<Result<(), SendError>>,
) -> bool
where
    E: Environment,
    C: MessageCodec,
    R: Roster,
    S: FrameSink,
{
    let frame = match outcome {
        Ok(frame) => frame,
        Err(err) => {
            let _ = reply.send(Err(err));
            return true;
        },
    };

    let written = sink.send(frame).await;
    let _ = reply.send(Ok(()));

    match written {
        Ok(()) => true,
        Err(err) => {
            channel.handle_transport_error(Some(&err.to_string()));
            false
        },
    }
}

async fn read_loop<S: FrameSource>(mut source: S, events: mpsc::Sender<ReaderEvent>) {
    loop {
        let event = match source.recv().await {
            Ok(Inbound::Frame(frame)) => ReaderEvent::Frame(frame),
            Ok(Inbound::Closed { reason }) => ReaderEvent::Closed(reason),
            Err(err) => ReaderEvent::Failed(err.to_string()),
        };
        let last = !matches!(event, ReaderEvent::Frame(_));

        if events.send(event).await.is_err() || last {
            return;
        }
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Send { message, .. } => write!(f, "Send({})", message.message_type()),
            Self::SendNamed { name, .. } => write!(f, "SendNamed({name})"),
            Self::Export { .. } => f.write_str("Export"),
            Self::Close { .. } => f.write_str("Close"),
        }
    }
}
