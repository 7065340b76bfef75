//! Transport abstraction for frame I/O.
//!
//! The channel exchanges whole frames with the coordination server. A
//! [`Transport`] establishes the connection and hands back two halves: a
//! [`FrameSink`] owned by the driver's writer path and a [`FrameSource`]
//! owned by its reader task.
//!
//! # Implementations
//!
//! - **`WsTransport`** (feature `websocket`): one frame per binary WebSocket
//!   message
//! - **[`FramedSink`] / [`FramedSource`]**: frames over any byte stream,
//!   delimited by the length in the frame header. Used by `SimTransport`
//!   (Turmoil TCP) and by in-memory duplex tests.
//!
//! # Errors
//!
//! Every failure is an `io::Error`. The driver turns it into a
//! `ConnectionError(TransportError)` event; a clean end of stream is
//! [`Inbound::Closed`] instead.

use std::io;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use shuffle_proto::FrameHeader;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};

use crate::config::ServerAddress;

/// Reason reported when a stream ends at a frame boundary
pub const PEER_CLOSED: &str = "connection closed by peer";

/// What a [`FrameSource`] produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// One complete frame, header included
    Frame(Bytes),
    /// Peer closed the connection cleanly
    Closed {
        /// Close reason, as reported by the transport
        reason: String,
    },
}

/// Connects to a coordination server.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Write half
    type Sink: FrameSink;
    /// Read half
    type Source: FrameSource;

    /// Connect to `address` and complete the transport handshake.
    ///
    /// # Errors
    ///
    /// Returns `std::io::Error` if the server is unreachable, refuses the
    /// connection or fails the handshake.
    async fn connect(&self, address: &ServerAddress) -> io::Result<(Self::Sink, Self::Source)>;
}

/// Write half of a connection.
#[async_trait]
pub trait FrameSink: Send + 'static {
    /// Write one complete frame.
    async fn send(&mut self, frame: Bytes) -> io::Result<()>;

    /// Close the connection from our side.
    async fn close(&mut self) -> io::Result<()>;
}

/// Read half of a connection.
#[async_trait]
pub trait FrameSource: Send + 'static {
    /// Wait for the next frame or a clean close.
    async fn recv(&mut self) -> io::Result<Inbound>;
}

/// [`FrameSink`] over a byte stream
#[derive(Debug)]
pub struct FramedSink<W> {
    writer: W,
}

impl<W> FramedSink<W> {
    /// Wrap a writer
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

#[async_trait]
impl<W> FrameSink for FramedSink<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&mut self, frame: Bytes) -> io::Result<()> {
        self.writer.write_all(&frame).await?;
        self.writer.flush().await
    }

    async fn close(&mut self) -> io::Result<()> {
        self.writer.shutdown().await
    }
}

/// [`FrameSource`] over a byte stream
///
/// Reads the fixed header, validates it, then reads exactly the announced
/// payload. A bad header desynchronizes the stream, so it is an
/// `InvalidData` error rather than a skippable frame.
#[derive(Debug)]
pub struct FramedSource<R> {
    reader: R,
    max_payload: u32,
}

impl<R> FramedSource<R> {
    /// Wrap a reader, accepting payloads up to `max_payload` bytes
    pub fn new(reader: R, max_payload: u32) -> Self {
        Self { reader, max_payload: max_payload.min(FrameHeader::MAX_PAYLOAD_SIZE) }
    }
}

#[async_trait]
impl<R> FrameSource for FramedSource<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    async fn recv(&mut self) -> io::Result<Inbound> {
        let mut header = [0u8; FrameHeader::SIZE];
        let mut filled = 0;
        while filled < header.len() {
            let n = self.reader.read(&mut header[filled..]).await?;
            if n == 0 {
                if filled == 0 {
                    return Ok(Inbound::Closed { reason: PEER_CLOSED.to_string() });
                }
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("stream ended {filled} bytes into a frame header"),
                ));
            }
            filled += n;
        }

        let parsed = FrameHeader::from_bytes(&header)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let size = parsed.payload_size();
        if size > self.max_payload {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("frame payload of {size} bytes exceeds limit of {}", self.max_payload),
            ));
        }

        let mut frame = BytesMut::with_capacity(FrameHeader::SIZE + size as usize);
        frame.extend_from_slice(&header);
        frame.resize(FrameHeader::SIZE + size as usize, 0);
        self.reader.read_exact(&mut frame[FrameHeader::SIZE..]).await?;

        Ok(Inbound::Frame(frame.freeze()))
    }
}

/// Split a byte stream into framed halves.
pub fn framed<S>(
    stream: S,
    max_payload: u32,
) -> (FramedSink<WriteHalf<S>>, FramedSource<ReadHalf<S>>)
where
    S: AsyncRead + AsyncWrite,
{
    let (reader, writer) = tokio::io::split(stream);
    (FramedSink::new(writer), FramedSource::new(reader, max_payload))
}

#[cfg(test)]
mod tests {
    use shuffle_proto::Frame;

    use super::*;

    fn frame(payload: &[u8]) -> Bytes {
        Frame::new(payload.to_vec()).to_bytes().unwrap()
    }

    #[tokio::test]
    async fn frames_cross_a_stream_intact() {
        let (client, server) = tokio::io::duplex(4096);
        let (mut sink, _) = framed(client, FrameHeader::MAX_PAYLOAD_SIZE);
        let (_, mut source) = framed(server, FrameHeader::MAX_PAYLOAD_SIZE);

        sink.send(frame(b"first")).await.unwrap();
        sink.send(frame(b"")).await.unwrap();
        sink.send(frame(&[7; 200])).await.unwrap();

        assert_eq!(source.recv().await.unwrap(), Inbound::Frame(frame(b"first")));
        assert_eq!(source.recv().await.unwrap(), Inbound::Frame(frame(b"")));
        assert_eq!(source.recv().await.unwrap(), Inbound::Frame(frame(&[7; 200])));
    }

    #[tokio::test]
    async fn clean_eof_is_a_close() {
        let (client, server) = tokio::io::duplex(64);
        let (mut sink, _) = framed(client, 1024);
        let mut source = FramedSource::new(server, 1024);

        sink.close().await.unwrap();

        assert_eq!(
            source.recv().await.unwrap(),
            Inbound::Closed { reason: PEER_CLOSED.to_string() }
        );
    }

    #[tokio::test]
    async fn eof_inside_a_header_is_an_error() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut source = FramedSource::new(server, 1024);

        client.write_all(&FrameHeader::MAGIC[..5]).await.unwrap();
        drop(client);

        let err = source.recv().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn bad_magic_is_invalid_data() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut source = FramedSource::new(server, 1024);

        client.write_all(b"GET / HTTP/1.1\r\n").await.unwrap();

        let err = source.recv().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn oversized_announcement_is_rejected_before_reading() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut source = FramedSource::new(server, 16);

        client.write_all(&FrameHeader::new(17).to_bytes()).await.unwrap();

        let err = source.recv().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
