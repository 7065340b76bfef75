//! Scriptable coordination server for simulations.
//!
//! Tests drive the server side by hand: accept a client, push frames at it
//! (well-formed or not), and inspect what the client sent back.

use std::io;

use bytes::Bytes;
use shuffle_core::transport::{FrameSink, FrameSource, FramedSink, FramedSource, Inbound, framed};
use shuffle_proto::{Frame, FrameHeader, Packets};
use tokio::io::{ReadHalf, WriteHalf};
use turmoil::net::{TcpListener, TcpStream};

/// Listening coordination server
pub struct SimServer {
    listener: TcpListener,
}

impl SimServer {
    /// Bind to `address` (e.g. `"0.0.0.0:443"`).
    ///
    /// # Errors
    ///
    /// Returns error if the address is in use or invalid.
    pub async fn bind(address: &str) -> io::Result<Self> {
        let listener = TcpListener::bind(address).await?;
        Ok(Self { listener })
    }

    /// Wait for the next client.
    pub async fn accept(&self) -> io::Result<ServerConnection> {
        let (stream, peer) = self.listener.accept().await?;
        tracing::debug!(peer = %peer, "Accepted simulated client");

        let (sink, source) = framed(stream, FrameHeader::MAX_PAYLOAD_SIZE);
        Ok(ServerConnection { sink, source })
    }
}

/// Server side of one accepted client
pub struct ServerConnection {
    sink: FramedSink<WriteHalf<TcpStream>>,
    source: FramedSource<ReadHalf<TcpStream>>,
}

impl ServerConnection {
    /// Send a bundle of packets as one frame.
    pub async fn send_packets(&mut self, packets: &Packets) -> io::Result<()> {
        let frame = packets
            .to_frame()
            .and_then(|f| f.to_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        self.sink.send(frame).await
    }

    /// Send `payload` in a valid frame header, whatever it contains.
    pub async fn send_payload(&mut self, payload: impl Into<Bytes>) -> io::Result<()> {
        let frame = Frame::new(payload)
            .to_bytes()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        self.sink.send(frame).await
    }

    /// Write raw bytes with no framing at all.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.sink.send(Bytes::copy_from_slice(bytes)).await
    }

    /// Next bundle from the client, or `None` once it closed.
    ///
    /// # Errors
    ///
    /// I/O failure, or a frame whose payload is not a packet bundle.
    pub async fn recv_packets(&mut self) -> io::Result<Option<Packets>> {
        match self.source.recv().await? {
            Inbound::Frame(bytes) => {
                let packets = Frame::decode(&bytes)
                    .and_then(|frame| Packets::from_frame(&frame))
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                Ok(Some(packets))
            },
            Inbound::Closed { .. } => Ok(None),
        }
    }

    /// Close the connection from the server side.
    pub async fn close(mut self) -> io::Result<()> {
        self.sink.close().await
    }
}
