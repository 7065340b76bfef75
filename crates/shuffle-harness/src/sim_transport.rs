//! Turmoil-based `Transport` implementation using TCP streams.

use std::io;

use async_trait::async_trait;
use shuffle_core::{
    config::{ChannelConfig, ServerAddress},
    transport::{FramedSink, FramedSource, Transport, framed},
};
use shuffle_proto::FrameHeader;
use tokio::io::{ReadHalf, WriteHalf};
use turmoil::net::TcpStream;

/// Simulation transport over Turmoil's deterministic TCP streams.
///
/// Production clients speak WebSocket, which delimits frames for us. Over a
/// raw stream the frame header's length does the delimiting instead, so the
/// channel above sees identical whole frames either way.
///
/// The `ws://host:port` address is dialed as `host:port` inside the
/// simulation; the scheme is ignored.
#[derive(Clone, Copy, Debug)]
pub struct SimTransport {
    max_payload: u32,
}

impl SimTransport {
    /// Transport accepting frames up to the protocol maximum
    pub fn new() -> Self {
        Self::with_max_payload(FrameHeader::MAX_PAYLOAD_SIZE)
    }

    /// Transport applying `config`'s frame size limit
    pub fn from_config(config: &ChannelConfig) -> Self {
        Self::with_max_payload(config.effective_max_frame_size())
    }

    /// Transport rejecting inbound payloads above `max_payload` bytes
    pub fn with_max_payload(max_payload: u32) -> Self {
        Self { max_payload }
    }
}

impl Default for SimTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for SimTransport {
    type Sink = FramedSink<WriteHalf<TcpStream>>;
    type Source = FramedSource<ReadHalf<TcpStream>>;

    async fn connect(&self, address: &ServerAddress) -> io::Result<(Self::Sink, Self::Source)> {
        let authority = address.authority();
        let stream = TcpStream::connect(authority.as_str()).await?;
        tracing::debug!(address = %authority, "Simulated connection established");

        Ok(framed(stream, self.max_payload))
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use shuffle_core::transport::{FrameSink, FrameSource, Inbound};
    use shuffle_proto::Frame;
    use turmoil::net::TcpListener;

    use super::*;

    #[test]
    fn frames_cross_the_simulated_network() {
        let mut sim = turmoil::Builder::new().build();

        sim.host("server", || async {
            let listener = TcpListener::bind("0.0.0.0:443").await?;
            let (stream, _) = listener.accept().await?;
            let (mut sink, mut source) = framed(stream, FrameHeader::MAX_PAYLOAD_SIZE);

            // Echo one frame back
            if let Inbound::Frame(frame) = source.recv().await? {
                sink.send(frame).await?;
            }

            Ok(())
        });

        sim.client("client", async {
            let address: ServerAddress = "ws://server:443".parse()?;
            let (mut sink, mut source) = SimTransport::new().connect(&address).await?;

            let frame: Bytes = Frame::new(b"ping".to_vec()).to_bytes()?;
            sink.send(frame.clone()).await?;

            assert_eq!(source.recv().await?, Inbound::Frame(frame));

            Ok(())
        });

        sim.run().expect("simulation failed");
    }
}
