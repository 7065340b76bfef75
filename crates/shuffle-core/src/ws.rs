//! WebSocket transport.
//!
//! One protocol frame per binary WebSocket message. The handshake carries
//! the configured `Origin` header, which coordination servers check.

use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use shuffle_proto::FrameHeader;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async_with_config,
    tungstenite::{
        Message,
        client::IntoClientRequest,
        http::{HeaderValue, header::ORIGIN},
        protocol::WebSocketConfig,
    },
};

use crate::{
    config::{ChannelConfig, DEFAULT_ORIGIN, ServerAddress},
    transport::{FrameSink, FrameSource, Inbound, PEER_CLOSED, Transport},
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Production transport over `ws://` / `wss://`
#[derive(Debug, Clone)]
pub struct WsTransport {
    origin: String,
    max_payload: u32,
}

impl WsTransport {
    /// Transport sending `origin` on the handshake
    pub fn new(origin: impl Into<String>) -> Self {
        Self { origin: origin.into(), max_payload: FrameHeader::MAX_PAYLOAD_SIZE }
    }

    /// Transport configured from a [`ChannelConfig`]
    pub fn from_config(config: &ChannelConfig) -> Self {
        Self { origin: config.origin.clone(), max_payload: config.effective_max_frame_size() }
    }

    /// Largest WebSocket message tungstenite will buffer: header plus payload
    fn max_message_size(&self) -> usize {
        FrameHeader::SIZE + self.max_payload as usize
    }
}

impl Default for WsTransport {
    fn default() -> Self {
        Self::new(DEFAULT_ORIGIN)
    }
}

#[async_trait]
impl Transport for WsTransport {
    type Sink = WsSink;
    type Source = WsSource;

    async fn connect(&self, address: &ServerAddress) -> io::Result<(WsSink, WsSource)> {
        let mut request = address.as_str().into_client_request().map_err(io::Error::other)?;
        let origin = HeaderValue::from_str(&self.origin).map_err(io::Error::other)?;
        request.headers_mut().insert(ORIGIN, origin);

        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(self.max_message_size());
        ws_config.max_frame_size = Some(self.max_message_size());
        let (stream, response) = connect_async_with_config(request, Some(ws_config), false)
            .await
            .map_err(io::Error::other)?;
        tracing::debug!(
            address = %address,
            status = %response.status(),
            "WebSocket handshake complete"
        );

        let (sink, source) = stream.split();
        Ok((WsSink { sink }, WsSource { source }))
    }
}

/// Write half of a WebSocket connection
pub struct WsSink {
    sink: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, frame: Bytes) -> io::Result<()> {
        self.sink.send(Message::Binary(frame.to_vec())).await.map_err(io::Error::other)
    }

    async fn close(&mut self) -> io::Result<()> {
        self.sink.close().await.map_err(io::Error::other)
    }
}

/// Read half of a WebSocket connection
pub struct WsSource {
    source: SplitStream<WsStream>,
}

#[async_trait]
impl FrameSource for WsSource {
    async fn recv(&mut self) -> io::Result<Inbound> {
        loop {
            let message = match self.source.next().await {
                Some(message) => message.map_err(io::Error::other)?,
                None => return Ok(Inbound::Closed { reason: PEER_CLOSED.to_string() }),
            };

            match message {
                Message::Binary(data) => return Ok(Inbound::Frame(Bytes::from(data))),
                // Not a protocol frame; the codec reports it as malformed.
                Message::Text(text) => return Ok(Inbound::Frame(Bytes::from(text.into_bytes()))),
                Message::Close(frame) => {
                    let reason = frame
                        .map(|f| f.reason.into_owned())
                        .filter(|r| !r.is_empty())
                        .unwrap_or_else(|| PEER_CLOSED.to_string());
                    return Ok(Inbound::Closed { reason });
                },
                // Pings are answered by tungstenite on the next write or read.
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {},
            }
        }
    }
}

#[cfg(all(test, feature = "websocket"))]
mod tests {
    use std::net::SocketAddr;

    use tokio::net::TcpListener;
    use tokio_tungstenite::{
        accept_hdr_async,
        tungstenite::{
            handshake::server::{ErrorResponse, Request, Response},
            protocol::{CloseFrame, frame::coding::CloseCode},
        },
    };

    use super::*;

    const ORIGIN_VALUE: &str = "https://shuffle.example";

    async fn listen() -> (TcpListener, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let local = listener.local_addr().unwrap();
        (listener, local)
    }

    fn config_for(local: SocketAddr) -> ChannelConfig {
        ChannelConfig { origin: ORIGIN_VALUE.into(), ..ChannelConfig::new(format!("ws://{local}")) }
    }

    /// Accept one handshake and return the stream plus the `Origin` it carried
    async fn accept(listener: &TcpListener) -> (WebSocketStream<TcpStream>, Option<String>) {
        let (stream, _) = listener.accept().await.unwrap();
        let mut origin = None;
        let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            origin = request
                .headers()
                .get(ORIGIN)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            Ok(response)
        };
        let ws = accept_hdr_async(stream, callback).await.unwrap();
        (ws, origin)
    }

    #[tokio::test]
    async fn handshake_carries_origin_and_close_reason_is_surfaced() {
        let (listener, local) = listen().await;
        let server = tokio::spawn(async move {
            let (mut ws, origin) = accept(&listener).await;

            ws.send(Message::Text("not a frame".into())).await.unwrap();
            ws.close(Some(CloseFrame { code: CloseCode::Normal, reason: "round over".into() }))
                .await
                .unwrap();
            while let Some(Ok(_)) = ws.next().await {}
            origin
        });

        let config = config_for(local);
        let address = config.server_address().unwrap();
        let (sink, mut source) = WsTransport::from_config(&config).connect(&address).await.unwrap();

        // Text is handed up as-is; the codec rejects it as malformed
        assert_eq!(source.recv().await.unwrap(), Inbound::Frame(Bytes::from_static(b"not a frame")));
        assert_eq!(source.recv().await.unwrap(), Inbound::Closed { reason: "round over".into() });

        drop((sink, source));
        assert_eq!(server.await.unwrap().as_deref(), Some(ORIGIN_VALUE));
    }

    #[tokio::test]
    async fn binary_frames_flow_and_bare_close_reports_peer_closed() {
        let (listener, local) = listen().await;
        let server = tokio::spawn(async move {
            let (mut ws, _) = accept(&listener).await;

            let received = match ws.next().await {
                Some(Ok(Message::Binary(data))) => data,
                other => panic!("expected a binary frame, got {other:?}"),
            };
            ws.send(Message::Binary(received.clone())).await.unwrap();
            ws.close(None).await.unwrap();
            while let Some(Ok(_)) = ws.next().await {}
            received
        });

        let config = config_for(local);
        let address = config.server_address().unwrap();
        let (mut sink, mut source) =
            WsTransport::from_config(&config).connect(&address).await.unwrap();

        let frame = Bytes::from_static(b"\x42\xbc frame bytes");
        sink.send(frame.clone()).await.unwrap();

        assert_eq!(source.recv().await.unwrap(), Inbound::Frame(frame.clone()));
        assert_eq!(source.recv().await.unwrap(), Inbound::Closed { reason: PEER_CLOSED.into() });

        drop((sink, source));
        assert_eq!(server.await.unwrap(), frame.to_vec());
    }

    #[test]
    fn message_limit_follows_configured_frame_size() {
        let config = ChannelConfig { max_frame_size: 1024, ..ChannelConfig::new("ws://h:1") };
        let transport = WsTransport::from_config(&config);

        assert_eq!(transport.origin, config.origin);
        assert_eq!(transport.max_message_size(), FrameHeader::SIZE + 1024);
        assert_eq!(
            WsTransport::default().max_message_size(),
            FrameHeader::SIZE + FrameHeader::MAX_PAYLOAD_SIZE as usize
        );
    }
}
