//! Connection lifecycle integration tests.
//!
//! Runs the real channel driver against a scripted coordination server over
//! the simulated network:
//! - Connect, receive, send, peer close
//! - Local close
//! - Audit log ordering under virtual time

use std::time::Duration;

use shuffle_core::{
    CborCodec, ChannelConfig, ChannelDriver, ChannelEvent, ChannelHandle, CommChannel,
    ConnectionState, OutboundMessage, RegistrationParams, StaticRoster,
    driver::LOCAL_CLOSE, transport::PEER_CLOSED,
};
use shuffle_harness::{Participant, SimEnv, SimServer, SimTransport, roster_of};
use shuffle_proto::{MessageType, PacketBody, Packets};
use tokio::{sync::mpsc::UnboundedReceiver, task::JoinHandle};

type Channel = CommChannel<SimEnv, CborCodec, StaticRoster>;

/// Helper to convert any error to Box<dyn Error>
fn to_box_err<E: std::error::Error + 'static>(e: E) -> Box<dyn std::error::Error> {
    Box::new(e)
}

/// Everyone the client knows about
fn peers() -> Vec<Participant> {
    vec![Participant::new(1), Participant::new(2)]
}

/// Start a driver for the client, connected to `server:443`
fn start_client() -> (JoinHandle<Channel>, ChannelHandle, UnboundedReceiver<ChannelEvent>) {
    let me = Participant::new(9);
    let config = ChannelConfig::new("ws://server:443");
    let transport = SimTransport::from_config(&config);
    let codec = CborCodec::from_config(me.signing_key().clone(), &config);
    let channel = CommChannel::new(config, SimEnv::new(), codec, roster_of(&peers()));

    let (mut driver, handle) = ChannelDriver::new(transport, channel);
    let events = driver.channel_mut().events_mut().subscribe_channel(&[]);
    (tokio::spawn(driver.run()), handle, events)
}

async fn next_event(events: &mut UnboundedReceiver<ChannelEvent>) -> ChannelEvent {
    events.recv().await.unwrap_or_else(|| panic!("event queue closed"))
}

#[test]
fn connect_exchange_and_peer_close() {
    let mut sim = turmoil::Builder::new().build();

    // Server: announce, wait for the client's registration, hang up
    sim.host("server", || async {
        let server = SimServer::bind("0.0.0.0:443").await?;
        let mut conn = server.accept().await?;

        let alice = Participant::new(1);
        conn.send_packets(&Packets::new(vec![alice.announcement().map_err(to_box_err)?])).await?;

        let Some(received) = conn.recv_packets().await? else {
            return Err("client closed before registering".into());
        };
        assert_eq!(received.packets.len(), 1);
        assert!(received.packets[0].signature.is_none());
        assert_eq!(
            received.packets[0].packet.body,
            PacketBody::Registration { version: 1, amount: 100_000 }
        );

        conn.close().await?;
        Ok(())
    });

    // Client: drive the channel through its whole life
    sim.client("client", async {
        let (task, handle, mut events) = start_client();

        match next_event(&mut events).await {
            ChannelEvent::Connected { address } => assert_eq!(address.authority(), "server:443"),
            other => panic!("expected Connected, got {other:?}"),
        }

        match next_event(&mut events).await {
            ChannelEvent::ServerMessage { summary } => {
                assert_eq!(summary.message_type, MessageType::Announcement);
                assert_eq!(summary.packets[0].number, 1);
            },
            other => panic!("expected ServerMessage, got {other:?}"),
        }

        let registration =
            OutboundMessage::Registration(RegistrationParams { version: 1, amount: 100_000 });
        handle.send(registration).await.map_err(to_box_err)?;

        assert_eq!(
            next_event(&mut events).await,
            ChannelEvent::Disconnected { reason: PEER_CLOSED.to_string() }
        );

        let channel = task.await?;
        assert_eq!(channel.state(), ConnectionState::Closed);
        assert_eq!(channel.audit_log().inbox(MessageType::Announcement).len(), 1);
        assert!(channel.audit_log().has_sent(MessageType::Registration));

        Ok(())
    });

    sim.run().expect("simulation failed");
}

#[test]
fn local_close_is_seen_by_server() {
    let mut sim = turmoil::Builder::new().build();

    sim.host("server", || async {
        let server = SimServer::bind("0.0.0.0:443").await?;
        let mut conn = server.accept().await?;

        assert!(conn.recv_packets().await?.is_none(), "expected a clean close");
        Ok(())
    });

    sim.client("client", async {
        let (task, handle, mut events) = start_client();

        assert!(matches!(next_event(&mut events).await, ChannelEvent::Connected { .. }));
        handle.close().await.map_err(to_box_err)?;

        assert_eq!(
            next_event(&mut events).await,
            ChannelEvent::Disconnected { reason: LOCAL_CLOSE.to_string() }
        );
        assert_eq!(task.await?.state(), ConnectionState::Closed);

        // The driver is gone; further commands fail fast
        assert!(handle.export().await.is_err());

        Ok(())
    });

    sim.run().expect("simulation failed");
}

#[test]
fn audit_log_orders_by_virtual_time() {
    let mut sim = turmoil::Builder::new().build();

    sim.host("server", || async {
        let server = SimServer::bind("0.0.0.0:443").await?;
        let mut conn = server.accept().await?;

        for peer in peers() {
            conn.send_packets(&Packets::new(vec![peer.announcement().map_err(to_box_err)?])).await?;
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        conn.close().await?;
        Ok(())
    });

    sim.client("client", async {
        let (task, _handle, mut events) = start_client();

        while !matches!(next_event(&mut events).await, ChannelEvent::Disconnected { .. }) {}

        let dump = task.await?.export();
        let announcements = &dump.inbox[&MessageType::Announcement];
        assert_eq!(announcements.len(), 2);

        // Most recent first, roughly a second apart
        let gap = announcements[0].timestamp_millis - announcements[1].timestamp_millis;
        assert!(gap >= 1_000, "announcements only {gap}ms apart");
        assert_eq!(announcements[0].payload.components.packets[0].number, 2);

        let json = dump.to_json().map_err(to_box_err)?;
        assert!(json.contains("announcement"));

        Ok(())
    });

    sim.run().expect("simulation failed");
}
