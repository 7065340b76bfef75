//! Snapshot tests for wire format stability.
//!
//! If the frame layout or the CBOR shape of packets changes, these fail,
//! so an incompatible change with deployed coordination servers cannot slip
//! through unnoticed.

use insta::assert_snapshot;
use shuffle_proto::{
    Frame, FrameHeader, Packet, PacketBody, Packets, Phase, SessionId, SignedPacket,
    VerificationKey,
};

fn frame_to_hex(frame: &Frame) -> String {
    hex::encode(frame.to_bytes().expect("encoding should succeed"))
}

#[test]
fn snapshot_frame_header() {
    assert_snapshot!(hex::encode(FrameHeader::new(5).to_bytes()), @"42bcc32e228c644400000005");
}

#[test]
fn snapshot_unsigned_registration() {
    let packet = Packet {
        session: SessionId::new(vec![0xab; 4]),
        number: 0,
        from_key: VerificationKey::from_bytes([0x07; 32]),
        to_key: None,
        phase: Phase::None,
        body: PacketBody::Registration { version: 1, amount: 100_000 },
    };

    let frame = Packets::new(vec![SignedPacket::unsigned(packet)])
        .to_frame()
        .expect("frame creation should succeed");

    assert_snapshot!(frame_to_hex(&frame), @"42bcc32e228c6444000000bea1677061636b65747381a2667061636b6574a66773657373696f6e686162616261626162666e756d626572006866726f6d5f6b657978403037303730373037303730373037303730373037303730373037303730373037303730373037303730373037303730373037303730373037303730373037303766746f5f6b6579f6657068617365646e6f6e6564626f6479a16c726567697374726174696f6ea26776657273696f6e0166616d6f756e741a000186a0697369676e6174757265f6");
}
