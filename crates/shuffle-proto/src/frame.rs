//! Frame header and frame type.
//!
//! Layout on the wire:
//! `[magic: 8 bytes][payload_size: u32 BE][payload: payload_size bytes]`
//!
//! Message-oriented transports (WebSocket) carry exactly one frame per
//! message. Stream transports read the fixed header first to learn how many
//! payload bytes follow.

use bytes::{BufMut, Bytes, BytesMut};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::errors::{ProtocolError, Result};

/// Fixed 12-byte frame header (Big Endian)
///
/// Fields are raw byte arrays so the struct has alignment 1 and every bit
/// pattern is a valid value; validation happens in [`FrameHeader::from_bytes`].
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct FrameHeader {
    magic: [u8; 8],
    payload_size: [u8; 4],
}

impl FrameHeader {
    /// Header size in bytes
    pub const SIZE: usize = 12;

    /// Protocol magic prefixing every frame
    pub const MAGIC: [u8; 8] = [0x42, 0xbc, 0xc3, 0x2e, 0x22, 0x8c, 0x64, 0x44];

    /// Maximum payload size (16 MiB)
    pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

    /// Create a header announcing `payload_size` bytes.
    pub fn new(payload_size: u32) -> Self {
        Self { magic: Self::MAGIC, payload_size: payload_size.to_be_bytes() }
    }

    /// Parse and validate a header from the start of `bytes`.
    ///
    /// Trailing bytes after the header are ignored.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::FrameTooShort`] if fewer than [`Self::SIZE`] bytes
    /// - [`ProtocolError::InvalidMagic`] if the magic does not match
    /// - [`ProtocolError::PayloadTooLarge`] if the announced size exceeds
    ///   [`Self::MAX_PAYLOAD_SIZE`]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::SIZE {
            return Err(ProtocolError::FrameTooShort { expected: Self::SIZE, actual: bytes.len() });
        }

        let header = Self::read_from_bytes(&bytes[..Self::SIZE]).map_err(|_| {
            ProtocolError::FrameTooShort { expected: Self::SIZE, actual: bytes.len() }
        })?;

        if header.magic != Self::MAGIC {
            return Err(ProtocolError::InvalidMagic);
        }

        if header.payload_size() > Self::MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: header.payload_size() as usize,
                max: Self::MAX_PAYLOAD_SIZE as usize,
            });
        }

        Ok(header)
    }

    /// Payload length announced by this header
    pub fn payload_size(&self) -> u32 {
        u32::from_be_bytes(self.payload_size)
    }

    /// Raw header bytes
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out.copy_from_slice(self.as_bytes());
        out
    }
}

impl std::fmt::Debug for FrameHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameHeader")
            .field("magic", &hex::encode(self.magic))
            .field("payload_size", &self.payload_size())
            .finish()
    }
}

/// Complete protocol frame
///
/// Holds the raw (CBOR-encoded) payload. The header is derived from the
/// payload length, so a `Frame` can never disagree with its own header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Raw payload bytes
    pub payload: Bytes,
}

impl Frame {
    /// Wrap an already-encoded payload.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self { payload: payload.into() }
    }

    /// Header matching this frame's payload
    #[allow(clippy::cast_possible_truncation)]
    pub fn header(&self) -> FrameHeader {
        FrameHeader::new(self.payload.len() as u32)
    }

    /// Write `[header][payload]` into `dst`.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::PayloadTooLarge`] if the payload exceeds
    /// [`FrameHeader::MAX_PAYLOAD_SIZE`].
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        if self.payload.len() > FrameHeader::MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::PayloadTooLarge {
                size: self.payload.len(),
                max: FrameHeader::MAX_PAYLOAD_SIZE as usize,
            });
        }

        dst.put_slice(&self.header().to_bytes());
        dst.put_slice(&self.payload);
        Ok(())
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(FrameHeader::SIZE + self.payload.len());
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Decode exactly one frame from `src`.
    ///
    /// # Errors
    ///
    /// Any header error, plus [`ProtocolError::FrameTruncated`] when fewer
    /// payload bytes are present than announced and
    /// [`ProtocolError::PayloadSizeMismatch`] when more are present.
    pub fn decode(src: &[u8]) -> Result<Self> {
        let header = FrameHeader::from_bytes(src)?;
        let expected = header.payload_size() as usize;
        let body = &src[FrameHeader::SIZE..];

        if body.len() < expected {
            return Err(ProtocolError::FrameTruncated { expected, actual: body.len() });
        }
        if body.len() > expected {
            return Err(ProtocolError::PayloadSizeMismatch { header: expected, actual: body.len() });
        }

        Ok(Self::new(Bytes::copy_from_slice(body)))
    }
}
