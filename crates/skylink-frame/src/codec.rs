use bytes::{BufMut, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: type (1) + id (1) + seq (1) + total size (4 LE) = 7 bytes.
pub const HEADER_SIZE: usize = 7;

/// Frame kinds defined by the upper protocol engine.
///
/// The codec itself carries the type as an opaque byte; this enum exists
/// for upper-layer convenience.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    Uninitialized = 0,
    Ack = 1,
    Data = 2,
    LowLatencyData = 3,
    DataWithAck = 4,
}

impl From<FrameType> for u8 {
    fn from(ty: FrameType) -> u8 {
        ty as u8
    }
}

impl TryFrom<u8> for FrameType {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, u8> {
        match value {
            0 => Ok(FrameType::Uninitialized),
            1 => Ok(FrameType::Ack),
            2 => Ok(FrameType::Data),
            3 => Ok(FrameType::LowLatencyData),
            4 => Ok(FrameType::DataWithAck),
            other => Err(other),
        }
    }
}

/// Decoded frame header. The size field is not carried here; it is implied
/// by the payload length on both the encode and decode paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Frame kind, opaque at this level (see [`FrameType`]).
    pub ty: u8,
    /// Channel id (see [`crate::channel`]).
    pub id: u8,
    /// Per-channel sequence number, wrapping at 256.
    pub seq: u8,
}

impl FrameHeader {
    pub fn new(ty: FrameType, id: u8, seq: u8) -> Self {
        Self { ty: ty.into(), id, seq }
    }
}

/// One frame decoded out of a datagram. The payload borrows the datagram
/// buffer and is only valid while that buffer is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    pub header: FrameHeader,
    pub payload: &'a [u8],
}

impl Frame<'_> {
    /// Total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Serialize a header into its 7-byte wire form.
///
/// `total_size` is the full frame length including the header itself.
pub fn encode_header(header: &FrameHeader, total_size: u32, dst: &mut [u8; HEADER_SIZE]) {
    dst[0] = header.ty;
    dst[1] = header.id;
    dst[2] = header.seq;
    dst[3..HEADER_SIZE].copy_from_slice(&total_size.to_le_bytes());
}

/// Encode a complete frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────┬─────────┬──────────┬──────────────┬───────────────────┐
/// │ Type (1) │ Id (1)  │ Seq (1)  │ Size (4 LE)  │ Payload            │
/// │          │         │          │ incl. header │ (Size - 7 bytes)   │
/// └──────────┴─────────┴──────────┴──────────────┴───────────────────┘
/// ```
pub fn encode_frame(header: &FrameHeader, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let total = HEADER_SIZE + payload.len();
    let size = u32::try_from(total).map_err(|_| FrameError::FrameTooLarge {
        size: total,
        max: u32::MAX,
    })?;

    let mut hdr = [0u8; HEADER_SIZE];
    encode_header(header, size, &mut hdr);

    dst.reserve(total);
    dst.put_slice(&hdr);
    dst.put_slice(payload);
    Ok(())
}

/// Iterate over the frames concatenated in one datagram.
///
/// Frames are yielded in wire order. Decoding stops at the first malformed
/// residue, which is reported once as an error; frames already yielded
/// remain valid. An empty datagram yields nothing.
pub fn frames(datagram: &[u8]) -> FrameIter<'_> {
    FrameIter {
        buf: datagram,
        offset: 0,
        failed: false,
    }
}

/// Iterator over concatenated frames in a datagram buffer.
pub struct FrameIter<'a> {
    buf: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> FrameIter<'a> {
    /// Current decode position within the datagram. Equals the datagram
    /// length after a fully successful iteration.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl<'a> Iterator for FrameIter<'a> {
    type Item = Result<Frame<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.buf.len() {
            return None;
        }

        let remaining = self.buf.len() - self.offset;
        if remaining < HEADER_SIZE {
            self.failed = true;
            return Some(Err(FrameError::PartialHeader { remaining }));
        }

        let at = self.offset;
        let header = FrameHeader {
            ty: self.buf[at],
            id: self.buf[at + 1],
            seq: self.buf[at + 2],
        };
        let size = u32::from_le_bytes([
            self.buf[at + 3],
            self.buf[at + 4],
            self.buf[at + 5],
            self.buf[at + 6],
        ]);

        if (size as usize) < HEADER_SIZE || size as usize > remaining {
            self.failed = true;
            return Some(Err(FrameError::BadFrame {
                size,
                available: remaining,
            }));
        }

        let payload = &self.buf[at + HEADER_SIZE..at + size as usize];
        self.offset = at + size as usize;
        Some(Ok(Frame { header, payload }))
    }
}
