use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};

use crate::checksum::{Checksum, Placeholder};
use crate::error::{FrameError, Malformed, Result};

/// Frame marker: 0xA1 0x95.
pub const MARKER: [u8; 2] = [0xA1, 0x95];

/// Frame header: marker (2) + length (2) + id (1) = 5 bytes.
pub const HEADER_SIZE: usize = 5;

/// One trailer byte after the payload.
pub const TRAILER_SIZE: usize = 1;

/// Fixed per-frame cost on top of the payload.
pub const FRAME_OVERHEAD: usize = HEADER_SIZE + TRAILER_SIZE;

/// Largest frame the 16-bit length field can describe.
pub const MAX_FRAME_SIZE: usize = u16::MAX as usize;

/// Largest payload that fits in a frame.
pub const MAX_PAYLOAD: usize = MAX_FRAME_SIZE - FRAME_OVERHEAD;

/// Parsed frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Total frame length (header + payload + trailer).
    pub length: u16,
    /// Message id.
    pub id: u8,
}

impl Header {
    /// Payload bytes implied by the declared length.
    pub fn payload_len(&self) -> Option<usize> {
        usize::from(self.length).checked_sub(FRAME_OVERHEAD)
    }
}

/// One complete frame as it appeared on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    id: u8,
    raw: Bytes,
}

impl Frame {
    /// Build a frame for `payload`, computing the trailer with `checksum`.
    pub fn new(id: u8, payload: &[u8], checksum: &dyn Checksum) -> Result<Self> {
        let mut dst = BytesMut::new();
        encode_frame(id, payload, checksum, &mut dst)?;
        Ok(Self {
            id,
            raw: dst.freeze(),
        })
    }

    /// Validate wire bytes as a frame: marker, minimum size, declared length.
    pub fn from_wire(raw: impl Into<Bytes>) -> std::result::Result<Self, Malformed> {
        let raw = raw.into();
        if raw.len() < FRAME_OVERHEAD {
            return Err(Malformed::Truncated(raw.len()));
        }
        let header = parse_header(&raw)?;
        if usize::from(header.length) != raw.len() {
            return Err(Malformed::LengthMismatch {
                declared: usize::from(header.length),
                actual: raw.len(),
            });
        }
        Ok(Self { id: header.id, raw })
    }

    /// Assemble from bytes the framer has already validated.
    pub(crate) fn from_validated(id: u8, raw: Bytes) -> Self {
        Self { id, raw }
    }

    /// The message id.
    pub fn id(&self) -> u8 {
        self.id
    }

    /// Payload bytes between header and trailer.
    pub fn payload(&self) -> &[u8] {
        &self.raw[HEADER_SIZE..self.raw.len() - TRAILER_SIZE]
    }

    /// The trailer byte.
    pub fn trailer(&self) -> u8 {
        self.raw[self.raw.len() - TRAILER_SIZE]
    }

    /// Bytes the trailer is computed over (length field through payload).
    pub fn checked_bytes(&self) -> &[u8] {
        &self.raw[MARKER.len()..self.raw.len() - TRAILER_SIZE]
    }

    /// Whether the trailer matches `checksum` over this frame.
    pub fn verify(&self, checksum: &dyn Checksum) -> std::result::Result<(), Malformed> {
        let expected = checksum.compute(self.checked_bytes());
        if expected != self.trailer() {
            return Err(Malformed::TrailerMismatch {
                expected,
                actual: self.trailer(),
            });
        }
        Ok(())
    }

    /// The complete wire encoding.
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// Consume the frame and return its wire encoding.
    pub fn into_bytes(self) -> Bytes {
        self.raw
    }

    /// The total wire size of this frame.
    pub fn wire_size(&self) -> usize {
        self.raw.len()
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────┬─────────────┬────────┬───────────────┬─────────┐
/// │ Marker   │ Length      │ Id     │ Payload       │ Trailer │
/// │ 0xA1 0x95│ (2B LE)     │ (1B)   │ (Length - 6)  │ (1B)    │
/// └──────────┴─────────────┴────────┴───────────────┴─────────┘
/// ```
///
/// Length counts every byte of the frame, marker and trailer included.
pub fn encode_frame(
    id: u8,
    payload: &[u8],
    checksum: &dyn Checksum,
    dst: &mut BytesMut,
) -> Result<()> {
    if payload.len() > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
        });
    }
    let total = payload.len() + FRAME_OVERHEAD;
    let start = dst.len();

    dst.reserve(total);
    dst.put_slice(&MARKER);
    dst.put_u16_le(total as u16);
    dst.put_u8(id);
    dst.put_slice(payload);

    let trailer = checksum.compute(&dst[start + MARKER.len()..]);
    dst.put_u8(trailer);
    Ok(())
}

/// Parse and check the 5-byte header at the start of `src`.
pub fn parse_header(src: &[u8]) -> std::result::Result<Header, Malformed> {
    if src.len() < HEADER_SIZE {
        return Err(Malformed::Truncated(src.len()));
    }
    if src[0..2] != MARKER {
        return Err(Malformed::BadMarker([src[0], src[1]]));
    }
    Ok(Header {
        length: u16::from_le_bytes([src[2], src[3]]),
        id: src[4],
    })
}

/// Configuration for the framer and writer.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Socket read timeout for a single read once data is signalled ready.
    pub read_timeout: Option<Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<Duration>,
    /// Check inbound trailers against `checksum`. Default: off.
    pub verify_trailer: bool,
    /// Trailer computation. Default: [`Placeholder`].
    pub checksum: Arc<dyn Checksum>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            read_timeout: None,
            write_timeout: None,
            verify_trailer: false,
            checksum: Arc::new(Placeholder),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::{Crc8, PLACEHOLDER_TRAILER};

    #[test]
    fn test_encode_layout() {
        let mut buf = BytesMut::new();
        encode_frame(0x01, &1.5f32.to_le_bytes(), &Placeholder, &mut buf).unwrap();

        assert_eq!(
            buf.as_ref(),
            &[0xA1, 0x95, 0x0A, 0x00, 0x01, 0x00, 0x00, 0xC0, 0x3F, 0xFF]
        );
    }

    #[test]
    fn test_encode_with_crc8_trailer() {
        let mut buf = BytesMut::new();
        encode_frame(0x01, &1.5f32.to_le_bytes(), &Crc8::default(), &mut buf).unwrap();
        assert_eq!(buf[buf.len() - 1], 0x61);
    }

    #[test]
    fn test_encode_appends_to_existing_buffer() {
        let mut buf = BytesMut::from(&b"xx"[..]);
        encode_frame(7, b"ab", &Crc8::default(), &mut buf).unwrap();

        let frame = Frame::from_wire(buf.split_off(2).freeze()).unwrap();
        assert_eq!(frame.id(), 7);
        assert_eq!(frame.payload(), b"ab");
        assert!(frame.verify(&Crc8::default()).is_ok());
    }

    #[test]
    fn test_empty_payload() {
        let frame = Frame::new(3, b"", &Placeholder).unwrap();
        assert_eq!(frame.wire_size(), FRAME_OVERHEAD);
        assert!(frame.payload().is_empty());
        assert_eq!(frame.trailer(), PLACEHOLDER_TRAILER);
    }

    #[test]
    fn test_payload_too_large() {
        let payload = vec![0u8; MAX_PAYLOAD + 1];
        let mut buf = BytesMut::new();
        let result = encode_frame(1, &payload, &Placeholder, &mut buf);
        assert!(matches!(result, Err(FrameError::PayloadTooLarge { .. })));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_largest_payload_fits() {
        let payload = vec![0u8; MAX_PAYLOAD];
        let frame = Frame::new(1, &payload, &Placeholder).unwrap();
        assert_eq!(frame.wire_size(), MAX_FRAME_SIZE);
    }

    #[test]
    fn test_parse_header_rejects_bad_marker() {
        let result = parse_header(&[0xA1, 0x96, 0x06, 0x00, 0x01]);
        assert_eq!(result, Err(Malformed::BadMarker([0xA1, 0x96])));
    }

    #[test]
    fn test_parse_header_truncated() {
        assert_eq!(parse_header(&[0xA1, 0x95]), Err(Malformed::Truncated(2)));
    }

    #[test]
    fn test_from_wire_length_mismatch() {
        let raw = vec![0xA1, 0x95, 0x09, 0x00, 0x01, 0xAA, 0xFF];
        assert_eq!(
            Frame::from_wire(raw),
            Err(Malformed::LengthMismatch {
                declared: 9,
                actual: 7
            })
        );
    }

    #[test]
    fn test_verify_detects_corruption() {
        let frame = Frame::new(2, b"data", &Crc8::default()).unwrap();
        let mut raw = frame.as_bytes().to_vec();
        raw[6] ^= 0x01;

        let corrupted = Frame::from_wire(raw).unwrap();
        assert!(matches!(
            corrupted.verify(&Crc8::default()),
            Err(Malformed::TrailerMismatch { .. })
        ));
    }

    #[test]
    fn test_header_payload_len() {
        let header = Header { length: 10, id: 1 };
        assert_eq!(header.payload_len(), Some(4));
        assert_eq!(Header { length: 3, id: 1 }.payload_len(), None);
    }
}
