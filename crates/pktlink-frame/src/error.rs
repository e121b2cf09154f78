use crate::codec::{FRAME_OVERHEAD, MAX_PAYLOAD};

/// Ways a frame can fail validation.
///
/// All of these are recoverable: the offending frame is dropped and the
/// stream resynchronizes on the next marker.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Malformed {
    /// The first two bytes are not the frame marker.
    #[error("bad marker {0:02x?} (expected [a1, 95])")]
    BadMarker([u8; 2]),

    /// The frame carries a different id than the schema decoding it.
    #[error("frame id {actual:#04x} does not match schema id {expected:#04x}")]
    IdMismatch { expected: u8, actual: u8 },

    /// The header length disagrees with the number of bytes in the frame.
    #[error("header declares {declared} bytes but frame holds {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    /// The header length cannot even hold the fixed frame overhead.
    #[error("declared length {0} is below the {min}-byte frame overhead", min = FRAME_OVERHEAD)]
    LengthTooShort(u16),

    /// The payload width differs from the schema's fixed width.
    #[error("payload is {actual} bytes, schema expects {expected}")]
    PayloadWidth { expected: usize, actual: usize },

    /// Trailer verification is enabled and the trailer is wrong.
    #[error("trailer {actual:#04x} does not match checksum {expected:#04x}")]
    TrailerMismatch { expected: u8, actual: u8 },

    /// Fewer bytes than a header plus trailer.
    #[error("frame is {0} bytes, shorter than the {min}-byte overhead", min = FRAME_OVERHEAD)]
    Truncated(usize),
}

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A frame failed validation and was discarded.
    #[error("malformed frame: {0}")]
    Malformed(#[from] Malformed),

    /// The payload does not fit the 16-bit length field.
    #[error("payload too large ({size} bytes, max {max})", max = MAX_PAYLOAD)]
    PayloadTooLarge { size: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the stream (zero-byte read or write).
    #[error("transport closed")]
    TransportClosed,
}

impl FrameError {
    /// True for errors after which the stream stays usable.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FrameError::Malformed(_) | FrameError::PayloadTooLarge { .. })
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;

pub(crate) fn transport_to_frame_error(err: pktlink_transport::TransportError) -> FrameError {
    use pktlink_transport::TransportError;

    match err {
        TransportError::Io(io) | TransportError::Accept(io) | TransportError::NoLocalAddr(io) => {
            FrameError::Io(io)
        }
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::OpenDevice { source, .. } => FrameError::Io(source),
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}
