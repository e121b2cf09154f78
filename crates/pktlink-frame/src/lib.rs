//! Marker-synchronized binary framing over a byte stream.
//!
//! Every frame on the wire is laid out as:
//! - a 2-byte marker `A1 95` for stream synchronization
//! - a 2-byte little-endian total length (header + payload + trailer)
//! - a 1-byte message id
//! - the payload
//! - a 1-byte trailer reserved for a checksum
//!
//! [`Framer`] recovers frames from noisy, partially delivered input;
//! [`FrameWriter`] puts them back on the wire.

pub mod checksum;
pub mod codec;
pub mod error;
pub mod framer;
pub mod writer;

pub use checksum::{
    build_table, compute, render_table, Checksum, Crc8, Placeholder, TableStyle, CRC8_POLYNOMIAL,
    PLACEHOLDER_TRAILER,
};
pub use codec::{
    encode_frame, parse_header, Frame, FrameConfig, Header, FRAME_OVERHEAD, HEADER_SIZE, MARKER,
    MAX_FRAME_SIZE, MAX_PAYLOAD, TRAILER_SIZE,
};
pub use error::{FrameError, Malformed, Result};
pub use framer::{Framer, FramerStats, Phase};
pub use writer::FrameWriter;
