//! Marker-framed binary messages between telemetry endpoints.
//!
//! Each endpoint keeps a registry of fixed-layout message schemas and the
//! latest values received for each; frames are re-synchronized from noisy
//! byte streams and decoded into that registry.
//!
//! # Crate Structure
//!
//! - [`transport`]: byte-stream links (TCP, serial device nodes, in-memory)
//! - [`frame`]: wire format, trailer checksums, the stream framer and writer
//! - [`schema`]: message schemas, field codecs, and the registry
//! - [`peer`]: connections, status publishing, and the TCP server (behind `peer` feature)

/// Re-export transport types.
pub mod transport {
    pub use pktlink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use pktlink_frame::*;
}

/// Re-export schema types.
pub mod schema {
    pub use pktlink_schema::*;
}

/// Re-export peer types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use pktlink_peer::*;
}
