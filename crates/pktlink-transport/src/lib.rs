//! Byte-stream transport abstraction.
//!
//! The framing layer only needs three things from a link: read some bytes,
//! write some bytes, and wait (bounded) until a read would not block. This
//! crate provides that contract as the [`Transport`] trait together with the
//! concrete links used by pktlink:
//! - TCP connections ([`TcpLink`] for listening, [`LinkStream`] for streams)
//! - serial device nodes opened as a plain byte stream
//! - an in-memory [`MemoryLink`] for loopback and tests
//!
//! This is the lowest layer of pktlink. Opening and configuring the
//! underlying device is the caller's business.

pub mod error;
pub mod memory;
pub mod tcp;
pub mod traits;

pub use error::{Result, TransportError};
pub use memory::MemoryLink;
pub use tcp::TcpLink;
pub use traits::{LinkStream, Transport};
