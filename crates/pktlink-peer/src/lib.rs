//! Connections, per-peer workers, and the TCP server built on the framer.
//!
//! A [`Connection`] binds one link to a shared [`Registry`](pktlink_schema::Registry):
//! inbound frames update its live values and `send` publishes them. A
//! [`Worker`] drives a connection and publishes subscribed status ids on an
//! interval; [`Server`] runs one worker thread per accepted peer.

pub mod config;
pub mod connection;
pub mod connector;
pub mod error;
pub mod publisher;
pub mod server;
pub mod worker;

pub use config::PeerConfig;
pub use connection::{Connection, InputEvent};
pub use connector::{connect, connect_with_config};
pub use error::{PeerError, Result};
pub use publisher::{StatusPublisher, Subscriptions};
pub use server::{Server, ShutdownHandle};
pub use worker::{Worker, WorkerEnd, WorkerSummary};
