use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use pktlink_frame::{FrameConfig, FrameError, FrameWriter, Framer, FramerStats, Malformed};
use pktlink_schema::{Dispatch, Registry, SchemaError};
use pktlink_transport::{LinkStream, Transport};
use tracing::{debug, warn};

use crate::error::{PeerError, Result};

/// Outcome of one [`Connection::process_input`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    /// A frame decoded into the registry's live values for this id.
    Decoded(u8),
    /// A complete frame arrived for an id with no schema.
    UnknownId(u8),
    /// A frame was discarded; the stream stays usable.
    Malformed(Malformed),
    /// Nothing arrived before the timeout.
    Idle,
}

/// One framed link bound to a registry.
///
/// Reading and writing go through separate handles so a worker can receive
/// and publish on the same link.
pub struct Connection<R, W> {
    peer: String,
    framer: Framer<R>,
    writer: FrameWriter<W>,
    registry: Arc<Registry>,
}

impl<R: Transport, W: Write> Connection<R, W> {
    /// Assemble a connection from a read half and a write half.
    pub fn new(
        peer: impl Into<String>,
        reader: R,
        writer: W,
        registry: Arc<Registry>,
        config: FrameConfig,
    ) -> Self {
        Self::from_parts(
            peer.into(),
            Framer::with_config(reader, config.clone()),
            FrameWriter::with_config(writer, config),
            registry,
        )
    }

    pub(crate) fn from_parts(
        peer: String,
        framer: Framer<R>,
        writer: FrameWriter<W>,
        registry: Arc<Registry>,
    ) -> Self {
        Self {
            peer,
            framer,
            writer,
            registry,
        }
    }

    /// Read at most one frame and apply it to the registry.
    ///
    /// Malformed frames and unknown ids are reported as events so the caller
    /// keeps reading. An orderly close is `Err(PeerError::Closed)`.
    pub fn process_input(&mut self, timeout: Option<Duration>) -> Result<InputEvent> {
        let frame = match self.framer.read_frame(timeout) {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(InputEvent::Idle),
            Err(FrameError::Malformed(malformed)) => return Ok(InputEvent::Malformed(malformed)),
            Err(err) => return Err(PeerError::from_frame(err)),
        };

        match self.registry.dispatch(&frame) {
            Ok(Dispatch::Decoded(id)) => {
                debug!(peer = %self.peer, id, "frame decoded");
                Ok(InputEvent::Decoded(id))
            }
            Ok(Dispatch::UnknownId(id)) => Ok(InputEvent::UnknownId(id)),
            Err(SchemaError::Malformed(malformed)) => {
                warn!(peer = %self.peer, error = %malformed, "frame does not match schema");
                Ok(InputEvent::Malformed(malformed))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Pack the live values for `id` and send them.
    pub fn send(&mut self, id: u8) -> Result<()> {
        let bytes = self.registry.pack(id)?;
        self.send_packed(&bytes)
    }

    /// Send an already-encoded frame unchanged.
    pub fn send_packed(&mut self, frame: &[u8]) -> Result<()> {
        self.writer
            .write_raw(frame)
            .map_err(PeerError::from_frame)
    }

    /// Replace the log label.
    pub fn with_peer(mut self, peer: impl Into<String>) -> Self {
        self.peer = peer.into();
        self
    }

    /// Label used in logs.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Framer counters for this connection.
    pub fn stats(&self) -> FramerStats {
        self.framer.stats()
    }

    pub fn framer(&self) -> &Framer<R> {
        &self.framer
    }

    pub fn framer_mut(&mut self) -> &mut Framer<R> {
        &mut self.framer
    }

    pub fn writer(&self) -> &FrameWriter<W> {
        &self.writer
    }

    pub fn writer_mut(&mut self) -> &mut FrameWriter<W> {
        &mut self.writer
    }

    /// Split back into framer and writer.
    pub fn into_parts(self) -> (Framer<R>, FrameWriter<W>) {
        (self.framer, self.writer)
    }
}

impl Connection<LinkStream, LinkStream> {
    /// Wrap a connected link, applying the socket timeouts from `config`.
    pub fn from_link(
        link: LinkStream,
        registry: Arc<Registry>,
        config: FrameConfig,
    ) -> Result<Self> {
        let peer = link
            .peer_addr()
            .map_or_else(|| link.kind().to_string(), |addr| addr.to_string());
        let reader = link.try_clone()?;

        let framer = Framer::with_config_link(reader, config.clone())?;
        let writer = FrameWriter::with_config_link(link, config)?;
        Ok(Self::from_parts(peer, framer, writer, registry))
    }

    /// Close both directions of the link.
    pub fn shutdown(&self) -> Result<()> {
        self.writer.get_ref().shutdown()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pktlink_frame::{Frame, Placeholder};
    use pktlink_schema::{FieldType, MessageSchema, Value};
    use pktlink_transport::MemoryLink;

    use super::*;

    fn registry() -> Arc<Registry> {
        let mut registry = Registry::new();
        registry.register(
            MessageSchema::new(1, "Server Value")
                .with_field("value", FieldType::F32, 0.0f32)
                .unwrap(),
        );
        registry.register(
            MessageSchema::new(2, "Server Value 2")
                .with_field("value_2", FieldType::F32, 0.0f32)
                .unwrap(),
        );
        Arc::new(registry)
    }

    fn frame(id: u8, payload: &[u8]) -> Vec<u8> {
        Frame::new(id, payload, &Placeholder)
            .unwrap()
            .as_bytes()
            .to_vec()
    }

    fn connection(input: Vec<u8>) -> Connection<MemoryLink, Vec<u8>> {
        Connection::new(
            "test",
            MemoryLink::new(input),
            Vec::new(),
            registry(),
            FrameConfig::default(),
        )
    }

    #[test]
    fn decodes_into_registry() {
        let mut conn = connection(frame(1, &7.25f32.to_le_bytes()));

        assert_eq!(conn.process_input(None).unwrap(), InputEvent::Decoded(1));
        assert_eq!(
            conn.registry().get(1, "value").unwrap(),
            Value::F32(7.25)
        );
        assert!(matches!(conn.process_input(None), Err(PeerError::Closed)));
    }

    #[test]
    fn unknown_id_does_not_break_later_frames() {
        let mut input = frame(0x42, b"whatever");
        input.extend(frame(2, &3.5f32.to_le_bytes()));
        let mut conn = connection(input);

        assert_eq!(conn.process_input(None).unwrap(), InputEvent::UnknownId(0x42));
        assert_eq!(conn.process_input(None).unwrap(), InputEvent::Decoded(2));
        assert_eq!(
            conn.registry().get(2, "value_2").unwrap(),
            Value::F32(3.5)
        );
    }

    #[test]
    fn schema_mismatch_is_an_event() {
        let mut input = frame(1, b"too wide");
        input.extend(frame(1, &1.0f32.to_le_bytes()));
        let mut conn = connection(input);

        assert!(matches!(
            conn.process_input(None).unwrap(),
            InputEvent::Malformed(Malformed::PayloadWidth { .. })
        ));
        assert_eq!(conn.process_input(None).unwrap(), InputEvent::Decoded(1));
    }

    #[test]
    fn bad_length_is_an_event() {
        let mut input = vec![0xA1, 0x95, 0x02, 0x00, 0x01];
        input.extend(frame(1, &1.0f32.to_le_bytes()));
        let mut conn = connection(input);

        assert!(matches!(
            conn.process_input(None).unwrap(),
            InputEvent::Malformed(Malformed::LengthTooShort(2))
        ));
        assert_eq!(conn.process_input(None).unwrap(), InputEvent::Decoded(1));
        assert_eq!(conn.stats().malformed, 1);
    }

    #[test]
    fn idle_when_nothing_arrives() {
        let mut conn = Connection::new(
            "idle",
            MemoryLink::held_open(b""),
            Vec::new(),
            registry(),
            FrameConfig::default(),
        );
        assert_eq!(
            conn.process_input(Some(Duration::ZERO)).unwrap(),
            InputEvent::Idle
        );
    }

    #[test]
    fn send_writes_live_values() {
        let mut conn = connection(Vec::new());
        conn.registry().set(1, "value", 1.5f32).unwrap();
        conn.send(1).unwrap();

        assert_eq!(
            conn.writer().get_ref().as_slice(),
            &[0xA1, 0x95, 0x0A, 0x00, 0x01, 0x00, 0x00, 0xC0, 0x3F, 0xFF]
        );
        assert!(matches!(
            conn.send(9),
            Err(PeerError::Schema(SchemaError::UnknownMessageId(9)))
        ));
    }

    #[test]
    fn send_packed_is_verbatim() {
        let mut conn = connection(Vec::new());
        conn.send_packed(b"\xA1\x95\x06\x00\x07\xFF").unwrap();
        let (_, writer) = conn.into_parts();
        assert_eq!(writer.into_inner(), b"\xA1\x95\x06\x00\x07\xFF".to_vec());
    }

    #[test]
    fn tcp_connections_exchange_values() {
        let listener = pktlink_transport::TcpLink::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr();

        let server_registry = registry();
        let server = {
            let server_registry = Arc::clone(&server_registry);
            std::thread::spawn(move || {
                let link = listener.accept().unwrap();
                let mut conn =
                    Connection::from_link(link, server_registry, FrameConfig::default()).unwrap();
                conn.process_input(Some(Duration::from_secs(5))).unwrap()
            })
        };

        let client_registry = registry();
        client_registry.set(2, "value_2", 11.0f32).unwrap();
        let link = pktlink_transport::TcpLink::connect(addr).unwrap();
        let mut client =
            Connection::from_link(link, client_registry, FrameConfig::default()).unwrap();
        client.send(2).unwrap();

        assert_eq!(server.join().unwrap(), InputEvent::Decoded(2));
        assert_eq!(
            server_registry.get(2, "value_2").unwrap(),
            Value::F32(11.0)
        );
        client.shutdown().unwrap();
    }
}
