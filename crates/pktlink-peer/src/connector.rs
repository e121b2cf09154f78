use std::net::ToSocketAddrs;
use std::sync::Arc;

use pktlink_frame::FrameConfig;
use pktlink_schema::Registry;
use pktlink_transport::{LinkStream, TcpLink};

use crate::connection::Connection;
use crate::error::Result;

/// Connect to a listening server as a client.
pub fn connect(
    addr: impl ToSocketAddrs,
    registry: Arc<Registry>,
) -> Result<Connection<LinkStream, LinkStream>> {
    connect_with_config(addr, registry, FrameConfig::default())
}

/// Connect with explicit framing configuration.
pub fn connect_with_config(
    addr: impl ToSocketAddrs,
    registry: Arc<Registry>,
    config: FrameConfig,
) -> Result<Connection<LinkStream, LinkStream>> {
    let link = TcpLink::connect(addr)?;
    Connection::from_link(link, registry, config)
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use pktlink_frame::{Checksum, Crc8};
    use pktlink_schema::{FieldType, MessageSchema, Value};
    use pktlink_transport::TransportError;

    use super::*;
    use crate::connection::InputEvent;
    use crate::error::PeerError;

    fn registry_with(checksum: Arc<dyn Checksum>) -> Arc<Registry> {
        let mut registry = Registry::with_checksum(checksum);
        registry.register(
            MessageSchema::new(1, "Server Value")
                .with_field("value", FieldType::F32, 0.0f32)
                .unwrap(),
        );
        Arc::new(registry)
    }

    #[test]
    fn connect_refused() {
        let listener = TcpLink::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr();
        drop(listener);

        let err = connect(addr, registry_with(Arc::new(Crc8::default())))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            PeerError::Transport(TransportError::Connect { .. })
        ));
    }

    #[test]
    fn crc_trailers_verified_end_to_end() {
        let listener = TcpLink::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr();
        let config = FrameConfig {
            verify_trailer: true,
            checksum: Arc::new(Crc8::default()),
            ..FrameConfig::default()
        };

        let server_registry = registry_with(Arc::new(Crc8::default()));
        let server = {
            let config = config.clone();
            thread::spawn(move || {
                let link = listener.accept().unwrap();
                let mut conn = Connection::from_link(link, server_registry, config).unwrap();
                let event = conn.process_input(Some(Duration::from_secs(5))).unwrap();
                (event, conn.registry().get(1, "value").unwrap())
            })
        };

        let client_registry = registry_with(Arc::new(Crc8::default()));
        let mut client = connect_with_config(addr, client_registry, config).unwrap();
        client.registry().set(1, "value", 1.5f32).unwrap();
        client.send(1).unwrap();

        let (event, value) = server.join().unwrap();
        assert_eq!(event, InputEvent::Decoded(1));
        assert_eq!(value, Value::F32(1.5));
    }
}
