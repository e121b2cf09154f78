use std::io::ErrorKind;
use std::time::{Duration, Instant};

use bytes::{Buf, BytesMut};
use pktlink_transport::{LinkStream, Transport};
use tracing::{debug, warn};

use crate::codec::{Frame, FrameConfig, FRAME_OVERHEAD, HEADER_SIZE, MARKER};
use crate::error::{transport_to_frame_error, FrameError, Malformed, Result};

const INITIAL_BUFFER_CAPACITY: usize = 4 * 1024;
const READ_CHUNK_SIZE: usize = 4 * 1024;

/// Where the framer is within the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Scanning for the marker.
    SeekStart,
    /// Collecting the two length bytes.
    ReadLength,
    /// Waiting for the id byte.
    ReadId,
    /// Collecting payload and trailer.
    ReadPayload,
}

#[derive(Debug, Clone, Copy)]
enum State {
    SeekStart { matched: usize },
    ReadLength { got: usize },
    ReadId,
    ReadPayload { remaining: usize },
}

/// Running counters for a [`Framer`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FramerStats {
    /// Frames handed to the caller.
    pub frames: u64,
    /// Bytes skipped while searching for a marker.
    pub noise_bytes: u64,
    /// Frames discarded as malformed.
    pub malformed: u64,
    /// Every byte taken off the read buffer.
    pub bytes_consumed: u64,
}

/// Recovers frames from a noisy byte stream.
///
/// Bytes are pulled from the transport in chunks and fed through a small
/// state machine: seek the marker, read the length, read the id, then drain
/// the declared payload and trailer. Reads may deliver any number of bytes;
/// state carries over between calls, so a frame split across reads (or
/// across timeouts) is reassembled without loss.
pub struct Framer<T> {
    inner: T,
    buf: BytesMut,
    frame: BytesMut,
    state: State,
    length: u16,
    skipped: u64,
    closed: bool,
    config: FrameConfig,
    stats: FramerStats,
}

impl<T: Transport> Framer<T> {
    /// Create a new framer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new framer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            frame: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            state: State::SeekStart { matched: 0 },
            length: 0,
            skipped: 0,
            closed: false,
            config,
            stats: FramerStats::default(),
        }
    }

    /// Read the next complete frame.
    ///
    /// Returns `Ok(None)` when `timeout` elapses without a complete frame; a
    /// partially received frame is kept and finished by a later call.
    /// `Some(Duration::ZERO)` only consumes what is already available and
    /// `None` blocks until a frame arrives or the link closes.
    ///
    /// Returns `Err(FrameError::TransportClosed)` on an orderly close, and
    /// `Err(FrameError::Malformed)` for a discarded frame. The stream stays
    /// usable after a malformed frame.
    pub fn read_frame(&mut self, timeout: Option<Duration>) -> Result<Option<Frame>> {
        let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));

        loop {
            if let Some(frame) = self.advance()? {
                return Ok(Some(frame));
            }
            if self.closed {
                return Err(FrameError::TransportClosed);
            }

            let wait = match (timeout, deadline) {
                (Some(_), Some(deadline)) => {
                    Some(deadline.saturating_duration_since(Instant::now()))
                }
                _ => None,
            };
            if !self.fill(wait)? {
                return Ok(None);
            }
        }
    }

    /// Current phase of the state machine.
    pub fn phase(&self) -> Phase {
        match self.state {
            State::SeekStart { .. } => Phase::SeekStart,
            State::ReadLength { .. } => Phase::ReadLength,
            State::ReadId => Phase::ReadId,
            State::ReadPayload { .. } => Phase::ReadPayload,
        }
    }

    /// Counters since construction.
    pub fn stats(&self) -> FramerStats {
        self.stats
    }

    /// Bytes read from the transport but not yet consumed.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Whether the transport has reported an orderly close.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Borrow the underlying transport.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying transport.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the framer and return the inner transport.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current framer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    /// Wait for the transport and append one chunk to the buffer.
    ///
    /// Returns `false` when no data arrived in time.
    fn fill(&mut self, timeout: Option<Duration>) -> Result<bool> {
        match self.inner.wait_readable(timeout) {
            Ok(true) => {}
            Ok(false) => return Ok(false),
            Err(err) if err.kind() == ErrorKind::Interrupted => return Ok(true),
            Err(err) => return Err(FrameError::Io(err)),
        }

        let mut chunk = [0u8; READ_CHUNK_SIZE];
        match self.inner.read(&mut chunk) {
            Ok(0) => {
                self.closed = true;
                if !matches!(self.state, State::SeekStart { matched: 0 }) {
                    debug!(phase = ?self.phase(), "transport closed mid-frame");
                }
                Err(FrameError::TransportClosed)
            }
            Ok(n) => {
                self.buf.extend_from_slice(&chunk[..n]);
                Ok(true)
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => Ok(true),
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                Ok(false)
            }
            Err(err) => Err(FrameError::Io(err)),
        }
    }

    /// Run buffered bytes through the state machine until a frame completes
    /// or the buffer is empty.
    fn advance(&mut self) -> Result<Option<Frame>> {
        while !self.buf.is_empty() {
            match self.state {
                State::SeekStart { matched } => {
                    let byte = self.take_byte();
                    if byte == MARKER[matched] {
                        if matched + 1 == MARKER.len() {
                            self.begin_frame();
                        } else {
                            self.state = State::SeekStart {
                                matched: matched + 1,
                            };
                        }
                    } else {
                        // Drop the partial match, then give the failing byte
                        // its own chance to start a marker.
                        self.skip(matched as u64);
                        if byte == MARKER[0] {
                            self.state = State::SeekStart { matched: 1 };
                        } else {
                            self.skip(1);
                            self.state = State::SeekStart { matched: 0 };
                        }
                    }
                }
                State::ReadLength { got } => {
                    let byte = self.take_byte();
                    self.frame.extend_from_slice(&[byte]);
                    if got + 1 == 2 {
                        self.length = u16::from_le_bytes([self.frame[2], self.frame[3]]);
                        self.state = State::ReadId;
                    } else {
                        self.state = State::ReadLength { got: got + 1 };
                    }
                }
                State::ReadId => {
                    let byte = self.take_byte();
                    self.frame.extend_from_slice(&[byte]);
                    if usize::from(self.length) < FRAME_OVERHEAD {
                        return Err(self.discard(Malformed::LengthTooShort(self.length)));
                    }
                    self.state = State::ReadPayload {
                        remaining: usize::from(self.length) - HEADER_SIZE,
                    };
                }
                State::ReadPayload { remaining } => {
                    let n = remaining.min(self.buf.len());
                    self.frame.extend_from_slice(&self.buf[..n]);
                    self.buf.advance(n);
                    self.stats.bytes_consumed += n as u64;

                    if n == remaining {
                        return self.emit().map(Some);
                    }
                    self.state = State::ReadPayload {
                        remaining: remaining - n,
                    };
                }
            }
        }
        Ok(None)
    }

    fn take_byte(&mut self) -> u8 {
        self.stats.bytes_consumed += 1;
        self.buf.get_u8()
    }

    fn skip(&mut self, count: u64) {
        self.stats.noise_bytes += count;
        self.skipped += count;
    }

    fn begin_frame(&mut self) {
        if self.skipped > 0 {
            debug!(skipped = self.skipped, "resynchronized on marker");
            self.skipped = 0;
        }
        self.frame.clear();
        self.frame.extend_from_slice(&MARKER);
        self.state = State::ReadLength { got: 0 };
    }

    fn emit(&mut self) -> Result<Frame> {
        let id = self.frame[4];
        let frame = Frame::from_validated(id, self.frame.split().freeze());
        self.state = State::SeekStart { matched: 0 };

        if self.config.verify_trailer {
            if let Err(malformed) = frame.verify(self.config.checksum.as_ref()) {
                return Err(self.discard(malformed));
            }
        }

        self.stats.frames += 1;
        debug!(id, len = frame.wire_size(), "frame received");
        Ok(frame)
    }

    fn discard(&mut self, malformed: Malformed) -> FrameError {
        self.stats.malformed += 1;
        self.frame.clear();
        self.state = State::SeekStart { matched: 0 };
        warn!(error = %malformed, "discarding malformed frame");
        FrameError::Malformed(malformed)
    }
}

impl Framer<LinkStream> {
    /// Create a framer for a `LinkStream` and apply the read timeout from config.
    pub fn with_config_link(inner: LinkStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::sync::Arc;

    use bytes::BytesMut;
    use pktlink_transport::{MemoryLink, TcpLink};

    use super::*;
    use crate::checksum::{Crc8, Placeholder};
    use crate::codec::encode_frame;

    fn wire(id: u8, payload: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_frame(id, payload, &Placeholder, &mut buf).unwrap();
        buf.to_vec()
    }

    #[test]
    fn read_single_frame() {
        let mut framer = Framer::new(MemoryLink::new(wire(1, &1.5f32.to_le_bytes())));
        let frame = framer.read_frame(None).unwrap().unwrap();

        assert_eq!(frame.id(), 1);
        assert_eq!(frame.payload(), &1.5f32.to_le_bytes());
        assert_eq!(framer.stats().frames, 1);
        assert_eq!(framer.phase(), Phase::SeekStart);
    }

    #[test]
    fn read_multiple_frames_from_one_chunk() {
        let mut bytes = wire(1, b"one");
        bytes.extend(wire(2, b"two"));
        bytes.extend(wire(3, b"three"));

        let mut framer = Framer::new(MemoryLink::new(bytes));
        let f1 = framer.read_frame(None).unwrap().unwrap();
        assert!(framer.buffered() > 0);
        let f2 = framer.read_frame(None).unwrap().unwrap();
        let f3 = framer.read_frame(None).unwrap().unwrap();

        assert_eq!((f1.id(), f1.payload()), (1, b"one".as_ref()));
        assert_eq!((f2.id(), f2.payload()), (2, b"two".as_ref()));
        assert_eq!((f3.id(), f3.payload()), (3, b"three".as_ref()));

        let err = framer.read_frame(None).unwrap_err();
        assert!(matches!(err, FrameError::TransportClosed));
    }

    #[test]
    fn leading_noise_and_repeated_marker_byte() {
        let mut bytes = vec![0x00];
        bytes.push(0xA1);
        bytes.extend(wire(1, &2.5f32.to_le_bytes()));
        assert_eq!(bytes.len(), 12);

        let mut framer = Framer::new(MemoryLink::new(bytes));
        let frame = framer.read_frame(None).unwrap().unwrap();

        assert_eq!(frame.id(), 1);
        assert_eq!(frame.payload(), &2.5f32.to_le_bytes());

        let stats = framer.stats();
        assert_eq!(stats.frames, 1);
        assert_eq!(stats.noise_bytes, 2);
        assert_eq!(stats.bytes_consumed, 12);
    }

    #[test]
    fn marker_mismatch_rescans_failing_byte() {
        // A1 00 A1 95 ...: the second A1 must still start a frame.
        let mut bytes = vec![0xA1, 0x00];
        bytes.extend(wire(4, b"x"));

        let mut framer = Framer::new(MemoryLink::new(bytes));
        let frame = framer.read_frame(None).unwrap().unwrap();
        assert_eq!(frame.id(), 4);
        assert_eq!(framer.stats().noise_bytes, 2);
    }

    #[test]
    fn one_byte_reads_reconstruct_frame() {
        let bytes = wire(9, b"slow and steady");
        let expected = bytes.clone();

        let link = MemoryLink::new(bytes).with_max_read(1);
        let mut framer = Framer::new(link);
        let frame = framer.read_frame(None).unwrap().unwrap();

        assert_eq!(frame.as_bytes(), expected.as_slice());
        assert_eq!(framer.get_ref().read_calls(), expected.len());
    }

    #[test]
    fn closed_cleanly_when_empty() {
        let mut framer = Framer::new(MemoryLink::new(b""));
        let err = framer.read_frame(None).unwrap_err();
        assert!(matches!(err, FrameError::TransportClosed));
        assert!(framer.is_closed());
    }

    #[test]
    fn close_mid_frame_is_transport_closed() {
        let bytes = wire(2, b"truncated");
        for cut in 1..bytes.len() {
            let mut framer = Framer::new(MemoryLink::new(&bytes[..cut]));
            let err = framer.read_frame(None).unwrap_err();
            assert!(
                matches!(err, FrameError::TransportClosed),
                "cut at {cut}: {err:?}"
            );
            assert_eq!(framer.stats().malformed, 0);
        }
    }

    #[test]
    fn timeout_mid_frame_resumes() {
        let bytes = wire(5, b"resume");
        let (head, tail) = bytes.split_at(7);

        let mut framer = Framer::new(MemoryLink::held_open(head));
        assert!(framer.read_frame(Some(Duration::ZERO)).unwrap().is_none());
        assert_eq!(framer.phase(), Phase::ReadPayload);

        framer.get_mut().push(tail);
        let frame = framer.read_frame(Some(Duration::ZERO)).unwrap().unwrap();
        assert_eq!(frame.payload(), b"resume");
    }

    #[test]
    fn idle_link_times_out() {
        let mut framer = Framer::new(MemoryLink::held_open(b""));
        assert!(framer
            .read_frame(Some(Duration::from_millis(5)))
            .unwrap()
            .is_none());
        assert!(!framer.is_closed());
    }

    #[test]
    fn length_below_overhead_is_malformed() {
        let mut bytes = vec![0xA1, 0x95, 0x03, 0x00, 0x01];
        bytes.extend(wire(6, b"ok"));

        let mut framer = Framer::new(MemoryLink::new(bytes));
        let err = framer.read_frame(None).unwrap_err();
        assert!(matches!(
            err,
            FrameError::Malformed(Malformed::LengthTooShort(3))
        ));
        assert!(err.is_recoverable());

        let frame = framer.read_frame(None).unwrap().unwrap();
        assert_eq!(frame.id(), 6);
        assert_eq!(framer.stats().malformed, 1);
    }

    #[test]
    fn trailer_verification_rejects_placeholder() {
        let config = FrameConfig {
            verify_trailer: true,
            checksum: Arc::new(Crc8::default()),
            ..FrameConfig::default()
        };

        let mut bytes = wire(1, b"bad");
        let mut good = BytesMut::new();
        encode_frame(2, b"good", &Crc8::default(), &mut good).unwrap();
        bytes.extend_from_slice(&good);

        let mut framer = Framer::with_config(MemoryLink::new(bytes), config);
        let err = framer.read_frame(None).unwrap_err();
        assert!(matches!(
            err,
            FrameError::Malformed(Malformed::TrailerMismatch { actual: 0xFF, .. })
        ));

        let frame = framer.read_frame(None).unwrap().unwrap();
        assert_eq!(frame.id(), 2);
    }

    #[test]
    fn trailer_ignored_by_default() {
        let mut bytes = wire(1, b"abc");
        let last = bytes.len() - 1;
        bytes[last] = 0x00;

        let mut framer = Framer::new(MemoryLink::new(bytes));
        let frame = framer.read_frame(None).unwrap().unwrap();
        assert_eq!(frame.trailer(), 0x00);
    }

    #[test]
    fn empty_payload_frame() {
        let mut framer = Framer::new(MemoryLink::new(wire(0xFE, b"")));
        let frame = framer.read_frame(None).unwrap().unwrap();
        assert_eq!(frame.id(), 0xFE);
        assert!(frame.payload().is_empty());
    }

    #[test]
    fn interrupted_read_retries() {
        let link = InterruptedOnce {
            interrupted: false,
            inner: MemoryLink::new(wire(8, b"ok")),
        };
        let mut framer = Framer::new(link);
        let frame = framer.read_frame(None).unwrap().unwrap();
        assert_eq!(frame.id(), 8);
    }

    #[test]
    fn accessors_and_into_inner() {
        let mut framer = Framer::new(MemoryLink::new(b""));
        assert!(!framer.config().verify_trailer);
        let _ = framer.get_ref();
        let _ = framer.get_mut();
        let _inner = framer.into_inner();
    }

    #[test]
    fn roundtrip_over_tcp() {
        let listener = TcpLink::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr();

        let client = std::thread::spawn(move || {
            let stream = TcpLink::connect(addr).unwrap();
            let mut writer = crate::writer::FrameWriter::new(stream);
            writer.send(11, b"tcp").unwrap();
            writer.send(12, b"again").unwrap();
        });

        let stream = listener.accept().unwrap();
        let config = FrameConfig {
            read_timeout: Some(Duration::from_secs(2)),
            ..FrameConfig::default()
        };
        let mut framer = Framer::with_config_link(stream, config).unwrap();

        let f1 = framer.read_frame(Some(Duration::from_secs(5))).unwrap().unwrap();
        let f2 = framer.read_frame(Some(Duration::from_secs(5))).unwrap().unwrap();
        assert_eq!((f1.id(), f1.payload()), (11, b"tcp".as_ref()));
        assert_eq!((f2.id(), f2.payload()), (12, b"again".as_ref()));

        client.join().unwrap();
        let err = framer.read_frame(Some(Duration::from_secs(5))).unwrap_err();
        assert!(matches!(err, FrameError::TransportClosed));
    }

    struct InterruptedOnce {
        interrupted: bool,
        inner: MemoryLink,
    }

    impl Read for InterruptedOnce {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.inner.read(buf)
        }
    }

    impl Write for InterruptedOnce {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.inner.write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.inner.flush()
        }
    }

    impl Transport for InterruptedOnce {
        fn wait_readable(&mut self, timeout: Option<Duration>) -> std::io::Result<bool> {
            self.inner.wait_readable(timeout)
        }
    }
}
