use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;
#[cfg(unix)]
use std::time::Instant;

use crate::error::Result;

/// A connected byte stream that can also report read readiness.
///
/// `read` returning `Ok(0)` means the peer closed the link. That is distinct
/// from "nothing to read yet", which [`Transport::wait_readable`] reports by
/// returning `Ok(false)` once the timeout elapses.
pub trait Transport: Read + Write {
    /// Wait until a read would make progress.
    ///
    /// `Some(Duration::ZERO)` polls without blocking and `None` waits
    /// indefinitely. An orderly close counts as readable, so the following
    /// read observes it as zero bytes.
    fn wait_readable(&mut self, timeout: Option<Duration>) -> std::io::Result<bool>;
}

/// A connected link that implements Read + Write + [`Transport`].
///
/// This is the stream type handed out by [`crate::TcpLink`] and
/// [`LinkStream::open_serial`].
pub struct LinkStream {
    inner: LinkStreamInner,
}

enum LinkStreamInner {
    Tcp(TcpStream),
    #[cfg(unix)]
    Serial(std::fs::File),
}

impl Read for LinkStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            LinkStreamInner::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            LinkStreamInner::Serial(file) => file.read(buf),
        }
    }
}

impl Write for LinkStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            LinkStreamInner::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            LinkStreamInner::Serial(file) => file.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            LinkStreamInner::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            LinkStreamInner::Serial(file) => file.flush(),
        }
    }
}

impl Transport for LinkStream {
    fn wait_readable(&mut self, timeout: Option<Duration>) -> std::io::Result<bool> {
        match &mut self.inner {
            LinkStreamInner::Tcp(stream) => stream.wait_readable(timeout),
            #[cfg(unix)]
            LinkStreamInner::Serial(file) => {
                use std::os::fd::AsRawFd;
                poll_readable(file.as_raw_fd(), timeout)
            }
        }
    }
}

impl Transport for TcpStream {
    #[cfg(unix)]
    fn wait_readable(&mut self, timeout: Option<Duration>) -> std::io::Result<bool> {
        use std::os::fd::AsRawFd;
        poll_readable(self.as_raw_fd(), timeout)
    }

    #[cfg(not(unix))]
    fn wait_readable(&mut self, timeout: Option<Duration>) -> std::io::Result<bool> {
        peek_readable(self, timeout)
    }
}

impl LinkStream {
    /// Wrap a connected TCP stream.
    pub(crate) fn from_tcp(stream: TcpStream) -> Self {
        Self {
            inner: LinkStreamInner::Tcp(stream),
        }
    }

    /// Open a serial device node (for example `/dev/ttyUSB0`) as a byte stream.
    ///
    /// Line settings (baud rate, parity, raw mode) are expected to be applied
    /// outside the process, e.g. with `stty`.
    #[cfg(unix)]
    pub fn open_serial(path: impl AsRef<std::path::Path>) -> Result<Self> {
        use std::os::unix::fs::OpenOptionsExt;

        let path = path.as_ref();
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY)
            .open(path)
            .map_err(|source| crate::error::TransportError::OpenDevice {
                path: path.to_path_buf(),
                source,
            })?;
        tracing::info!(?path, "opened serial device");
        Ok(Self {
            inner: LinkStreamInner::Serial(file),
        })
    }

    /// Set read timeout on the underlying stream.
    ///
    /// Serial links have no socket timeout; reads there are paced by
    /// [`Transport::wait_readable`] and this is a no-op.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            LinkStreamInner::Tcp(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
            #[cfg(unix)]
            LinkStreamInner::Serial(_) => Ok(()),
        }
    }

    /// Set write timeout on the underlying stream (no-op for serial links).
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            LinkStreamInner::Tcp(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
            #[cfg(unix)]
            LinkStreamInner::Serial(_) => Ok(()),
        }
    }

    /// Try to clone this stream (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        let inner = match &self.inner {
            LinkStreamInner::Tcp(stream) => LinkStreamInner::Tcp(stream.try_clone()?),
            #[cfg(unix)]
            LinkStreamInner::Serial(file) => LinkStreamInner::Serial(file.try_clone()?),
        };
        Ok(Self { inner })
    }

    /// Close both directions of a TCP link.
    ///
    /// Any clone blocked in a read observes the close as a zero-byte read.
    /// Serial links are closed when the last handle is dropped.
    pub fn shutdown(&self) -> Result<()> {
        match &self.inner {
            LinkStreamInner::Tcp(stream) => match stream.shutdown(Shutdown::Both) {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == std::io::ErrorKind::NotConnected => Ok(()),
                Err(err) => Err(err.into()),
            },
            #[cfg(unix)]
            LinkStreamInner::Serial(_) => Ok(()),
        }
    }

    /// Remote address for TCP links.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        match &self.inner {
            LinkStreamInner::Tcp(stream) => stream.peer_addr().ok(),
            #[cfg(unix)]
            LinkStreamInner::Serial(_) => None,
        }
    }

    /// Link kind for diagnostics.
    pub fn kind(&self) -> &'static str {
        match &self.inner {
            LinkStreamInner::Tcp(_) => "tcp",
            #[cfg(unix)]
            LinkStreamInner::Serial(_) => "serial",
        }
    }
}

impl std::fmt::Debug for LinkStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            LinkStreamInner::Tcp(stream) => f
                .debug_struct("LinkStream")
                .field("type", &"tcp")
                .field("peer", &stream.peer_addr().ok())
                .finish(),
            #[cfg(unix)]
            LinkStreamInner::Serial(_) => f
                .debug_struct("LinkStream")
                .field("type", &"serial")
                .finish(),
        }
    }
}

#[cfg(unix)]
pub(crate) fn poll_readable(
    fd: std::os::fd::RawFd,
    timeout: Option<Duration>,
) -> std::io::Result<bool> {
    let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };

    loop {
        let timeout_ms = match (timeout, deadline) {
            (None, _) => -1,
            (Some(_), Some(deadline)) => {
                poll_millis(deadline.saturating_duration_since(Instant::now()))
            }
            (Some(timeout), None) => poll_millis(timeout),
        };
        // SAFETY: `pfd` is a valid, writable pollfd for exactly one descriptor,
        // and `fd` stays open for the duration of the call (borrowed from the caller).
        let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if rc < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        // POLLHUP/POLLERR also count: the next read reports the close or the error.
        return Ok(rc > 0);
    }
}

/// `poll(2)` timeout for `timeout`, clamped to `c_int`.
#[cfg(unix)]
fn poll_millis(timeout: Duration) -> libc::c_int {
    // Round sub-millisecond remainders up so a short wait is not a poll.
    let mut ms = timeout.as_millis();
    if timeout.subsec_nanos() % 1_000_000 != 0 {
        ms += 1;
    }
    ms.min(libc::c_int::MAX as u128) as libc::c_int
}

#[cfg(not(unix))]
fn peek_readable(stream: &TcpStream, timeout: Option<Duration>) -> std::io::Result<bool> {
    use std::io::ErrorKind;

    let mut peeked = [0u8; 1];
    let result = match timeout {
        Some(timeout) if timeout.is_zero() => {
            stream.set_nonblocking(true)?;
            let result = stream.peek(&mut peeked);
            stream.set_nonblocking(false)?;
            result
        }
        other => {
            let previous = stream.read_timeout()?;
            stream.set_read_timeout(other)?;
            let result = stream.peek(&mut peeked);
            stream.set_read_timeout(previous)?;
            result
        }
    };

    match result {
        Ok(_) => Ok(true),
        Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(false),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;

    use super::*;

    #[cfg(unix)]
    #[test]
    fn poll_millis_rounds_up_and_clamps() {
        assert_eq!(poll_millis(Duration::ZERO), 0);
        assert_eq!(poll_millis(Duration::from_micros(1500)), 2);
        assert_eq!(poll_millis(Duration::from_millis(40)), 40);
        assert_eq!(poll_millis(Duration::from_secs(u64::MAX)), libc::c_int::MAX);
    }

    #[cfg(unix)]
    #[test]
    fn poll_readable_returns_by_deadline() {
        use std::os::fd::AsRawFd;

        let (client, _server) = tcp_pair();
        let started = Instant::now();
        let ready = poll_readable(client.as_raw_fd(), Some(Duration::from_millis(30))).unwrap();
        assert!(!ready);
        assert!(started.elapsed() >= Duration::from_millis(25));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    fn tcp_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn zero_timeout_polls_without_blocking() {
        let (_client, mut server) = tcp_pair();
        let ready = server.wait_readable(Some(Duration::ZERO)).unwrap();
        assert!(!ready);
    }

    #[test]
    fn readable_after_peer_writes() {
        let (mut client, server) = tcp_pair();
        let mut link = LinkStream::from_tcp(server);

        client.write_all(b"x").unwrap();
        assert!(link.wait_readable(Some(Duration::from_secs(2))).unwrap());

        let mut buf = [0u8; 1];
        assert_eq!(link.read(&mut buf).unwrap(), 1);
        assert_eq!(&buf, b"x");
    }

    #[test]
    fn close_is_readable_and_reads_zero() {
        let (client, server) = tcp_pair();
        let mut link = LinkStream::from_tcp(server);

        drop(client);
        assert!(link.wait_readable(Some(Duration::from_secs(2))).unwrap());

        let mut buf = [0u8; 4];
        assert_eq!(link.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn shutdown_unblocks_clone() {
        let (_client, server) = tcp_pair();
        let link = LinkStream::from_tcp(server);
        let mut reader = link.try_clone().unwrap();

        let handle = std::thread::spawn(move || {
            let mut buf = [0u8; 4];
            reader.read(&mut buf).unwrap()
        });

        link.shutdown().unwrap();
        assert_eq!(handle.join().unwrap(), 0);
    }

    #[test]
    fn debug_and_kind() {
        let (_client, server) = tcp_pair();
        let link = LinkStream::from_tcp(server);
        assert_eq!(link.kind(), "tcp");
        assert!(link.peer_addr().is_some());
        assert!(format!("{link:?}").contains("tcp"));
    }

    #[cfg(unix)]
    #[test]
    fn open_serial_missing_device_fails() {
        let result = LinkStream::open_serial("/dev/pktlink-does-not-exist");
        assert!(matches!(
            result,
            Err(crate::error::TransportError::OpenDevice { .. })
        ));
    }
}
