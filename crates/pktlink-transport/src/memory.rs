use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use bytes::{Buf, BytesMut};

use crate::traits::Transport;

/// In-memory link for loopback and tests.
///
/// Inbound bytes are queued with [`MemoryLink::push`]; outbound bytes are
/// collected and can be inspected with [`MemoryLink::written`]. Once the
/// inbound queue is drained the link reports an orderly close, unless it was
/// created with [`MemoryLink::held_open`], in which case it reports "no data
/// yet" until more bytes are pushed or [`MemoryLink::close`] is called.
///
/// `wait_readable` never sleeps: it answers immediately from the queue.
#[derive(Debug, Default)]
pub struct MemoryLink {
    inbound: BytesMut,
    outbound: Vec<u8>,
    max_read: Option<usize>,
    max_write: Option<usize>,
    open: bool,
    read_calls: usize,
}

impl MemoryLink {
    /// A link that yields `bytes` and then reports close.
    pub fn new(bytes: impl AsRef<[u8]>) -> Self {
        Self {
            inbound: BytesMut::from(bytes.as_ref()),
            ..Self::default()
        }
    }

    /// A link that stays open after its queue drains.
    pub fn held_open(bytes: impl AsRef<[u8]>) -> Self {
        Self {
            open: true,
            ..Self::new(bytes)
        }
    }

    /// Cap the number of bytes a single `read` call returns.
    pub fn with_max_read(mut self, max: usize) -> Self {
        self.max_read = Some(max.max(1));
        self
    }

    /// Cap the number of bytes a single `write` call accepts.
    pub fn with_max_write(mut self, max: usize) -> Self {
        self.max_write = Some(max.max(1));
        self
    }

    /// Queue more inbound bytes.
    pub fn push(&mut self, bytes: impl AsRef<[u8]>) {
        self.inbound.extend_from_slice(bytes.as_ref());
    }

    /// Report close once the queued bytes are drained.
    pub fn close(&mut self) {
        self.open = false;
    }

    /// Bytes written to the link so far.
    pub fn written(&self) -> &[u8] {
        &self.outbound
    }

    /// Take and clear the bytes written so far.
    pub fn take_written(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.outbound)
    }

    /// Inbound bytes not yet read.
    pub fn remaining(&self) -> usize {
        self.inbound.len()
    }

    /// Number of `read` calls that returned data or close.
    pub fn read_calls(&self) -> usize {
        self.read_calls
    }
}

impl Read for MemoryLink {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.inbound.is_empty() {
            if self.open {
                return Err(std::io::Error::from(ErrorKind::WouldBlock));
            }
            self.read_calls += 1;
            return Ok(0);
        }

        let cap = self.max_read.unwrap_or(usize::MAX);
        let n = buf.len().min(cap).min(self.inbound.len());
        buf[..n].copy_from_slice(&self.inbound[..n]);
        self.inbound.advance(n);
        self.read_calls += 1;
        Ok(n)
    }
}

impl Write for MemoryLink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let cap = self.max_write.unwrap_or(usize::MAX);
        let n = buf.len().min(cap);
        self.outbound.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Transport for MemoryLink {
    fn wait_readable(&mut self, _timeout: Option<Duration>) -> std::io::Result<bool> {
        Ok(!self.inbound.is_empty() || !self.open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_then_reports_close() {
        let mut link = MemoryLink::new([1u8, 2, 3]);
        let mut buf = [0u8; 8];

        assert!(link.wait_readable(None).unwrap());
        assert_eq!(link.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &[1, 2, 3]);

        assert!(link.wait_readable(Some(Duration::ZERO)).unwrap());
        assert_eq!(link.read(&mut buf).unwrap(), 0);
        assert_eq!(link.read_calls(), 2);
    }

    #[test]
    fn held_open_reports_no_data_instead_of_close() {
        let mut link = MemoryLink::held_open(b"");
        let mut buf = [0u8; 8];

        assert!(!link.wait_readable(Some(Duration::ZERO)).unwrap());
        let err = link.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WouldBlock);

        link.push([9u8]);
        assert!(link.wait_readable(Some(Duration::ZERO)).unwrap());
        assert_eq!(link.read(&mut buf).unwrap(), 1);

        link.close();
        assert!(link.wait_readable(Some(Duration::ZERO)).unwrap());
        assert_eq!(link.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn max_read_limits_each_call() {
        let mut link = MemoryLink::new([1u8, 2, 3]).with_max_read(1);
        let mut buf = [0u8; 8];

        assert_eq!(link.read(&mut buf).unwrap(), 1);
        assert_eq!(link.remaining(), 2);
    }

    #[test]
    fn writes_are_collected() {
        let mut link = MemoryLink::new(b"").with_max_write(2);
        assert_eq!(link.write(b"abc").unwrap(), 2);
        link.write_all(b"de").unwrap();

        assert_eq!(link.written(), b"abde");
        assert_eq!(link.take_written(), b"abde".to_vec());
        assert!(link.written().is_empty());
    }
}
