//! Owned socket endpoints and their data operations.

use crate::error::{Error, Result, SocketCall};
use crate::lock::PathLock;
use crate::mode::{Direction, TransportMode};
use crate::sys;
use serde::Serialize;
use std::fmt;
use std::io::{self, Read, Write};
use std::ops::Range;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, IntoRawFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, trace};

/// Where an endpoint sits in the socket lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointState {
    /// Bound to a path but not connected (datagram receiver).
    Bound,
    /// Stream socket in `listen` mode, ready for `accept`.
    Listening,
    /// Connected to a peer, either by `accept` or `connect`.
    Connected,
}

impl fmt::Display for EndpointState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bound => "bound",
            Self::Listening => "listening",
            Self::Connected => "connected",
        })
    }
}

/// An open Unix-domain socket with a single owner.
///
/// Dropping an endpoint closes the descriptor; [`Endpoint::close`] does the
/// same after a full-duplex shutdown and reports the result of `close(2)`.
/// Reads and writes go through `&self`, matching `std::os::unix::net`.
///
/// A bound endpoint also holds the lock on its path, released together with
/// the descriptor (including when the descriptor is converted away).
#[derive(Debug)]
pub struct Endpoint {
    fd: OwnedFd,
    mode: TransportMode,
    state: EndpointState,
    input_shut: AtomicBool,
    output_shut: AtomicBool,
    path_lock: Option<PathLock>,
}

impl Endpoint {
    pub(crate) fn new(fd: OwnedFd, mode: TransportMode, state: EndpointState) -> Self {
        Self {
            fd,
            mode,
            state,
            input_shut: AtomicBool::new(false),
            output_shut: AtomicBool::new(false),
            path_lock: None,
        }
    }

    pub(crate) fn with_path_lock(mut self, lock: Option<PathLock>) -> Self {
        self.path_lock = lock;
        self
    }

    /// Whether this endpoint holds the lock marking its path as served.
    pub fn holds_path_lock(&self) -> bool {
        self.path_lock.is_some()
    }

    pub fn mode(&self) -> TransportMode {
        self.mode
    }

    pub fn state(&self) -> EndpointState {
        self.state
    }

    /// Whether `close_input` has been called on this endpoint.
    pub fn is_input_shut(&self) -> bool {
        self.input_shut.load(Ordering::Relaxed)
    }

    /// Whether `close_output` has been called on this endpoint.
    pub fn is_output_shut(&self) -> bool {
        self.output_shut.load(Ordering::Relaxed)
    }

    /// Block until a peer connects and return its endpoint.
    ///
    /// Datagram sockets never accept; for them this returns `Ok(None)`
    /// without a syscall. The listening endpoint stays open either way.
    pub fn accept(&self) -> Result<Option<Endpoint>> {
        if self.mode == TransportMode::Datagram {
            trace!(fd = self.fd.as_raw_fd(), "accept on datagram endpoint is a no-op");
            return Ok(None);
        }
        if self.state != EndpointState::Listening {
            return Err(Error::NotListening {
                operation: "accept",
            });
        }

        let peer = sys::accept(self.fd.as_fd())
            .map_err(|e| Error::os("accept", SocketCall::Accept, e))?;
        debug!(
            listener = self.fd.as_raw_fd(),
            fd = peer.as_raw_fd(),
            "accepted peer"
        );
        Ok(Some(Endpoint::new(
            peer,
            TransportMode::Stream,
            EndpointState::Connected,
        )))
    }

    /// One blocking `read(2)` into `buf[offset..offset + len]`.
    ///
    /// The count may be short; `Ok(0)` means the peer shut down its side
    /// (or `len` was zero, in which case no syscall is made).
    pub fn read_region(&self, buf: &mut [u8], offset: usize, len: usize) -> Result<usize> {
        let range = region(buf.len(), offset, len)?;
        if range.is_empty() {
            return Ok(0);
        }
        let count = sys::read(self.fd.as_fd(), &mut buf[range])
            .map_err(|e| Error::os("read", SocketCall::Read, e))?;
        trace!(fd = self.fd.as_raw_fd(), requested = len, count, "read");
        Ok(count)
    }

    /// One blocking `write(2)` from `buf[offset..offset + len]`.
    ///
    /// The count may be short; loop (or use `write_all`) to send everything.
    pub fn write_region(&self, buf: &[u8], offset: usize, len: usize) -> Result<usize> {
        let range = region(buf.len(), offset, len)?;
        if range.is_empty() {
            return Ok(0);
        }
        let count = sys::write(self.fd.as_fd(), &buf[range])
            .map_err(|e| Error::os("write", SocketCall::Write, e))?;
        trace!(fd = self.fd.as_raw_fd(), requested = len, count, "write");
        Ok(count)
    }

    /// Bound how long a read may block. `0` restores fully blocking reads.
    pub fn set_receive_timeout(&self, millis: u32) -> Result<()> {
        sys::set_receive_timeout(self.fd.as_fd(), sys::millis_to_timeval(millis))
            .map_err(|e| Error::os("set_receive_timeout", SocketCall::SetSockOpt, e))?;
        debug!(fd = self.fd.as_raw_fd(), millis, "receive timeout set");
        Ok(())
    }

    /// The receive timeout currently configured, `None` when reads block.
    pub fn receive_timeout(&self) -> Result<Option<Duration>> {
        let tv = sys::receive_timeout(self.fd.as_fd())
            .map_err(|e| Error::os("receive_timeout", SocketCall::GetSockOpt, e))?;
        let timeout = Duration::from_secs(tv.tv_sec as u64) + Duration::from_micros(tv.tv_usec as u64);
        Ok((!timeout.is_zero()).then_some(timeout))
    }

    /// Shut down the receive direction; writes keep working.
    pub fn close_input(&self) -> Result<()> {
        self.shutdown_direction("close_input", Direction::Input)
    }

    /// Shut down the send direction; the peer sees end of stream.
    pub fn close_output(&self) -> Result<()> {
        self.shutdown_direction("close_output", Direction::Output)
    }

    fn shutdown_direction(&self, operation: &'static str, direction: Direction) -> Result<()> {
        sys::shutdown(self.fd.as_fd(), direction.shutdown_how())
            .map_err(|e| Error::os(operation, SocketCall::Shutdown, e))?;
        match direction {
            Direction::Input => self.input_shut.store(true, Ordering::Relaxed),
            Direction::Output => self.output_shut.store(true, Ordering::Relaxed),
        }
        debug!(fd = self.fd.as_raw_fd(), %direction, "half-closed");
        Ok(())
    }

    /// Shut down both directions, then release the descriptor.
    ///
    /// A failed shutdown does not prevent the release; only the `close(2)`
    /// result is reported.
    pub fn close(self) -> Result<()> {
        let raw = self.fd.as_raw_fd();
        if let Err(err) = sys::shutdown(self.fd.as_fd(), libc::SHUT_RDWR) {
            trace!(fd = raw, error = %err, "shutdown before close failed");
        }
        sys::close(self.fd).map_err(|e| Error::os("close", SocketCall::Close, e))?;
        debug!(fd = raw, "closed");
        Ok(())
    }
}

fn region(capacity: usize, offset: usize, len: usize) -> Result<Range<usize>> {
    offset
        .checked_add(len)
        .filter(|&end| end <= capacity)
        .map(|end| offset..end)
        .ok_or(Error::BufferRange {
            offset,
            len,
            capacity,
        })
}

impl AsFd for Endpoint {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl AsRawFd for Endpoint {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl IntoRawFd for Endpoint {
    fn into_raw_fd(self) -> RawFd {
        self.fd.into_raw_fd()
    }
}

impl From<Endpoint> for OwnedFd {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.fd
    }
}

impl Read for &Endpoint {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        sys::read(self.fd.as_fd(), buf)
    }
}

impl Write for &Endpoint {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        sys::write(self.fd.as_fd(), buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for Endpoint {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(&mut &*self, buf)
    }
}

impl Write for Endpoint {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Write::write(&mut &*self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream_pair() -> (Endpoint, Endpoint) {
        let (a, b) = std::os::unix::net::UnixStream::pair().unwrap();
        (
            Endpoint::new(a.into(), TransportMode::Stream, EndpointState::Connected),
            Endpoint::new(b.into(), TransportMode::Stream, EndpointState::Connected),
        )
    }

    #[test]
    fn region_bounds() {
        assert_eq!(region(8, 0, 8).unwrap(), 0..8);
        assert_eq!(region(8, 3, 2).unwrap(), 3..5);
        assert_eq!(region(8, 8, 0).unwrap(), 8..8);
        assert!(matches!(
            region(8, 4, 5),
            Err(Error::BufferRange {
                offset: 4,
                len: 5,
                capacity: 8
            })
        ));
        assert!(region(8, usize::MAX, 2).is_err());
    }

    #[test]
    fn read_and_write_honour_offsets() {
        let (a, b) = stream_pair();
        let payload = [9u8, 1, 2, 3, 9];
        assert_eq!(a.write_region(&payload, 1, 3).unwrap(), 3);

        let mut buf = [0u8; 6];
        let n = b.read_region(&mut buf, 2, 4).unwrap();
        assert_eq!(n, 3);
        assert_eq!(buf, [0, 0, 1, 2, 3, 0]);
    }

    #[test]
    fn out_of_range_region_fails_before_syscall() {
        let (a, _b) = stream_pair();
        let mut buf = [0u8; 4];
        let err = a.read_region(&mut buf, 2, 3).unwrap_err();
        assert!(matches!(err, Error::BufferRange { .. }));
        let err = a.write_region(&buf, 5, 0).unwrap_err();
        assert!(matches!(err, Error::BufferRange { .. }));
    }

    #[test]
    fn zero_length_read_returns_zero() {
        let (a, _b) = stream_pair();
        let mut buf = [0u8; 4];
        assert_eq!(a.read_region(&mut buf, 0, 0).unwrap(), 0);
    }

    #[test]
    fn read_returns_zero_after_peer_closes_output() {
        let (a, b) = stream_pair();
        a.close_output().unwrap();
        assert!(a.is_output_shut());
        let mut buf = [0u8; 4];
        assert_eq!(b.read_region(&mut buf, 0, 4).unwrap(), 0);
    }

    #[test]
    fn close_input_leaves_output_usable() {
        let (a, b) = stream_pair();
        a.close_input().unwrap();
        assert!(a.is_input_shut());
        assert!(!a.is_output_shut());
        assert_eq!(a.write_region(b"ok", 0, 2).unwrap(), 2);

        let mut buf = [0u8; 2];
        assert_eq!(b.read_region(&mut buf, 0, 2).unwrap(), 2);
        assert_eq!(&buf, b"ok");

        let mut probe = [0u8; 1];
        match a.read_region(&mut probe, 0, 1) {
            Ok(n) => assert_eq!(n, 0),
            Err(err) => assert_eq!(err.call(), Some(SocketCall::Read)),
        }
    }

    #[test]
    fn accept_on_connected_stream_is_a_precondition_error() {
        let (a, _b) = stream_pair();
        assert!(matches!(
            a.accept(),
            Err(Error::NotListening { operation: "accept" })
        ));
    }

    #[test]
    fn accept_on_datagram_is_a_no_op() {
        let (a, _b) = std::os::unix::net::UnixDatagram::pair().unwrap();
        let endpoint = Endpoint::new(a.into(), TransportMode::Datagram, EndpointState::Bound);
        assert!(endpoint.accept().unwrap().is_none());
    }

    #[test]
    fn receive_timeout_reports_configured_value() {
        let (a, _b) = stream_pair();
        assert_eq!(a.receive_timeout().unwrap(), None);
        a.set_receive_timeout(1500).unwrap();
        let timeout = a.receive_timeout().unwrap().unwrap();
        assert!(timeout >= Duration::from_millis(1400) && timeout <= Duration::from_millis(1600));
        a.set_receive_timeout(0).unwrap();
        assert_eq!(a.receive_timeout().unwrap(), None);
    }

    #[test]
    fn receive_timeout_failure_names_getsockopt() {
        let file = std::fs::File::open("/dev/null").unwrap();
        let endpoint = Endpoint::new(file.into(), TransportMode::Stream, EndpointState::Connected);
        let err = endpoint.receive_timeout().unwrap_err();
        assert_eq!(err.call(), Some(SocketCall::GetSockOpt));
        assert!(
            err.to_string().starts_with("receive_timeout: getsockopt: "),
            "{err}"
        );

        let err = endpoint.set_receive_timeout(10).unwrap_err();
        assert_eq!(err.call(), Some(SocketCall::SetSockOpt));
    }

    #[test]
    fn io_traits_use_whole_slices() {
        let (mut a, mut b) = stream_pair();
        a.write_all(b"hello").unwrap();
        let mut buf = [0u8; 5];
        b.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn close_reports_success_for_connected_and_unconnected() {
        let (a, b) = stream_pair();
        a.close().unwrap();
        b.close().unwrap();

        let (d, _e) = std::os::unix::net::UnixDatagram::pair().unwrap();
        Endpoint::new(d.into(), TransportMode::Datagram, EndpointState::Bound)
            .close()
            .unwrap();
    }
}
