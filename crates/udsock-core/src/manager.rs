//! The endpoint manager: socket lifecycle sequencing.
//!
//! Each operation performs its syscalls in a fixed order on the caller's
//! thread and stops at the first failure. The manager keeps no state
//! besides its options; there is no registry of open endpoints.

use crate::addr::SocketAddress;
use crate::endpoint::{Endpoint, EndpointState};
use crate::error::{Error, Result, SocketCall};
use crate::lock::{self, PathLock};
use crate::mode::TransportMode;
use crate::stale::{self, StaleSocketPolicy};
use crate::sys;
use std::os::fd::{AsFd, AsRawFd, OwnedFd};
use std::path::Path;
use tracing::{debug, info};

/// Backlog used by the single-peer `create` flow.
pub const SINGLE_PEER_BACKLOG: u32 = 1;

/// Knobs applied by the manager to every endpoint it opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EndpointOptions {
    /// How an existing object at the bind path is treated.
    pub stale_socket: StaleSocketPolicy,
    /// Receive timeout applied to data-carrying endpoints; `0` keeps reads
    /// blocking.
    pub receive_timeout_ms: u32,
}

#[derive(Debug, Clone, Default)]
pub struct EndpointManager {
    options: EndpointOptions,
}

impl EndpointManager {
    #[must_use]
    pub fn new(options: EndpointOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &EndpointOptions {
        &self.options
    }

    /// Bind `path` and, for stream mode, block until exactly one peer
    /// connects.
    ///
    /// Stream: the listening socket and the path lock are released once the
    /// peer is accepted and the peer endpoint is returned. Datagram: the
    /// bound endpoint is returned immediately and keeps the path lock.
    pub fn create(&self, path: impl AsRef<Path>, mode: TransportMode) -> Result<Endpoint> {
        let path = path.as_ref();
        let (fd, path_lock) = self.bind_path("create", path, mode)?;

        let endpoint = match mode {
            TransportMode::Stream => {
                sys::listen(fd.as_fd(), SINGLE_PEER_BACKLOG as libc::c_int)
                    .map_err(|e| Error::os("create", SocketCall::Listen, e))?;
                debug!(path = %path.display(), fd = fd.as_raw_fd(), "waiting for single peer");
                let peer =
                    sys::accept(fd.as_fd()).map_err(|e| Error::os("create", SocketCall::Accept, e))?;
                drop(fd);
                drop(path_lock);
                Endpoint::new(peer, mode, EndpointState::Connected)
            }
            TransportMode::Datagram => {
                Endpoint::new(fd, mode, EndpointState::Bound).with_path_lock(path_lock)
            }
        };

        self.apply_receive_timeout("create", &endpoint)?;
        info!(
            path = %path.display(),
            %mode,
            fd = endpoint.as_raw_fd(),
            "endpoint created"
        );
        Ok(endpoint)
    }

    /// Bind `path` and, for stream mode, start listening with `backlog`.
    ///
    /// The returned endpoint is `Listening` (stream) or `Bound` (datagram);
    /// the backlog is ignored for datagram sockets.
    pub fn listen(
        &self,
        path: impl AsRef<Path>,
        mode: TransportMode,
        backlog: u32,
    ) -> Result<Endpoint> {
        let path = path.as_ref();
        let (fd, path_lock) = self.bind_path("listen", path, mode)?;

        let endpoint = match mode {
            TransportMode::Stream => {
                let backlog = libc::c_int::try_from(backlog).unwrap_or(libc::c_int::MAX);
                sys::listen(fd.as_fd(), backlog)
                    .map_err(|e| Error::os("listen", SocketCall::Listen, e))?;
                Endpoint::new(fd, mode, EndpointState::Listening).with_path_lock(path_lock)
            }
            TransportMode::Datagram => {
                let endpoint =
                    Endpoint::new(fd, mode, EndpointState::Bound).with_path_lock(path_lock);
                self.apply_receive_timeout("listen", &endpoint)?;
                endpoint
            }
        };

        info!(
            path = %path.display(),
            %mode,
            backlog,
            fd = endpoint.as_raw_fd(),
            "endpoint listening"
        );
        Ok(endpoint)
    }

    /// Accept one peer on a listening endpoint; `None` for datagram mode.
    pub fn accept(&self, listener: &Endpoint) -> Result<Option<Endpoint>> {
        let Some(peer) = listener.accept()? else {
            return Ok(None);
        };
        self.apply_receive_timeout("accept", &peer)?;
        Ok(Some(peer))
    }

    /// Open a socket and connect it to `path`.
    ///
    /// If the connect fails the new socket is closed before the error is
    /// returned; a failing close is reported in its place.
    pub fn connect(&self, path: impl AsRef<Path>, mode: TransportMode) -> Result<Endpoint> {
        let path = path.as_ref();
        let addr = SocketAddress::new(path)?;
        let fd = open_socket("connect", mode)?;

        if let Err(err) = sys::connect(fd.as_fd(), &addr) {
            debug!(path = %path.display(), error = %err, "connect failed; closing socket");
            sys::close(fd).map_err(|e| Error::os("connect", SocketCall::Close, e))?;
            return Err(Error::os("connect", SocketCall::Connect, err));
        }

        let endpoint = Endpoint::new(fd, mode, EndpointState::Connected);
        self.apply_receive_timeout("connect", &endpoint)?;
        info!(
            path = %path.display(),
            %mode,
            fd = endpoint.as_raw_fd(),
            "endpoint connected"
        );
        Ok(endpoint)
    }

    /// Remove the socket node at `path`, independent of any open endpoint.
    pub fn unlink(&self, path: impl AsRef<Path>) -> Result<()> {
        unlink(path)
    }

    /// Steps shared by `create` and `listen`: address, socket, lock and
    /// clear the path, bind.
    fn bind_path(
        &self,
        operation: &'static str,
        path: &Path,
        mode: TransportMode,
    ) -> Result<(OwnedFd, Option<PathLock>)> {
        let addr = SocketAddress::new(path)?;
        let fd = open_socket(operation, mode)?;
        let path_lock = stale::clear_path(operation, path, mode, self.options.stale_socket)?;
        sys::bind(fd.as_fd(), &addr).map_err(|e| Error::os(operation, SocketCall::Bind, e))?;
        debug!(
            path = %path.display(),
            %mode,
            fd = fd.as_raw_fd(),
            len = addr.effective_len(),
            locked = path_lock.is_some(),
            "bound"
        );
        Ok((fd, path_lock))
    }

    fn apply_receive_timeout(&self, operation: &'static str, endpoint: &Endpoint) -> Result<()> {
        if self.options.receive_timeout_ms == 0 {
            return Ok(());
        }
        endpoint.set_receive_timeout(self.options.receive_timeout_ms).map_err(|err| match err {
            Error::Os { call, source, .. } => Error::os(operation, call, source),
            other => other,
        })
    }
}

fn open_socket(operation: &'static str, mode: TransportMode) -> Result<OwnedFd> {
    sys::socket(mode.sock_type()).map_err(|e| Error::os(operation, SocketCall::Socket, e))
}

/// Remove the socket node at `path`, along with its lock file.
///
/// A missing node is an error of the "not found" class.
pub fn unlink(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    std::fs::remove_file(path).map_err(|e| Error::os("unlink", SocketCall::Unlink, e))?;
    lock::remove_for(path);
    debug!(path = %path.display(), "unlinked");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listen_stream_yields_listening_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("l.sock");
        let listener = EndpointManager::default()
            .listen(&path, TransportMode::Stream, 4)
            .unwrap();
        assert_eq!(listener.state(), EndpointState::Listening);
        assert_eq!(listener.mode(), TransportMode::Stream);
        assert!(path.exists());
    }

    #[test]
    fn listen_datagram_yields_bound_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("d.sock");
        let endpoint = EndpointManager::default()
            .listen(&path, TransportMode::Datagram, 99)
            .unwrap();
        assert_eq!(endpoint.state(), EndpointState::Bound);
    }

    #[test]
    fn huge_backlog_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.sock");
        EndpointManager::default()
            .listen(&path, TransportMode::Stream, u32::MAX)
            .unwrap();
    }

    #[test]
    fn bind_into_missing_directory_reports_bind() {
        let err = EndpointManager::default()
            .listen("/nonexistent/dir/udsock.sock", TransportMode::Stream, 1)
            .unwrap_err();
        assert_eq!(err.call(), Some(SocketCall::Bind));
        assert!(err.to_string().starts_with("listen: bind: "), "{err}");
    }

    #[test]
    fn connect_to_missing_path_reports_connect() {
        let dir = tempfile::tempdir().unwrap();
        let err = EndpointManager::default()
            .connect(dir.path().join("absent.sock"), TransportMode::Stream)
            .unwrap_err();
        assert_eq!(err.call(), Some(SocketCall::Connect));
        assert!(err.is_not_found());
    }

    #[test]
    fn overlong_path_fails_before_any_syscall() {
        let path = format!("/tmp/{}", "x".repeat(crate::addr::MAX_PATH_LEN));
        let err = EndpointManager::default()
            .create(&path, TransportMode::Stream)
            .unwrap_err();
        assert!(matches!(err, Error::PathTooLong { .. }));
        assert!(!Path::new(&path).exists());
    }

    #[test]
    fn unlink_missing_path_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = unlink(dir.path().join("gone.sock")).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.call(), Some(SocketCall::Unlink));
    }

    #[test]
    fn bound_endpoints_hold_the_path_lock() {
        let dir = tempfile::tempdir().unwrap();
        let manager = EndpointManager::default();

        let listener = manager
            .listen(dir.path().join("s.sock"), TransportMode::Stream, 2)
            .unwrap();
        assert!(listener.holds_path_lock());
        let receiver = manager
            .create(dir.path().join("d.sock"), TransportMode::Datagram)
            .unwrap();
        assert!(receiver.holds_path_lock());

        let client = manager
            .connect(dir.path().join("s.sock"), TransportMode::Stream)
            .unwrap();
        assert!(!client.holds_path_lock());
        let peer = manager.accept(&listener).unwrap().unwrap();
        assert!(!peer.holds_path_lock());
    }

    #[test]
    fn second_bind_on_a_held_path_is_address_in_use() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("held.sock");
        let manager = EndpointManager::default();
        let _receiver = manager.create(&path, TransportMode::Datagram).unwrap();

        let err = manager.listen(&path, TransportMode::Stream, 1).unwrap_err();
        assert!(matches!(err, Error::AddressInUse(_)));
        assert!(path.exists());
    }

    #[test]
    fn closed_endpoint_leaves_a_rebindable_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("again.sock");
        let manager = EndpointManager::default();
        manager
            .listen(&path, TransportMode::Stream, 1)
            .unwrap()
            .close()
            .unwrap();
        assert_eq!(
            stale::probe_path(&path, TransportMode::Stream).unwrap(),
            stale::PathState::Stale
        );
        manager.listen(&path, TransportMode::Stream, 1).unwrap();
    }

    #[test]
    fn unlink_removes_the_lock_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("u.sock");
        let _listener = EndpointManager::default()
            .listen(&path, TransportMode::Stream, 1)
            .unwrap();
        assert!(lock::lock_path(&path).exists());
        unlink(&path).unwrap();
        assert!(!lock::lock_path(&path).exists());
        EndpointManager::default()
            .listen(&path, TransportMode::Stream, 1)
            .unwrap();
    }

    #[test]
    fn default_timeout_is_applied_to_connected_endpoints() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.sock");
        let manager = EndpointManager::new(EndpointOptions {
            receive_timeout_ms: 750,
            ..EndpointOptions::default()
        });
        let listener = manager.listen(&path, TransportMode::Stream, 1).unwrap();
        assert_eq!(listener.receive_timeout().unwrap(), None);

        let client = manager.connect(&path, TransportMode::Stream).unwrap();
        assert!(client.receive_timeout().unwrap().is_some());
        let peer = manager.accept(&listener).unwrap().unwrap();
        assert!(peer.receive_timeout().unwrap().is_some());
    }
}
