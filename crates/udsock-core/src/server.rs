//! The bound side of a socket path.

use crate::connection::{Connection, Input, Output, Role, check_direction};
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::lock;
use crate::manager::{self, EndpointManager};
use crate::mode::{Direction, TransportMode};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// How the server was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerKind {
    /// `create`: one accepted stream peer, or a bound datagram receiver.
    SinglePeer,
    /// `listen`: a stream listener that hands out connections.
    Listener,
}

/// Removes the socket node and its lock file when dropped, if armed.
#[derive(Debug)]
struct PathGuard {
    path: PathBuf,
    armed: bool,
}

impl Drop for PathGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "unlinked on drop"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "unlink on drop failed");
                return;
            }
        }
        lock::remove_for(&self.path);
    }
}

/// An endpoint bound to a filesystem path.
#[derive(Debug)]
pub struct Server {
    endpoint: Endpoint,
    guard: PathGuard,
    manager: EndpointManager,
    kind: ServerKind,
}

impl Server {
    /// Bind `path` and wait for one stream peer, or bind a datagram receiver.
    pub fn create(
        manager: &EndpointManager,
        path: impl AsRef<Path>,
        mode: TransportMode,
    ) -> Result<Self> {
        let path = path.as_ref();
        let endpoint = manager.create(path, mode)?;
        Ok(Self::wrap(manager, path, endpoint, ServerKind::SinglePeer))
    }

    /// Bind `path` and listen; datagram mode yields a bound receiver.
    pub fn listen(
        manager: &EndpointManager,
        path: impl AsRef<Path>,
        mode: TransportMode,
        backlog: u32,
    ) -> Result<Self> {
        let path = path.as_ref();
        let endpoint = manager.listen(path, mode, backlog)?;
        let kind = match mode {
            TransportMode::Stream => ServerKind::Listener,
            TransportMode::Datagram => ServerKind::SinglePeer,
        };
        Ok(Self::wrap(manager, path, endpoint, kind))
    }

    fn wrap(manager: &EndpointManager, path: &Path, endpoint: Endpoint, kind: ServerKind) -> Self {
        Self {
            endpoint,
            guard: PathGuard {
                path: path.to_path_buf(),
                armed: false,
            },
            manager: manager.clone(),
            kind,
        }
    }

    pub fn path(&self) -> &Path {
        &self.guard.path
    }

    pub fn kind(&self) -> ServerKind {
        self.kind
    }

    pub fn mode(&self) -> TransportMode {
        self.endpoint.mode()
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Remove the socket node automatically when the server is dropped.
    pub fn set_unlink_on_drop(&mut self, unlink: bool) {
        self.guard.armed = unlink;
    }

    pub fn unlink_on_drop(&self) -> bool {
        self.guard.armed
    }

    /// Accept the next peer on a stream listener.
    pub fn accept(&self) -> Result<Connection> {
        if self.endpoint.mode() == TransportMode::Datagram {
            return Err(Error::ModeMismatch {
                operation: "accept",
                required: TransportMode::Stream,
                actual: TransportMode::Datagram,
            });
        }
        if self.kind == ServerKind::SinglePeer {
            return Err(Error::NotListening {
                operation: "accept",
            });
        }
        self.manager
            .accept(&self.endpoint)?
            .map(Connection::peer)
            .ok_or(Error::NotListening {
                operation: "accept",
            })
    }

    /// The receive half of a single-peer server.
    pub fn input(&self) -> Result<Input<'_>> {
        check_direction(Role::Server, &self.endpoint, Direction::Input, "input")?;
        Ok(Input::new(&self.endpoint))
    }

    /// The send half of a single-peer stream server.
    pub fn output(&self) -> Result<Output<'_>> {
        check_direction(Role::Server, &self.endpoint, Direction::Output, "output")?;
        Ok(Output::new(&self.endpoint))
    }

    pub fn set_receive_timeout(&self, millis: u32) -> Result<()> {
        self.endpoint.set_receive_timeout(millis)
    }

    /// Remove the socket node now. The endpoint stays open.
    pub fn unlink(&mut self) -> Result<()> {
        manager::unlink(&self.guard.path)?;
        self.guard.armed = false;
        Ok(())
    }

    /// Close the endpoint, then unlink the path if armed.
    pub fn close(self) -> Result<()> {
        let Self {
            endpoint, guard, ..
        } = self;
        let result = endpoint.close();
        drop(guard);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::os::unix::net::UnixStream;

    #[test]
    fn listener_hands_out_bidirectional_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("srv.sock");
        let manager = EndpointManager::default();
        let server = Server::listen(&manager, &path, TransportMode::Stream, 4).unwrap();
        assert_eq!(server.kind(), ServerKind::Listener);

        let mut client = UnixStream::connect(&path).unwrap();
        let peer = server.accept().unwrap();
        assert_eq!(peer.role(), Role::Peer);

        client.write_all(b"ping").unwrap();
        let mut buf = [0u8; 4];
        peer.input().unwrap().read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");
        peer.output().unwrap().write_all(b"pong").unwrap();
        client.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"pong");
    }

    #[test]
    fn listening_server_has_no_data_halves() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nodata.sock");
        let server =
            Server::listen(&EndpointManager::default(), &path, TransportMode::Stream, 1).unwrap();
        assert!(matches!(
            server.input(),
            Err(Error::NotConnected { operation: "input" })
        ));
        assert!(matches!(
            server.output(),
            Err(Error::NotConnected { operation: "output" })
        ));
    }

    #[test]
    fn datagram_server_rejects_accept_and_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dgram.sock");
        let server =
            Server::create(&EndpointManager::default(), &path, TransportMode::Datagram).unwrap();
        assert!(matches!(server.accept(), Err(Error::ModeMismatch { .. })));
        assert!(server.input().is_ok());
        assert!(matches!(
            server.output(),
            Err(Error::Unidirectional { role: "server", .. })
        ));
    }

    #[test]
    fn unlink_on_drop_removes_the_node() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drop.sock");
        let mut server =
            Server::listen(&EndpointManager::default(), &path, TransportMode::Stream, 1).unwrap();
        server.set_unlink_on_drop(true);
        assert!(path.exists());
        drop(server);
        assert!(!path.exists());
        assert!(!lock::lock_path(&path).exists());
    }

    #[test]
    fn node_survives_drop_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keep.sock");
        let server =
            Server::listen(&EndpointManager::default(), &path, TransportMode::Stream, 1).unwrap();
        server.close().unwrap();
        assert!(path.exists());
        let again =
            Server::listen(&EndpointManager::default(), &path, TransportMode::Stream, 1).unwrap();
        assert!(again.endpoint().holds_path_lock());
    }

    #[test]
    fn explicit_unlink_disarms_guard() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("explicit.sock");
        let mut server =
            Server::listen(&EndpointManager::default(), &path, TransportMode::Stream, 1).unwrap();
        server.set_unlink_on_drop(true);
        server.unlink().unwrap();
        assert!(!path.exists());
        assert!(!server.unlink_on_drop());
        assert!(server.unlink().unwrap_err().is_not_found());
    }
}
