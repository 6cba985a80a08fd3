//! Role-aware wrappers that expose an endpoint as `Read`/`Write` halves.
//!
//! Datagram endpoints are one-way: the bound (server) side only receives and
//! the connecting (client) side only sends. Stream endpoints carry both
//! directions.

use crate::endpoint::{Endpoint, EndpointState};
use crate::error::{Error, Result};
use crate::manager::EndpointManager;
use crate::mode::{Direction, TransportMode};
use std::io::{self, Read, Write};
use std::path::Path;

/// Which side of the rendezvous an endpoint was opened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Bound to the path (`create`/`listen`).
    Server,
    /// Accepted from a listening server.
    Peer,
    /// Connected to the path (`connect`).
    Client,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::Peer => "peer",
            Self::Client => "client",
        }
    }
}

/// Check that `direction` may be used on an endpoint of this role and mode.
pub(crate) fn check_direction(
    role: Role,
    endpoint: &Endpoint,
    direction: Direction,
    operation: &'static str,
) -> Result<()> {
    if endpoint.state() == EndpointState::Listening {
        return Err(Error::NotConnected { operation });
    }
    let allowed = match (endpoint.mode(), role) {
        (TransportMode::Stream, _) => true,
        (TransportMode::Datagram, Role::Server) => direction == Direction::Input,
        (TransportMode::Datagram, Role::Client | Role::Peer) => direction == Direction::Output,
    };
    if allowed {
        Ok(())
    } else {
        Err(Error::Unidirectional {
            role: role.as_str(),
            mode: endpoint.mode(),
            direction,
        })
    }
}

/// A connected endpoint together with its role.
#[derive(Debug)]
pub struct Connection {
    endpoint: Endpoint,
    role: Role,
}

impl Connection {
    /// Connect to the server at `path`.
    pub fn connect(
        manager: &EndpointManager,
        path: impl AsRef<Path>,
        mode: TransportMode,
    ) -> Result<Self> {
        Ok(Self {
            endpoint: manager.connect(path, mode)?,
            role: Role::Client,
        })
    }

    pub(crate) fn peer(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            role: Role::Peer,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn into_endpoint(self) -> Endpoint {
        self.endpoint
    }

    /// The receive half; fails for a datagram client.
    pub fn input(&self) -> Result<Input<'_>> {
        check_direction(self.role, &self.endpoint, Direction::Input, "input")?;
        Ok(Input {
            endpoint: &self.endpoint,
        })
    }

    /// The send half; fails for a datagram server.
    pub fn output(&self) -> Result<Output<'_>> {
        check_direction(self.role, &self.endpoint, Direction::Output, "output")?;
        Ok(Output {
            endpoint: &self.endpoint,
        })
    }

    pub fn set_receive_timeout(&self, millis: u32) -> Result<()> {
        self.endpoint.set_receive_timeout(millis)
    }

    pub fn close(self) -> Result<()> {
        self.endpoint.close()
    }
}

/// Receive half of an endpoint.
#[derive(Debug, Clone, Copy)]
pub struct Input<'a> {
    endpoint: &'a Endpoint,
}

impl<'a> Input<'a> {
    pub(crate) fn new(endpoint: &'a Endpoint) -> Self {
        Self { endpoint }
    }

    /// Shut down the receive direction of the underlying endpoint.
    pub fn close(self) -> Result<()> {
        self.endpoint.close_input()
    }
}

impl Read for Input<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(&mut &*self.endpoint, buf)
    }
}

/// Send half of an endpoint.
#[derive(Debug, Clone, Copy)]
pub struct Output<'a> {
    endpoint: &'a Endpoint,
}

impl<'a> Output<'a> {
    pub(crate) fn new(endpoint: &'a Endpoint) -> Self {
        Self { endpoint }
    }

    /// Shut down the send direction; the peer reads end of stream.
    pub fn close(self) -> Result<()> {
        self.endpoint.close_output()
    }
}

impl Write for Output<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Write::write(&mut &*self.endpoint, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::AsRawFd;
    use std::os::unix::net::{UnixDatagram, UnixStream};

    fn endpoint(fd: impl Into<std::os::fd::OwnedFd>, mode: TransportMode, state: EndpointState) -> Endpoint {
        Endpoint::new(fd.into(), mode, state)
    }

    #[test]
    fn stream_connections_have_both_halves() {
        let (a, b) = UnixStream::pair().unwrap();
        let client = Connection {
            endpoint: endpoint(a, TransportMode::Stream, EndpointState::Connected),
            role: Role::Client,
        };
        let peer = Connection::peer(endpoint(b, TransportMode::Stream, EndpointState::Connected));

        client.output().unwrap().write_all(b"abc").unwrap();
        let mut buf = [0u8; 3];
        peer.input().unwrap().read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"abc");

        peer.output().unwrap().write_all(b"z").unwrap();
        let mut one = [0u8; 1];
        client.input().unwrap().read_exact(&mut one).unwrap();
        assert_eq!(&one, b"z");
    }

    #[test]
    fn datagram_client_is_send_only() {
        let (a, _b) = UnixDatagram::pair().unwrap();
        let client = Connection {
            endpoint: endpoint(a, TransportMode::Datagram, EndpointState::Connected),
            role: Role::Client,
        };
        assert!(client.output().is_ok());
        match client.input() {
            Err(Error::Unidirectional {
                role, direction, ..
            }) => {
                assert_eq!(role, "client");
                assert_eq!(direction, Direction::Input);
            }
            other => panic!("expected Unidirectional, got {other:?}"),
        }
    }

    #[test]
    fn datagram_server_is_receive_only() {
        let (a, _b) = UnixDatagram::pair().unwrap();
        let server = endpoint(a, TransportMode::Datagram, EndpointState::Bound);
        assert!(check_direction(Role::Server, &server, Direction::Input, "input").is_ok());
        assert!(matches!(
            check_direction(Role::Server, &server, Direction::Output, "output"),
            Err(Error::Unidirectional { .. })
        ));
    }

    #[test]
    fn closing_output_half_signals_eof() {
        let (a, b) = UnixStream::pair().unwrap();
        let client = Connection {
            endpoint: endpoint(a, TransportMode::Stream, EndpointState::Connected),
            role: Role::Client,
        };
        let peer = Connection::peer(endpoint(b, TransportMode::Stream, EndpointState::Connected));

        let mut out = client.output().unwrap();
        out.write_all(b"last").unwrap();
        out.close().unwrap();

        let mut received = Vec::new();
        peer.input().unwrap().read_to_end(&mut received).unwrap();
        assert_eq!(received, b"last");
    }

    #[test]
    fn into_endpoint_keeps_the_open_descriptor() {
        let (a, b) = UnixStream::pair().unwrap();
        let peer = Connection::peer(endpoint(a, TransportMode::Stream, EndpointState::Connected));
        let raw = peer.endpoint().as_raw_fd();

        let bare = peer.into_endpoint();
        assert_eq!(bare.as_raw_fd(), raw);
        assert_eq!(bare.state(), EndpointState::Connected);
        assert_eq!(bare.write_region(b"kept", 0, 4).unwrap(), 4);

        let mut buf = [0u8; 4];
        (&b).read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"kept");
    }
}
