//! Handling of whatever already occupies a socket path before `bind`.
//!
//! A socket file outlives the process that bound it, so a crashed server
//! leaves a node behind that makes the next `bind` fail with `EADDRINUSE`.
//! Removing it unconditionally would also remove a live server's socket, so
//! the default policy checks the path's lock first.

use crate::error::{Error, Result, SocketCall};
use crate::lock::{self, PathLock};
use crate::mode::TransportMode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::os::unix::fs::FileTypeExt;
use std::os::unix::net::{UnixDatagram, UnixStream};
use std::path::Path;
use tracing::{debug, warn};

/// What to do with an existing filesystem object at the bind path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StaleSocketPolicy {
    /// Remove the path only when it is a socket nobody is serving.
    #[default]
    Probe,
    /// Remove whatever is there, best-effort, without checking.
    Replace,
}

impl fmt::Display for StaleSocketPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Probe => "probe",
            Self::Replace => "replace",
        })
    }
}

/// Classification of a socket path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PathState {
    /// Nothing exists at the path.
    Missing,
    /// Something other than a socket exists at the path.
    NotSocket,
    /// A socket node exists but nothing accepts on it.
    Stale,
    /// A socket node exists and an endpoint is serving it.
    Live,
}

impl fmt::Display for PathState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Missing => "missing",
            Self::NotSocket => "not_socket",
            Self::Stale => "stale",
            Self::Live => "live",
        })
    }
}

/// Classify `path` without touching a server that may be serving it.
///
/// Paths bound through this crate carry a lock file, whose lock tells live
/// from stale directly. Sockets without one fall back to a connect attempt
/// of the given mode, which a foreign stream server sees as a connection
/// that closes at once.
pub fn probe_path(path: &Path, mode: TransportMode) -> Result<PathState> {
    if let Some(state) = inspect_node(path)? {
        return Ok(state);
    }
    match lock::is_held(path) {
        Some(true) => Ok(PathState::Live),
        Some(false) => Ok(PathState::Stale),
        None => connect_state(path, mode),
    }
}

/// `Missing` or `NotSocket`, or `None` when a socket node is present.
fn inspect_node(path: &Path) -> Result<Option<PathState>> {
    match std::fs::symlink_metadata(path) {
        Ok(metadata) if metadata.file_type().is_socket() => Ok(None),
        Ok(_) => Ok(Some(PathState::NotSocket)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Some(PathState::Missing)),
        Err(err) => Err(Error::os("probe", SocketCall::Stat, err)),
    }
}

fn connect_state(path: &Path, mode: TransportMode) -> Result<PathState> {
    let attempt = match mode {
        TransportMode::Stream => UnixStream::connect(path).map(drop),
        TransportMode::Datagram => {
            let socket =
                UnixDatagram::unbound().map_err(|e| Error::os("probe", SocketCall::Socket, e))?;
            socket.connect(path)
        }
    };

    match attempt {
        Ok(()) => Ok(PathState::Live),
        Err(err)
            if matches!(
                err.kind(),
                io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound
            ) =>
        {
            Ok(PathState::Stale)
        }
        // A live socket of the other type answers with EPROTOTYPE.
        Err(err) if err.raw_os_error() == Some(libc::EPROTOTYPE) => Ok(PathState::Live),
        Err(err) => Err(Error::os("probe", SocketCall::Connect, err)),
    }
}

/// Make `path` available for `bind` according to `policy`.
///
/// Returns the path lock to keep for as long as the bound descriptor lives.
/// `None` means the lock file could not be used (or, under `Replace`, was
/// held by another endpoint); the bind goes ahead regardless.
pub(crate) fn clear_path(
    operation: &'static str,
    path: &Path,
    mode: TransportMode,
    policy: StaleSocketPolicy,
) -> Result<Option<PathLock>> {
    match policy {
        StaleSocketPolicy::Replace => {
            let lock = PathLock::acquire(path).unwrap_or_else(|err| {
                debug!(path = %path.display(), error = %err, "socket lock unavailable");
                None
            });
            if let Err(err) = std::fs::remove_file(path) {
                if err.kind() != io::ErrorKind::NotFound {
                    debug!(
                        path = %path.display(),
                        error = %err,
                        "best-effort unlink before bind failed"
                    );
                }
            }
            Ok(lock)
        }
        StaleSocketPolicy::Probe => {
            let node = inspect_node(path)?;
            if node == Some(PathState::NotSocket) {
                return Err(Error::NotASocket(path.display().to_string()));
            }

            let lock = match PathLock::acquire(path) {
                Ok(Some(lock)) => Some(lock),
                Ok(None) => return Err(Error::AddressInUse(path.display().to_string())),
                Err(err) => {
                    debug!(path = %path.display(), error = %err, "socket lock unavailable");
                    None
                }
            };
            if node == Some(PathState::Missing) {
                return Ok(lock);
            }

            // A lock file left behind by an earlier endpoint vouches for the
            // node being stale; otherwise the node may belong to a foreign
            // server and only a connect can tell.
            let state = match &lock {
                Some(held) if !held.created() => Ok(PathState::Stale),
                _ => connect_state(path, mode),
            };
            match state {
                Ok(PathState::Stale) => {}
                Ok(_) => {
                    if let Some(fresh) = lock {
                        fresh.discard();
                    }
                    return Err(Error::AddressInUse(path.display().to_string()));
                }
                Err(err) => {
                    if let Some(fresh) = lock {
                        fresh.discard();
                    }
                    return Err(err);
                }
            }

            match std::fs::remove_file(path) {
                Ok(()) => {
                    warn!(path = %path.display(), %mode, "removed stale socket before bind");
                    Ok(lock)
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(lock),
                Err(err) => Err(Error::os(operation, SocketCall::Unlink, err)),
            }
        }
    }
}
