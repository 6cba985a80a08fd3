//! Advisory lock files marking a socket path as served.
//!
//! The endpoint that binds `<path>` holds an exclusive `flock` on
//! `<path>.lock` while its descriptor is open. Liveness is read from the lock
//! rather than by connecting, so a server waiting for its single peer never
//! has that accept taken by a status check.

use fs2::FileExt;
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

const LOCK_SUFFIX: &str = ".lock";

/// The lock file belonging to `socket`.
pub(crate) fn lock_path(socket: &Path) -> PathBuf {
    let mut name = OsString::from(socket.as_os_str());
    name.push(LOCK_SUFFIX);
    PathBuf::from(name)
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// A held lock on a socket path. Dropping it releases the lock; the file
/// stays behind until the socket node itself is unlinked.
#[derive(Debug)]
pub(crate) struct PathLock {
    _file: File,
    path: PathBuf,
    created: bool,
}

impl PathLock {
    /// Take the lock for `socket`, creating the lock file if needed.
    ///
    /// `Ok(None)` means another open endpoint holds it.
    pub(crate) fn acquire(socket: &Path) -> io::Result<Option<Self>> {
        let path = lock_path(socket);
        let (file, created) = match OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => (file, true),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => (
                OpenOptions::new().read(true).write(true).open(&path)?,
                false,
            ),
            Err(err) => return Err(err),
        };

        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!(lock = %path.display(), created, "acquired socket lock");
                Ok(Some(Self {
                    _file: file,
                    path,
                    created,
                }))
            }
            Err(err) if is_contended(&err) => {
                debug!(lock = %path.display(), "socket lock held elsewhere");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Whether this call created the lock file. An inherited file means some
    /// earlier endpoint bound the path and has since gone away.
    pub(crate) fn created(&self) -> bool {
        self.created
    }

    /// Release the lock and remove the lock file.
    pub(crate) fn discard(self) {
        remove_lock_file(&self.path);
    }
}

/// `Some(true)` while an endpoint holds the lock for `socket`, `Some(false)`
/// when the lock file is left over, `None` when there is no usable lock file.
pub(crate) fn is_held(socket: &Path) -> Option<bool> {
    let path = lock_path(socket);
    let file = File::open(&path).ok()?;
    match file.try_lock_exclusive() {
        Ok(()) => Some(false),
        Err(err) if is_contended(&err) => Some(true),
        Err(err) => {
            debug!(lock = %path.display(), error = %err, "lock check failed");
            None
        }
    }
}

/// Remove the lock file next to `socket`, if any.
pub(crate) fn remove_for(socket: &Path) {
    remove_lock_file(&lock_path(socket));
}

fn remove_lock_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(lock = %path.display(), "removed socket lock file"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => debug!(lock = %path.display(), error = %err, "removing socket lock file failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_file_sits_next_to_socket() {
        assert_eq!(
            lock_path(Path::new("/run/app/ctl.sock")),
            PathBuf::from("/run/app/ctl.sock.lock")
        );
    }

    #[test]
    fn second_acquire_is_contended_until_release() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("a.sock");

        let first = PathLock::acquire(&socket).unwrap().unwrap();
        assert!(first.created());
        assert!(PathLock::acquire(&socket).unwrap().is_none());
        assert_eq!(is_held(&socket), Some(true));

        drop(first);
        assert_eq!(is_held(&socket), Some(false));
        let again = PathLock::acquire(&socket).unwrap().unwrap();
        assert!(!again.created());
    }

    #[test]
    fn no_lock_file_means_unknown() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(is_held(&dir.path().join("foreign.sock")), None);
    }

    #[test]
    fn discard_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("b.sock");
        PathLock::acquire(&socket).unwrap().unwrap().discard();
        assert!(!lock_path(&socket).exists());
        assert_eq!(is_held(&socket), None);
    }

    #[test]
    fn acquire_in_missing_directory_fails() {
        let err = PathLock::acquire(Path::new("/nonexistent/dir/c.sock")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
