//! `sockaddr_un` construction for filesystem socket paths.

use crate::error::{Error, Result};
use crate::sys;
use std::fmt;
use std::mem;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

/// Bytes available in `sun_path` on this platform.
pub const SUN_PATH_CAPACITY: usize =
    mem::size_of::<libc::sockaddr_un>() - mem::offset_of!(libc::sockaddr_un, sun_path);

/// Longest path that still leaves room for the NUL terminator.
pub const MAX_PATH_LEN: usize = SUN_PATH_CAPACITY - 1;

const SUN_PATH_OFFSET: usize = mem::offset_of!(libc::sockaddr_un, sun_path);

/// A Unix-domain address bound to a filesystem path.
///
/// The structure is zero-filled before the path is copied in, and the length
/// handed to `bind`/`connect` is the `SUN_LEN` value: the header plus the
/// path bytes, not the full structure size.
#[derive(Clone)]
pub struct SocketAddress {
    raw: libc::sockaddr_un,
    len: libc::socklen_t,
    path: PathBuf,
}

impl SocketAddress {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = path.as_os_str().as_bytes();

        if bytes.is_empty() {
            return Err(Error::EmptyPath);
        }
        if bytes.contains(&0) {
            return Err(Error::PathContainsNul(path.display().to_string()));
        }
        if bytes.len() > MAX_PATH_LEN {
            return Err(Error::PathTooLong {
                path: path.display().to_string(),
                len: bytes.len(),
                max: MAX_PATH_LEN,
            });
        }

        let mut raw = sys::zeroed_sockaddr_un();
        raw.sun_family = libc::AF_UNIX as libc::sa_family_t;
        for (dst, src) in raw.sun_path.iter_mut().zip(bytes) {
            *dst = *src as libc::c_char;
        }

        Ok(Self {
            raw,
            len: (SUN_PATH_OFFSET + bytes.len()) as libc::socklen_t,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Effective address length: `offsetof(sun_path) + strlen(path)`.
    pub fn effective_len(&self) -> libc::socklen_t {
        self.len
    }

    /// The complete `sun_path` field, including the zero fill after the path.
    pub fn sun_path(&self) -> Vec<u8> {
        self.raw.sun_path.iter().map(|&c| c as u8).collect()
    }

    pub(crate) fn as_ptr(&self) -> *const libc::sockaddr {
        std::ptr::from_ref(&self.raw).cast()
    }
}

impl fmt::Debug for SocketAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketAddress")
            .field("path", &self.path)
            .field("len", &self.len)
            .finish()
    }
}
