//! Entry points for callers that only hold bare descriptors and integer mode
//! codes, such as a foreign-language binding.
//!
//! Arguments are validated before any syscall: a negative descriptor is
//! [`Error::InvalidHandle`] and a mode code other than `0`/`1` is
//! [`Error::InvalidMode`]. Results move straight into owned [`Endpoint`]s.

#![allow(unsafe_code)]

use crate::endpoint::{Endpoint, EndpointState};
use crate::error::{Error, Result, SocketCall};
use crate::mode::TransportMode;
use crate::sys;
use std::os::fd::{AsFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use tracing::trace;

fn check_handle(fd: RawFd) -> Result<()> {
    if fd < 0 {
        return Err(Error::InvalidHandle(fd));
    }
    Ok(())
}

/// Accept a peer on the listening descriptor `listener`.
///
/// Datagram mode (`0`) returns `Ok(None)` without a syscall.
///
/// # Safety
///
/// When `listener` is non-negative it must be an open descriptor that stays
/// open for the duration of the call.
pub unsafe fn accept(listener: RawFd, mode: i32) -> Result<Option<Endpoint>> {
    check_handle(listener)?;
    let mode = TransportMode::try_from(mode)?;
    if mode == TransportMode::Datagram {
        return Ok(None);
    }

    // SAFETY: the caller guarantees `listener` is open for this call.
    let fd = unsafe { BorrowedFd::borrow_raw(listener) };
    let peer = sys::accept(fd).map_err(|e| Error::os("accept", SocketCall::Accept, e))?;
    Ok(Some(Endpoint::new(
        peer,
        TransportMode::Stream,
        EndpointState::Connected,
    )))
}

/// Shut down and close `fd`, taking ownership of it.
///
/// # Safety
///
/// When `fd` is non-negative it must be an open descriptor owned by the
/// caller; it must not be used again after this call.
pub unsafe fn close(fd: RawFd) -> Result<()> {
    check_handle(fd)?;
    // SAFETY: the caller hands over ownership of `fd`.
    let owned = unsafe { OwnedFd::from_raw_fd(fd) };
    if let Err(err) = sys::shutdown(owned.as_fd(), libc::SHUT_RDWR) {
        trace!(fd, error = %err, "shutdown before close failed");
    }
    sys::close(owned).map_err(|e| Error::os("close", SocketCall::Close, e))
}
