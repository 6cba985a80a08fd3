//! Checked wrappers over the libc socket calls.
//!
//! Every function performs exactly one syscall and converts a `-1` return
//! into `io::Error::last_os_error()`. Nothing here retries on `EINTR`.

#![allow(unsafe_code)]

use crate::addr::SocketAddress;
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, IntoRawFd, OwnedFd};

fn cvt(ret: libc::c_int) -> io::Result<libc::c_int> {
    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

fn cvt_size(ret: libc::ssize_t) -> io::Result<usize> {
    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret as usize)
    }
}

pub(crate) fn zeroed_sockaddr_un() -> libc::sockaddr_un {
    // SAFETY: sockaddr_un is plain old data; all-zero is a valid value.
    unsafe { mem::zeroed() }
}

pub(crate) fn socket(sock_type: libc::c_int) -> io::Result<OwnedFd> {
    #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
    let sock_type = sock_type | libc::SOCK_CLOEXEC;

    // SAFETY: plain syscall with no pointer arguments.
    let fd = cvt(unsafe { libc::socket(libc::AF_UNIX, sock_type, 0) })?;
    // SAFETY: socket(2) just returned this descriptor and nobody else owns it.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

pub(crate) fn bind(fd: BorrowedFd<'_>, addr: &SocketAddress) -> io::Result<()> {
    // SAFETY: the address pointer and length come from a live SocketAddress.
    cvt(unsafe { libc::bind(fd.as_raw_fd(), addr.as_ptr(), addr.effective_len()) })?;
    Ok(())
}

pub(crate) fn listen(fd: BorrowedFd<'_>, backlog: libc::c_int) -> io::Result<()> {
    // SAFETY: plain syscall with no pointer arguments.
    cvt(unsafe { libc::listen(fd.as_raw_fd(), backlog) })?;
    Ok(())
}

pub(crate) fn accept(fd: BorrowedFd<'_>) -> io::Result<OwnedFd> {
    // The peer address of a Unix client is usually unnamed, so it is not
    // collected.
    #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
    // SAFETY: null address out-pointers are permitted by accept4(2).
    let peer = cvt(unsafe {
        libc::accept4(
            fd.as_raw_fd(),
            std::ptr::null_mut(),
            std::ptr::null_mut(),
            libc::SOCK_CLOEXEC,
        )
    })?;
    #[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
    // SAFETY: null address out-pointers are permitted by accept(2).
    let peer = cvt(unsafe {
        libc::accept(fd.as_raw_fd(), std::ptr::null_mut(), std::ptr::null_mut())
    })?;

    // SAFETY: accept just returned this descriptor and nobody else owns it.
    Ok(unsafe { OwnedFd::from_raw_fd(peer) })
}

pub(crate) fn connect(fd: BorrowedFd<'_>, addr: &SocketAddress) -> io::Result<()> {
    // SAFETY: the address pointer and length come from a live SocketAddress.
    cvt(unsafe { libc::connect(fd.as_raw_fd(), addr.as_ptr(), addr.effective_len()) })?;
    Ok(())
}

pub(crate) fn read(fd: BorrowedFd<'_>, buf: &mut [u8]) -> io::Result<usize> {
    // SAFETY: the pointer and length describe a writable slice.
    cvt_size(unsafe { libc::read(fd.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len()) })
}

pub(crate) fn write(fd: BorrowedFd<'_>, buf: &[u8]) -> io::Result<usize> {
    // SAFETY: the pointer and length describe a readable slice.
    cvt_size(unsafe { libc::write(fd.as_raw_fd(), buf.as_ptr().cast(), buf.len()) })
}

/// Split milliseconds into the `timeval` used by `SO_RCVTIMEO`.
pub(crate) fn millis_to_timeval(millis: u32) -> libc::timeval {
    libc::timeval {
        tv_sec: (millis / 1000) as libc::time_t,
        tv_usec: ((millis % 1000) * 1000) as libc::suseconds_t,
    }
}

pub(crate) fn set_receive_timeout(fd: BorrowedFd<'_>, timeout: libc::timeval) -> io::Result<()> {
    // SAFETY: the option value points at a timeval of the advertised size.
    cvt(unsafe {
        libc::setsockopt(
            fd.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_RCVTIMEO,
            std::ptr::from_ref(&timeout).cast(),
            mem::size_of::<libc::timeval>() as libc::socklen_t,
        )
    })?;
    Ok(())
}

pub(crate) fn receive_timeout(fd: BorrowedFd<'_>) -> io::Result<libc::timeval> {
    let mut timeout = libc::timeval {
        tv_sec: 0,
        tv_usec: 0,
    };
    let mut len = mem::size_of::<libc::timeval>() as libc::socklen_t;
    // SAFETY: the out-pointer refers to a timeval and len holds its size.
    cvt(unsafe {
        libc::getsockopt(
            fd.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_RCVTIMEO,
            std::ptr::from_mut(&mut timeout).cast(),
            &mut len,
        )
    })?;
    Ok(timeout)
}

pub(crate) fn shutdown(fd: BorrowedFd<'_>, how: libc::c_int) -> io::Result<()> {
    // SAFETY: plain syscall with no pointer arguments.
    cvt(unsafe { libc::shutdown(fd.as_raw_fd(), how) })?;
    Ok(())
}

/// Release the descriptor and report what `close(2)` said about it.
pub(crate) fn close(fd: OwnedFd) -> io::Result<()> {
    let raw = fd.into_raw_fd();
    // SAFETY: ownership of `raw` was just taken from the OwnedFd, so this is
    // the only close it will see.
    cvt(unsafe { libc::close(raw) })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::AsFd;

    #[test]
    fn timeval_split() {
        let tv = millis_to_timeval(1500);
        assert_eq!(tv.tv_sec, 1);
        assert_eq!(tv.tv_usec, 500_000);

        let tv = millis_to_timeval(999);
        assert_eq!(tv.tv_sec, 0);
        assert_eq!(tv.tv_usec, 999_000);

        let tv = millis_to_timeval(0);
        assert_eq!((tv.tv_sec, tv.tv_usec), (0, 0));
    }

    #[test]
    fn receive_timeout_round_trips_through_the_kernel() {
        let fd = socket(libc::SOCK_STREAM).unwrap();
        set_receive_timeout(fd.as_fd(), millis_to_timeval(250)).unwrap();
        let tv = receive_timeout(fd.as_fd()).unwrap();
        assert_eq!(tv.tv_sec, 0);
        // Kernels round to their tick; allow some slack.
        assert!(tv.tv_usec >= 200_000 && tv.tv_usec <= 260_000, "{}", tv.tv_usec);
        close(fd).unwrap();
    }

    #[test]
    fn shutdown_of_unconnected_unix_stream_is_accepted() {
        let fd = socket(libc::SOCK_STREAM).unwrap();
        shutdown(fd.as_fd(), libc::SHUT_RDWR).unwrap();
    }

    #[test]
    fn shutdown_of_non_socket_reports_enotsock() {
        let file = std::fs::File::open("/dev/null").unwrap();
        let err = shutdown(file.as_fd(), libc::SHUT_RDWR).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ENOTSOCK));
    }
}
