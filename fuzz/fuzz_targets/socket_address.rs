#![no_main]

use libfuzzer_sys::fuzz_target;
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use udsock_core::addr::{MAX_PATH_LEN, SUN_PATH_CAPACITY};
use udsock_core::{Error, SocketAddress, TransportMode};

fuzz_target!(|data: &[u8]| {
    if let Some((&first, rest)) = data.split_first() {
        let code = i32::from(first as i8);
        match TransportMode::try_from(code) {
            Ok(mode) => assert_eq!(mode.code(), code),
            Err(err) => assert!(matches!(err, Error::InvalidMode(c) if c == code)),
        }

        match SocketAddress::new(OsStr::from_bytes(rest)) {
            Ok(addr) => {
                assert!(!rest.is_empty() && rest.len() <= MAX_PATH_LEN);
                assert!(!rest.contains(&0));
                let sun_path = addr.sun_path();
                assert_eq!(sun_path.len(), SUN_PATH_CAPACITY);
                assert_eq!(&sun_path[..rest.len()], rest);
                assert!(sun_path[rest.len()..].iter().all(|&b| b == 0));
            }
            Err(Error::EmptyPath) => assert!(rest.is_empty()),
            Err(Error::PathContainsNul(_)) => assert!(rest.contains(&0)),
            Err(Error::PathTooLong { len, .. }) => assert!(len > MAX_PATH_LEN),
            Err(other) => panic!("unexpected error {other}"),
        }
    }
});
