//! Transport mode and transfer direction.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How bytes travel over an endpoint. Fixed when the endpoint is opened.
///
/// The integer encoding (`0` = datagram, `1` = stream) is an external
/// contract; use [`TransportMode::try_from`] to decode it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Connectionless, boundary-preserving delivery (`SOCK_DGRAM`).
    Datagram,
    /// Connection-oriented, ordered byte stream (`SOCK_STREAM`).
    #[default]
    Stream,
}

impl TransportMode {
    /// The socket type passed to `socket(2)`.
    #[must_use]
    pub fn sock_type(self) -> libc::c_int {
        match self {
            Self::Datagram => libc::SOCK_DGRAM,
            Self::Stream => libc::SOCK_STREAM,
        }
    }

    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Datagram => 0,
            Self::Stream => 1,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Datagram => "datagram",
            Self::Stream => "stream",
        }
    }
}

impl TryFrom<i32> for TransportMode {
    type Error = Error;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Datagram),
            1 => Ok(Self::Stream),
            other => Err(Error::InvalidMode(other)),
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TransportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "datagram" | "dgram" => Ok(Self::Datagram),
            "stream" => Ok(Self::Stream),
            _ => Err(format!(
                "unknown transport mode: {s}. Expected one of: stream, datagram"
            )),
        }
    }
}

/// One side of a full-duplex endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// The receive side (`SHUT_RD`).
    Input,
    /// The send side (`SHUT_WR`).
    Output,
}

impl Direction {
    pub(crate) fn shutdown_how(self) -> libc::c_int {
        match self {
            Self::Input => libc::SHUT_RD,
            Self::Output => libc::SHUT_WR,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Input => "input",
            Self::Output => "output",
        })
    }
}
