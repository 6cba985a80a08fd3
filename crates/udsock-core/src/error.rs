//! Error types for udsock-core

use crate::mode::{Direction, TransportMode};
use std::fmt::{self, Write};
use std::io;
use thiserror::Error;

/// Remediation command for resolving an error
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RemediationCommand {
    /// Short label describing the command purpose
    pub label: String,
    /// Command to run
    pub command: String,
    /// Optional platform hint (e.g., "macOS", "Linux")
    pub platform: Option<String>,
}

/// Actionable remediation guidance for an error
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Remediation {
    /// One-line summary of how to fix the issue
    pub summary: String,
    /// Suggested commands to resolve or diagnose the issue
    pub commands: Vec<RemediationCommand>,
    /// Additional alternative guidance
    pub alternatives: Vec<String>,
}

impl Remediation {
    #[must_use]
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            commands: Vec::new(),
            alternatives: Vec::new(),
        }
    }

    #[must_use]
    pub fn command(mut self, label: impl Into<String>, command: impl Into<String>) -> Self {
        self.commands.push(RemediationCommand {
            label: label.into(),
            command: command.into(),
            platform: None,
        });
        self
    }

    #[must_use]
    pub fn platform_command(
        mut self,
        label: impl Into<String>,
        command: impl Into<String>,
        platform: impl Into<String>,
    ) -> Self {
        self.commands.push(RemediationCommand {
            label: label.into(),
            command: command.into(),
            platform: Some(platform.into()),
        });
        self
    }

    #[must_use]
    pub fn alternative(mut self, alternative: impl Into<String>) -> Self {
        self.alternatives.push(alternative.into());
        self
    }

    /// Render remediation text for human-readable output
    #[must_use]
    pub fn render_plain(&self) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "To fix:");
        let _ = writeln!(output, "  {}", self.summary);

        if !self.commands.is_empty() {
            let _ = writeln!(output, "  Commands:");
            for cmd in &self.commands {
                let label = cmd.platform.as_ref().map_or_else(
                    || cmd.label.clone(),
                    |platform| format!("{} ({platform})", cmd.label),
                );
                let _ = writeln!(output, "    - {label}: {}", cmd.command);
            }
        }

        if !self.alternatives.is_empty() {
            let _ = writeln!(output, "  Alternatives:");
            for alt in &self.alternatives {
                let _ = writeln!(output, "    - {alt}");
            }
        }

        output
    }
}

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// The system call that reported an OS-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketCall {
    Socket,
    Bind,
    Listen,
    Accept,
    Connect,
    Read,
    Write,
    SetSockOpt,
    GetSockOpt,
    Shutdown,
    Close,
    Unlink,
    Stat,
}

impl SocketCall {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Socket => "socket",
            Self::Bind => "bind",
            Self::Listen => "listen",
            Self::Accept => "accept",
            Self::Connect => "connect",
            Self::Read => "read",
            Self::Write => "write",
            Self::SetSockOpt => "setsockopt",
            Self::GetSockOpt => "getsockopt",
            Self::Shutdown => "shutdown",
            Self::Close => "close",
            Self::Unlink => "unlink",
            Self::Stat => "stat",
        }
    }
}

impl fmt::Display for SocketCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse classification callers can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before any syscall was attempted.
    Precondition,
    /// A syscall failed; the OS error is attached.
    Os,
    /// Configuration could not be loaded or validated.
    Config,
}

/// Main error type for udsock-core
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid endpoint descriptor {0}")]
    InvalidHandle(i32),

    #[error("unknown transport mode {0}; expected 0 (datagram) or 1 (stream)")]
    InvalidMode(i32),

    #[error("{operation} requires a {required} endpoint, got {actual}")]
    ModeMismatch {
        operation: &'static str,
        required: TransportMode,
        actual: TransportMode,
    },

    #[error("{operation} requires a listening endpoint")]
    NotListening { operation: &'static str },

    #[error("{operation} requires a connected endpoint")]
    NotConnected { operation: &'static str },

    #[error("{mode} {role} endpoints have no {direction} direction")]
    Unidirectional {
        role: &'static str,
        mode: TransportMode,
        direction: Direction,
    },

    #[error("socket path is empty")]
    EmptyPath,

    #[error("socket path contains a NUL byte: {0}")]
    PathContainsNul(String),

    #[error("socket path {path} is {len} bytes; at most {max} bytes fit")]
    PathTooLong {
        path: String,
        len: usize,
        max: usize,
    },

    #[error("buffer region at offset {offset} with length {len} exceeds buffer of {capacity} bytes")]
    BufferRange {
        offset: usize,
        len: usize,
        capacity: usize,
    },

    #[error("{0} exists and is not a socket")]
    NotASocket(String),

    #[error("{0} is held by a live endpoint")]
    AddressInUse(String),

    #[error("{operation}: {call}: {source}")]
    Os {
        operation: &'static str,
        call: SocketCall,
        #[source]
        source: io::Error,
    },

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl Error {
    pub(crate) fn os(operation: &'static str, call: SocketCall, source: io::Error) -> Self {
        Self::Os {
            operation,
            call,
            source,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Os { .. } => ErrorKind::Os,
            Self::Config(_) => ErrorKind::Config,
            _ => ErrorKind::Precondition,
        }
    }

    /// The failing syscall, for OS-level errors.
    #[must_use]
    pub fn call(&self) -> Option<SocketCall> {
        match self {
            Self::Os { call, .. } => Some(*call),
            _ => None,
        }
    }

    /// The raw OS error code, for OS-level errors.
    #[must_use]
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Os { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }

    /// The `std::io::ErrorKind` this error maps onto.
    #[must_use]
    pub fn io_kind(&self) -> io::ErrorKind {
        match self {
            Self::Os { source, .. } => source.kind(),
            Self::AddressInUse(_) => io::ErrorKind::AddrInUse,
            Self::NotASocket(_) => io::ErrorKind::AlreadyExists,
            Self::Unidirectional { .. } => io::ErrorKind::Unsupported,
            Self::NotConnected { .. } => io::ErrorKind::NotConnected,
            Self::Config(_) => io::ErrorKind::InvalidData,
            _ => io::ErrorKind::InvalidInput,
        }
    }

    /// True when a read gave up because the receive timeout elapsed.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Os { call: SocketCall::Read, source, .. }
                if matches!(source.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
        )
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.io_kind() == io::ErrorKind::NotFound
    }

    /// Return remediation guidance when available.
    #[must_use]
    pub fn remediation(&self) -> Option<Remediation> {
        match self {
            Self::InvalidHandle(_) => Some(
                Remediation::new("Create, listen on, or connect an endpoint before using it.")
                    .alternative("A negative descriptor means the endpoint was never opened."),
            ),
            Self::InvalidMode(_) => Some(Remediation::new(
                "Use 0 for datagram or 1 for stream when encoding the transport mode.",
            )),
            Self::ModeMismatch { required, .. } => Some(Remediation::new(format!(
                "Open the endpoint in {required} mode for this operation."
            ))),
            Self::NotListening { .. } => Some(
                Remediation::new("Call accept only on an endpoint returned by listen.")
                    .alternative("Use create for a single-peer server that accepts once."),
            ),
            Self::NotConnected { .. } => Some(
                Remediation::new("Accept a peer first and use the returned connection.")
                    .alternative("Listening endpoints carry no data themselves."),
            ),
            Self::Unidirectional { direction, .. } => Some(
                Remediation::new(format!(
                    "Datagram endpoints are one-way; the {direction} side is not available."
                ))
                .alternative("Use stream mode for bidirectional traffic."),
            ),
            Self::EmptyPath | Self::PathContainsNul(_) => Some(Remediation::new(
                "Pass a non-empty filesystem path without NUL bytes.",
            )),
            Self::PathTooLong { max, .. } => Some(
                Remediation::new(format!("Use a socket path of at most {max} bytes."))
                    .alternative("Place the socket in a shorter directory such as /tmp."),
            ),
            Self::BufferRange { .. } => Some(Remediation::new(
                "Keep offset + length within the buffer passed to read or write.",
            )),
            Self::NotASocket(path) => Some(
                Remediation::new(format!(
                    "Refusing to replace {path}: it is not a socket. Move it away or pick another path."
                ))
                .command("Inspect", format!("ls -l \"{path}\"")),
            ),
            Self::AddressInUse(path) => Some(
                Remediation::new(format!(
                    "Another process is serving {path}. Stop it or choose another path."
                ))
                .platform_command("Find owner", format!("ss -xlp | grep \"{path}\""), "Linux")
                .platform_command("Find owner", format!("lsof \"{path}\""), "macOS")
                .alternative("Set stale_socket = \"replace\" to restore unconditional replacement."),
            ),
            Self::Os { call, source, .. } => Some(os_remediation(*call, source)),
            Self::Config(err) => Some(err.remediation()),
        }
    }
}

fn os_remediation(call: SocketCall, source: &io::Error) -> Remediation {
    match source.kind() {
        io::ErrorKind::NotFound => Remediation::new(
            "The socket path does not exist. Start the server first or check the path.",
        )
        .command("Status", "udsock status <path>"),
        io::ErrorKind::ConnectionRefused => {
            Remediation::new("No endpoint is accepting on this path; the socket file is stale.")
                .command("Status", "udsock status <path>")
                .command("Remove", "udsock unlink <path>")
        }
        io::ErrorKind::PermissionDenied => Remediation::new(
            "Check permissions on the socket file and its parent directory.",
        ),
        io::ErrorKind::AddrInUse => Remediation::new("The path is already bound.")
            .command("Remove", "udsock unlink <path>"),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => Remediation::new(
            "The receive timeout elapsed before data arrived. Raise receive_timeout_ms or retry.",
        ),
        _ => Remediation::new(format!("The {call} call failed; see the OS error above.")),
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Os { source, .. } => source,
            other => io::Error::new(other.io_kind(), other),
        }
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to read config file {0}: {1}")]
    ReadFailed(String, String),

    #[error("Failed to parse config: {0}")]
    ParseFailed(String),

    #[error("Failed to serialize config: {0}")]
    SerializeFailed(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl ConfigError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::FileNotFound(path) => Remediation::new(format!(
                "Config file not found: {path}. Verify the path and retry."
            ))
            .command("Check path", format!("ls -l \"{path}\""))
            .alternative("Pass --config with the correct path."),
            Self::ReadFailed(path, _) => Remediation::new(format!(
                "Failed to read config file: {path}. Check permissions."
            ))
            .command("Check permissions", format!("ls -l \"{path}\"")),
            Self::ParseFailed(_) => Remediation::new("Config parse failed. Fix the TOML syntax.")
                .alternative("Remove unknown keys; every field has a default."),
            Self::SerializeFailed(_) => {
                Remediation::new("Config serialization failed. Check values for invalid types.")
            }
            Self::ValidationError(_) => {
                Remediation::new("Config validation failed. Adjust the offending value.")
            }
        }
    }
}

/// Render an error followed by its remediation block
#[must_use]
pub fn format_error_with_remediation(error: &Error) -> String {
    let mut output = format!("Error: {error}");
    if let Some(remediation) = error.remediation() {
        output.push('\n');
        output.push('\n');
        output.push_str(&remediation.render_plain());
    }
    output
}
