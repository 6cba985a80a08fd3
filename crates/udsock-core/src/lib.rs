//! udsock-core: Unix-domain socket endpoints
//!
//! Owned stream and datagram endpoints bound to filesystem paths, with a
//! small, explicit lifecycle:
//!
//! ```text
//! server: create ─────────────► (stream) accept once ─► Connected
//!         listen ─► Listening ─► accept ─► Connected (per peer)
//! client: connect ─► Connected
//! any:    read / write / set_receive_timeout / close_input / close_output / close
//! path:   unlink
//! ```
//!
//! # Modules
//!
//! - `manager`: lifecycle sequencing (`create`, `listen`, `accept`, `connect`, `unlink`)
//! - `endpoint`: the owned descriptor and its data operations
//! - `server` / `connection`: role-aware wrappers exposing `Read`/`Write` halves
//! - `stale`: what to do with an existing node at the bind path
//! - `lock`: advisory lock files marking a path as served
//! - `raw`: descriptor-and-integer entry points for foreign callers
//! - `addr`: `sockaddr_un` construction
//! - `mode`: transport mode and direction codes
//! - `config` / `logging`: `udsock.toml` and tracing setup
//! - `error`: error types with remediation hints
//!
//! # Safety
//!
//! Unsafe code is confined to the syscall layer and the raw-descriptor
//! entry points.

#![deny(unsafe_code)]

pub mod addr;
pub mod config;
pub mod connection;
pub mod endpoint;
pub mod error;
mod lock;
pub mod logging;
pub mod manager;
pub mod mode;
pub mod raw;
pub mod server;
pub mod stale;
mod sys;

pub use addr::SocketAddress;
pub use config::Config;
pub use connection::{Connection, Input, Output, Role};
pub use endpoint::{Endpoint, EndpointState};
pub use error::{ConfigError, Error, ErrorKind, Result, SocketCall};
pub use manager::{EndpointManager, EndpointOptions};
pub use mode::{Direction, TransportMode};
pub use server::{Server, ServerKind};
pub use stale::{PathState, StaleSocketPolicy, probe_path};
