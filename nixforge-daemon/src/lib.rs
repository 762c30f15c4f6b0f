//! Synchronous client for the build daemon's Unix-socket wire protocol:
//! handshake, log-stream draining, and the narrow family of operations the
//! core needs (path validity, path info, text-addition, and build
//! requests). This never builds anything itself - it only speaks the
//! protocol that would ask another process to.
mod client;
mod errors;
mod path_info;
mod protocol_version;
mod wire;
mod worker_protocol;

pub use client::{DaemonClient, DEFAULT_SOCKET_PATH};
pub use errors::ClientError;
pub use path_info::PathInfo;
pub use protocol_version::{ProtocolVersion, CLIENT_PROTOCOL_VERSION, MIN_PROTOCOL_VERSION};
pub use worker_protocol::BUILD_MODE_NORMAL;
