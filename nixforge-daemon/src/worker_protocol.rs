//! Wire constants for the worker protocol: magic numbers, opcodes, and
//! stderr frame tags, cross-checked against `pix/daemon.py`'s trimmed-down
//! opcode set for exactly which operations this client needs to speak.

pub const WORKER_MAGIC_1: u64 = 0x6e697863; // "nixc"
pub const WORKER_MAGIC_2: u64 = 0x6478696f; // "dxio"

/// Protocol version at/above which the daemon sends its Nix version string
/// as part of the handshake.
pub const VERSION_STRING_SINCE_MINOR: u8 = 33;

/// Protocol version at/above which the daemon sends a trust-level code.
pub const TRUST_LEVEL_SINCE_MINOR: u8 = 35;

/// Only the small family of operations this client needs; everything else
/// the real worker protocol defines (`BuildDerivation`, `QueryMissing`,
/// signature management, ...) is out of scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    IsValidPath,
    QueryValidPaths,
    AddTextToStore,
    BuildPaths,
    QueryPathInfo,
}

impl Operation {
    pub fn opcode(self) -> u64 {
        match self {
            Operation::IsValidPath => 1,
            Operation::AddTextToStore => 8,
            Operation::BuildPaths => 9,
            Operation::QueryPathInfo => 26,
            Operation::QueryValidPaths => 31,
        }
    }
}

/// Stderr/log frame tags the daemon interleaves with actual responses. The
/// client must drain these before reading any operation-specific response.
pub mod stderr_tag {
    pub const NEXT: u64 = 0x6f6c6d67; // log line
    pub const READ: u64 = 0x64617461; // daemon requests data from us (unused by this client)
    pub const WRITE: u64 = 0x64617416; // daemon writes data to us outside a response
    pub const LAST: u64 = 0x616c7473; // end of stderr stream
    pub const ERROR: u64 = 0x63787470;
    pub const START_ACTIVITY: u64 = 0x53545254;
    pub const STOP_ACTIVITY: u64 = 0x53544f50;
    pub const RESULT: u64 = 0x52534c54;
}

/// `bmNormal` - the only build mode this client ever requests.
pub const BUILD_MODE_NORMAL: u64 = 0;
