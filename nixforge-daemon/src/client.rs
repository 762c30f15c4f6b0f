//! The synchronous worker-protocol client.
//!
//! The overall request/drain/response shape of each operation, the wire
//! constants, and the handshake gating by protocol-version thresholds all
//! follow the same daemon protocol a server-side handshake implementation
//! would negotiate; the client-side handshake sequencing below is the
//! mirror image of that contract, built from the other end of the
//! connection.
use std::io::{BufReader, BufWriter, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;

use tracing::{debug, instrument};

use crate::errors::ClientError;
use crate::path_info::PathInfo;
use crate::protocol_version::{ProtocolVersion, CLIENT_PROTOCOL_VERSION, MIN_PROTOCOL_VERSION};
use crate::wire::{self, MAX_STRING_LEN};
use crate::worker_protocol::{
    stderr_tag, Operation, BUILD_MODE_NORMAL, TRUST_LEVEL_SINCE_MINOR, VERSION_STRING_SINCE_MINOR,
    WORKER_MAGIC_1, WORKER_MAGIC_2,
};

/// Default path of the Nix daemon's Unix-domain socket.
pub const DEFAULT_SOCKET_PATH: &str = "/nix/var/nix/daemon-socket/socket";

/// A connection to the build daemon. Owns the socket; dropping it releases
/// it. Not `Clone`/`Sync` - each connection is owned by exactly one caller
/// and runs on a single thread of control.
pub struct DaemonClient {
    reader: BufReader<UnixStream>,
    writer: BufWriter<UnixStream>,
    /// Protocol version the daemon reported during the handshake.
    daemon_version: ProtocolVersion,
}

impl DaemonClient {
    /// Connects to the daemon at `socket_path` and performs the handshake.
    #[instrument(skip_all, fields(socket_path = %socket_path.as_ref().display()))]
    pub fn connect(socket_path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let stream = UnixStream::connect(socket_path.as_ref()).map_err(ClientError::Io)?;
        let reader = BufReader::new(stream.try_clone().map_err(ClientError::Io)?);
        let writer = BufWriter::new(stream);

        let mut client = DaemonClient {
            reader,
            writer,
            daemon_version: MIN_PROTOCOL_VERSION,
        };
        client.handshake()?;
        Ok(client)
    }

    fn handshake(&mut self) -> Result<(), ClientError> {
        wire::write_u64(&mut self.writer, WORKER_MAGIC_1)?;
        self.writer.flush()?;

        let magic = self.read_u64_or_closed()?;
        if magic != WORKER_MAGIC_2 {
            return Err(ClientError::Protocol(format!(
                "bad daemon magic: {magic:#x}"
            )));
        }

        let daemon_version: ProtocolVersion = self
            .read_u64_or_closed()?
            .try_into()
            .map_err(|e: &str| ClientError::Protocol(e.to_string()))?;
        if daemon_version < MIN_PROTOCOL_VERSION {
            return Err(ClientError::IncompatibleProtocol(
                daemon_version,
                MIN_PROTOCOL_VERSION,
            ));
        }
        self.daemon_version = daemon_version;

        wire::write_u64(&mut self.writer, CLIENT_PROTOCOL_VERSION.into())?;
        // CPU affinity override: 0 = none.
        wire::write_u64(&mut self.writer, 0)?;
        // "Reserve space" flag: we never ask the daemon to pre-reserve disk.
        wire::write_bool(&mut self.writer, false)?;
        self.writer.flush()?;

        if daemon_version.minor() >= VERSION_STRING_SINCE_MINOR {
            let version_str = self.read_string_or_closed(MAX_STRING_LEN)?;
            debug!(daemon_nix_version = %version_str, "daemon handshake");
        }
        if daemon_version.minor() >= TRUST_LEVEL_SINCE_MINOR {
            let _trust_level = self.read_u64_or_closed()?;
        }

        self.drain_stderr()
    }

    fn read_u64_or_closed(&mut self) -> Result<u64, ClientError> {
        wire::read_u64(&mut self.reader).map_err(ClientError::from_io_eof)
    }

    fn read_bool_or_closed(&mut self) -> Result<bool, ClientError> {
        wire::read_bool(&mut self.reader).map_err(ClientError::from_io_eof)
    }

    fn read_string_or_closed(&mut self, max_len: usize) -> Result<String, ClientError> {
        wire::read_string(&mut self.reader, max_len).map_err(ClientError::from_io_eof)
    }

    fn read_string_list_or_closed(&mut self, max_len: usize) -> Result<Vec<String>, ClientError> {
        wire::read_string_list(&mut self.reader, max_len).map_err(ClientError::from_io_eof)
    }

    /// Drains daemon log/activity frames until `STDERR_LAST`. An error
    /// frame aborts the in-flight operation with `daemon-error`.
    fn drain_stderr(&mut self) -> Result<(), ClientError> {
        loop {
            let tag = self.read_u64_or_closed()?;
            match tag {
                stderr_tag::LAST => return Ok(()),
                stderr_tag::ERROR => {
                    let kind = self.read_string_or_closed(MAX_STRING_LEN)?;
                    let _level = self.read_u64_or_closed()?;
                    let _name = self.read_string_or_closed(MAX_STRING_LEN)?;
                    let message = self.read_string_or_closed(MAX_STRING_LEN)?;
                    let n_traces = self.read_u64_or_closed()?;
                    for _ in 0..n_traces {
                        let _pos = self.read_u64_or_closed()?;
                        let _trace_msg = self.read_string_or_closed(MAX_STRING_LEN)?;
                    }
                    return Err(ClientError::DaemonError { kind, message });
                }
                stderr_tag::NEXT => {
                    let _log_line = self.read_string_or_closed(MAX_STRING_LEN)?;
                }
                stderr_tag::START_ACTIVITY => {
                    let _act_id = self.read_u64_or_closed()?;
                    let _level = self.read_u64_or_closed()?;
                    let _activity_type = self.read_u64_or_closed()?;
                    let _text = self.read_string_or_closed(MAX_STRING_LEN)?;
                    self.drain_fields()?;
                    let _parent = self.read_u64_or_closed()?;
                }
                stderr_tag::STOP_ACTIVITY => {
                    let _act_id = self.read_u64_or_closed()?;
                }
                stderr_tag::RESULT => {
                    let _act_id = self.read_u64_or_closed()?;
                    let _result_type = self.read_u64_or_closed()?;
                    self.drain_fields()?;
                }
                other => {
                    return Err(ClientError::Protocol(format!(
                        "unexpected stderr message type: {other:#x}"
                    )))
                }
            }
        }
    }

    /// A `Fields` value as used inside `StartActivity`/`Result` frames:
    /// a length-prefixed list of (u64-tagged) int-or-string values.
    fn drain_fields(&mut self) -> Result<(), ClientError> {
        let n = self.read_u64_or_closed()?;
        for _ in 0..n {
            let field_type = self.read_u64_or_closed()?;
            match field_type {
                0 => {
                    let _int_field = self.read_u64_or_closed()?;
                }
                1 => {
                    let _str_field = self.read_string_or_closed(MAX_STRING_LEN)?;
                }
                other => {
                    return Err(ClientError::Protocol(format!(
                        "unknown log field type: {other}"
                    )))
                }
            }
        }
        Ok(())
    }

    /// `is_valid_path(path) -> bool`.
    #[instrument(skip(self), fields(path))]
    pub fn is_valid_path(&mut self, path: &str) -> Result<bool, ClientError> {
        wire::write_u64(&mut self.writer, Operation::IsValidPath.opcode())?;
        wire::write_string(&mut self.writer, path)?;
        self.writer.flush()?;
        self.drain_stderr()?;
        self.read_bool_or_closed()
    }

    /// `query_valid_paths([paths], substitute) -> set<path>`.
    #[instrument(skip(self, paths))]
    pub fn query_valid_paths(
        &mut self,
        paths: &[String],
        substitute: bool,
    ) -> Result<Vec<String>, ClientError> {
        wire::write_u64(&mut self.writer, Operation::QueryValidPaths.opcode())?;
        wire::write_string_list(&mut self.writer, paths)?;
        wire::write_bool(&mut self.writer, substitute)?;
        self.writer.flush()?;
        self.drain_stderr()?;
        self.read_string_list_or_closed(MAX_STRING_LEN)
    }

    /// `query_path_info(path) -> PathInfo`.
    #[instrument(skip(self))]
    pub fn query_path_info(&mut self, path: &str) -> Result<PathInfo, ClientError> {
        wire::write_u64(&mut self.writer, Operation::QueryPathInfo.opcode())?;
        wire::write_string(&mut self.writer, path)?;
        self.writer.flush()?;
        self.drain_stderr()?;

        let valid = self.read_bool_or_closed()?;
        if !valid {
            return Err(ClientError::PathNotValid(path.to_string()));
        }

        let deriver = self.read_string_or_closed(MAX_STRING_LEN)?;
        let nar_hash = self.read_string_or_closed(MAX_STRING_LEN)?;
        let references = self.read_string_list_or_closed(MAX_STRING_LEN)?;
        let registration_time = self.read_u64_or_closed()?;
        let nar_size = self.read_u64_or_closed()?;
        // "Ultimate" flag, present since protocol 1.16; we don't surface it.
        let _ultimate = self.read_bool_or_closed()?;
        let signatures = self.read_string_list_or_closed(MAX_STRING_LEN)?;
        // Content-address string, present since protocol 1.25ish; unused.
        let _content_address = self.read_string_or_closed(MAX_STRING_LEN)?;

        Ok(PathInfo {
            deriver,
            nar_hash,
            references,
            registration_time,
            nar_size,
            signatures,
        })
    }

    /// `add_text_to_store(name, content, [references]) -> path`.
    #[instrument(skip(self, content, references))]
    pub fn add_text_to_store(
        &mut self,
        name: &str,
        content: &str,
        references: &[String],
    ) -> Result<String, ClientError> {
        wire::write_u64(&mut self.writer, Operation::AddTextToStore.opcode())?;
        wire::write_string(&mut self.writer, name)?;
        wire::write_string(&mut self.writer, content)?;
        wire::write_string_list(&mut self.writer, references)?;
        self.writer.flush()?;
        self.drain_stderr()?;
        self.read_string_or_closed(MAX_STRING_LEN)
    }

    /// `build_paths([path], mode) -> ()`. `paths` are opaque strings in the
    /// format the daemon expects: a bare store path, or `<drv-path>!<output>`
    /// to request a specific output.
    #[instrument(skip(self, paths))]
    pub fn build_paths(&mut self, paths: &[String]) -> Result<(), ClientError> {
        wire::write_u64(&mut self.writer, Operation::BuildPaths.opcode())?;
        wire::write_string_list(&mut self.writer, paths)?;
        wire::write_u64(&mut self.writer, BUILD_MODE_NORMAL)?;
        self.writer.flush()?;
        self.drain_stderr()?;
        let result = self.read_u64_or_closed()?;
        if result != 1 {
            return Err(ClientError::Protocol(format!(
                "build_paths returned unexpected result code {result}"
            )));
        }
        Ok(())
    }

    /// The protocol version negotiated with the daemon during [Self::connect].
    pub fn daemon_version(&self) -> ProtocolVersion {
        self.daemon_version
    }
}
