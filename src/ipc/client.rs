//! Blocking client for the AeroSpace command socket.
//!
//! This module provides `IpcClient`, which owns one Unix stream connection to
//! the AeroSpace daemon plus the receive buffer used to reassemble responses.
//! Every call writes one request line and blocks until one response has been
//! parsed. There is no timeout and no pipelining: a client serves one caller
//! at a time, which `&mut self` enforces.

use std::io;
use std::os::unix::io::IntoRawFd;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use nix::sys::socket::UnixAddr;
use thiserror::Error;

use crate::ipc::framing::{read_message, write_message, FrameError, ReceiveBuffer};
use crate::ipc::protocol::{AnswerDefect, ClientRequest, ServerAnswer};
use crate::ipc::socket_path::{default_socket_path, SocketPathError};

/// IPC-specific error types.
///
/// Variants for which [`IpcError::is_unrecoverable`] returns `true` mean the
/// client cannot be used at all; the embedding program is expected to report
/// them and exit. Everything else is a per-call failure.
#[derive(Debug, Error)]
pub enum IpcError {
    /// The default socket path could not be resolved.
    #[error(transparent)]
    SocketPath(#[from] SocketPathError),

    /// Creating the Unix domain socket failed.
    #[error("failed to create Unix domain socket: {0}")]
    SocketCreate(#[source] io::Error),

    /// Connecting to the daemon socket failed.
    #[error("failed to connect to AeroSpace socket at {}: {} (errno {})", path.display(), os_error_text(source), errno_of(source))]
    ConnectionFailed {
        /// Socket path that was dialled
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Request could not be encoded as JSON.
    #[error("failed to serialize request: {0}")]
    Serialize(#[source] serde_json::Error),

    /// `execute` was called with no arguments.
    #[error("invalid arguments: command list must not be empty")]
    InvalidArguments,

    /// The client has already been closed.
    #[error("client is not connected")]
    NotConnected,

    /// Writing the request to the socket failed.
    #[error("failed to send request: {0}")]
    Write(#[source] io::Error),

    /// The daemon closed the connection before replying.
    #[error("connection closed by daemon")]
    ConnectionClosed,

    /// Reading the response failed.
    #[error("failed to receive data from socket: {0}")]
    Read(#[source] io::Error),

    /// A response did not fit in the receive buffer.
    #[error("read buffer overflow: response exceeds {capacity} bytes, buffer cleared")]
    BufferOverflow {
        /// Buffer capacity in bytes
        capacity: usize,
    },

    /// The response lacked a valid `exitCode`.
    #[error("malformed response: {0}")]
    MalformedResponse(#[from] AnswerDefect),

    /// The daemon ran the command and reported a non-zero exit code.
    #[error("command failed with exit code {exit_code}{}", stderr.as_deref().map(|s| format!(": {s}")).unwrap_or_default())]
    CommandFailed {
        /// Exit code reported by the daemon
        exit_code: i64,
        /// The daemon's `stderr` text, if it sent one
        stderr: Option<String>,
    },
}

fn errno_of(err: &io::Error) -> i32 {
    err.raw_os_error().unwrap_or(0)
}

/// Error text without std's trailing `(os error N)`, which the diagnostics
/// already report as `errno`.
fn os_error_text(err: &io::Error) -> String {
    let mut text = err.to_string();
    if let Some(code) = err.raw_os_error() {
        let suffix = format!(" (os error {code})");
        if let Some(len) = text.strip_suffix(suffix.as_str()).map(str::len) {
            text.truncate(len);
        }
    }
    text
}

impl IpcError {
    /// Whether this error means the client could not be set up at all.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(
            self,
            IpcError::SocketPath(_)
                | IpcError::SocketCreate(_)
                | IpcError::ConnectionFailed { .. }
                | IpcError::Serialize(_)
        )
    }
}

impl From<FrameError> for IpcError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Overflow(capacity) => IpcError::BufferOverflow { capacity },
            FrameError::Closed => IpcError::ConnectionClosed,
            FrameError::Io(e) => IpcError::Read(e),
        }
    }
}

/// Client for the AeroSpace daemon's command socket.
///
/// # Connection Lifecycle
///
/// - `connect()` - Resolve the path (if not given) and connect
/// - `execute()` and friends - One blocking request/response exchange each
/// - `close()` - Best-effort shutdown; also run on drop
///
/// # Example
///
/// ```ignore
/// use aerospace_ipc::ipc::IpcClient;
///
/// let mut client = IpcClient::connect(None)?;
/// let names = client.list_workspaces(false)?;
/// client.switch("next")?;
/// client.close();
/// ```
#[derive(Debug)]
pub struct IpcClient {
    /// Connected stream, `None` once closed.
    stream: Option<UnixStream>,
    /// Path the stream was connected to.
    socket_path: PathBuf,
    /// Bytes received but not yet consumed by a parsed response.
    buffer: ReceiveBuffer,
}

impl IpcClient {
    /// Connect to the daemon at `socket_path`, or at the default path.
    ///
    /// # Errors
    ///
    /// All errors are unrecoverable:
    /// - `IpcError::SocketPath` if no user could be resolved for the default path
    /// - `IpcError::SocketCreate` if the socket could not be created
    /// - `IpcError::ConnectionFailed` if the daemon is not listening
    ///
    /// # Example
    ///
    /// ```ignore
    /// let client = IpcClient::connect(Some(Path::new("/tmp/bobko.aerospace-me.sock")))?;
    /// ```
    pub fn connect(socket_path: Option<&Path>) -> Result<Self, IpcError> {
        let socket_path = match socket_path {
            Some(path) => path.to_path_buf(),
            None => default_socket_path()?,
        };

        // Reject unaddressable paths (too long, interior NUL) with a real errno.
        UnixAddr::new(socket_path.as_path()).map_err(|errno| IpcError::ConnectionFailed {
            path: socket_path.clone(),
            source: io::Error::from(errno),
        })?;

        let stream = UnixStream::connect(&socket_path).map_err(|source| {
            if is_socket_creation_error(&source) {
                IpcError::SocketCreate(source)
            } else {
                IpcError::ConnectionFailed {
                    path: socket_path.clone(),
                    source,
                }
            }
        })?;

        tracing::debug!(path = %socket_path.display(), "connected to AeroSpace");
        Ok(Self::from_stream(stream, socket_path))
    }

    /// Connect to the default socket path.
    pub fn connect_default() -> Result<Self, IpcError> {
        Self::connect(None)
    }

    /// Wrap an already-connected stream.
    pub fn from_stream(stream: UnixStream, socket_path: impl Into<PathBuf>) -> Self {
        Self {
            stream: Some(stream),
            socket_path: socket_path.into(),
            buffer: ReceiveBuffer::new(),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Close and release the connection.
    ///
    /// Failures of `close(2)` are logged, never returned. Calling this on a
    /// closed client does nothing.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            match nix::unistd::close(stream.into_raw_fd()) {
                Ok(()) => tracing::debug!(path = %self.socket_path.display(), "closed AeroSpace connection"),
                Err(errno) => tracing::warn!(
                    error = errno.desc(),
                    errno = errno as i32,
                    "failed to close socket connection"
                ),
            }
        }
        self.buffer.clear();
    }

    /// Send a command and wait for its response.
    ///
    /// `args[0]` is the command name and is also kept as the first element
    /// of the argument vector sent to the daemon.
    ///
    /// # Arguments
    ///
    /// * `args` - Full argument vector, e.g. `["workspace", "next"]`
    /// * `stdin` - Payload for the command's standard input (usually empty)
    /// * `expected_field` - Response field to return on success
    ///
    /// # Returns
    ///
    /// `Ok(Some(text))` when the command succeeded and `expected_field` names
    /// a string field, `Ok(None)` when it succeeded otherwise.
    ///
    /// # Errors
    ///
    /// - `IpcError::CommandFailed` if the daemon reports a non-zero exit code
    /// - `IpcError::InvalidArguments` / `IpcError::NotConnected` on misuse (no I/O done)
    /// - `IpcError::Write`, `IpcError::Read`, `IpcError::ConnectionClosed` on socket failures
    /// - `IpcError::BufferOverflow` if the response exceeds the buffer
    /// - `IpcError::MalformedResponse` if `exitCode` is missing or not an integer
    /// - `IpcError::Serialize` (unrecoverable) if the request cannot be encoded
    ///
    /// # Example
    ///
    /// ```ignore
    /// let out = client.execute(&["list-workspaces", "--monitor", "focused"], "", Some("stdout"))?;
    /// ```
    pub fn execute<S: AsRef<str>>(
        &mut self,
        args: &[S],
        stdin: &str,
        expected_field: Option<&str>,
    ) -> Result<Option<String>, IpcError> {
        let request = ClientRequest::new(args, stdin).ok_or(IpcError::InvalidArguments)?;
        let stream = self.stream.as_mut().ok_or(IpcError::NotConnected)?;

        let line = request.to_line().map_err(IpcError::Serialize)?;
        tracing::debug!(command = request.command, bytes = line.len(), "sending request");

        if let Err(e) = write_message(stream, &line) {
            tracing::warn!(command = request.command, error = %e, "failed to send request");
            return Err(IpcError::Write(e));
        }

        let value = read_message(stream, &mut self.buffer).map_err(|e| {
            tracing::warn!(command = request.command, error = %e, "no response");
            IpcError::from(e)
        })?;

        let answer = ServerAnswer::from_value(value).map_err(|defect| {
            tracing::warn!(command = request.command, %defect, "discarding malformed response");
            IpcError::MalformedResponse(defect)
        })?;

        select_output(&answer, expected_field)
    }

    /// Switch workspace in `direction` (e.g. `"next"` or `"prev"`).
    pub fn switch(&mut self, direction: &str) -> Result<Option<String>, IpcError> {
        self.workspace(false, direction, "")
    }

    /// Run a `workspace` subcommand, optionally wrapping around the ends.
    pub fn workspace(
        &mut self,
        wrap_around: bool,
        command: &str,
        stdin: &str,
    ) -> Result<Option<String>, IpcError> {
        let mut args = vec!["workspace", command];
        if wrap_around {
            args.push("--wrap-around");
        }
        self.execute(&args, stdin, None)
    }

    /// List workspaces on the focused monitor as the daemon's raw `stdout`.
    ///
    /// Empty workspaces are filtered out unless `include_empty` is set.
    pub fn list_workspaces(&mut self, include_empty: bool) -> Result<Option<String>, IpcError> {
        let mut args = vec!["list-workspaces", "--monitor", "focused"];
        if !include_empty {
            args.extend(["--empty", "no"]);
        }
        self.execute(&args, "", Some("stdout"))
    }

    /// [`list_workspaces`](Self::list_workspaces) split into one name per line.
    pub fn list_workspace_names(&mut self, include_empty: bool) -> Result<Vec<String>, IpcError> {
        Ok(self
            .list_workspaces(include_empty)?
            .map(|stdout| {
                stdout
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Bytes currently retained for the next response.
    #[cfg(test)]
    pub(crate) fn buffered(&self) -> &[u8] {
        self.buffer.filled()
    }
}

impl Drop for IpcClient {
    fn drop(&mut self) {
        self.close();
    }
}

/// Pick the caller-visible result from a validated response.
fn select_output(
    answer: &ServerAnswer,
    expected_field: Option<&str>,
) -> Result<Option<String>, IpcError> {
    if !answer.is_success() {
        return Err(IpcError::CommandFailed {
            exit_code: answer.exit_code(),
            stderr: answer.stderr().map(str::to_string),
        });
    }

    Ok(expected_field
        .and_then(|field| answer.string_field(field))
        .map(str::to_string))
}

/// Errors that mean the socket itself could not be allocated.
fn is_socket_creation_error(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(nix::libc::EMFILE | nix::libc::ENFILE | nix::libc::EAFNOSUPPORT | nix::libc::ENOBUFS)
    )
}
