//! IPC client for the AeroSpace window manager.
//!
//! This module speaks AeroSpace's command protocol over its per-user Unix
//! domain socket, the same channel the `aerospace` CLI uses.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐         Unix Socket          ┌─────────────────────┐
//! │  gesture loop   │  ◄──────────────────────────►│   AeroSpace.app     │
//! │   (IpcClient)   │   JSON line out, JSON back   │      (daemon)       │
//! └─────────────────┘                              └─────────────────────┘
//! ```
//!
//! # Protocol
//!
//! Requests are one JSON object terminated by `\n`. Responses are one JSON
//! object with an integer `exitCode` and optional `stdout`/`stderr` strings:
//!
//! ```text
//! -> {"command":"workspace","stdin":"","args":["workspace","next","--wrap-around"]}
//! <- {"exitCode":0,"stdout":"","stderr":""}
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use aerospace_ipc::ipc::IpcClient;
//!
//! let mut client = IpcClient::connect(None)?;
//! let workspaces = client.list_workspace_names(false)?;
//! client.workspace(true, "next", "")?;
//! ```

mod client;
mod framing;
mod protocol;
mod socket_path;

pub use client::{IpcClient, IpcError};
pub use framing::{parse_leading_value, ReceiveBuffer, READ_BUFFER_SIZE};
pub use protocol::{AnswerDefect, ClientRequest, ServerAnswer};
pub use socket_path::{
    default_socket_path, resolve_socket_path, socket_path_for, SocketPathError,
    SystemUserDirectory, UserDirectory,
};
