//! AeroSpace IPC Library
//!
//! This library provides a blocking client for the AeroSpace window
//! manager's command socket, used to switch workspaces from trackpad
//! gestures:
//!
//! - `ipc` - socket path resolution, request framing and the client itself
//!
//! # IPC Module
//!
//! ```ignore
//! use aerospace_ipc::ipc::IpcClient;
//!
//! let mut client = IpcClient::connect(None)?;
//! client.switch("next")?;
//! ```

pub mod ipc;
