//! Default socket path resolution for the AeroSpace daemon.
//!
//! The daemon listens on `/tmp/bobko.aerospace-<user>.sock`, where `<user>`
//! is the account that owns the GUI session. When this process runs with
//! superuser privileges (for example under `sudo`), the effective account is
//! `root`, which is almost never the one running the window manager, so the
//! resolver looks for the invoking user first.

use std::path::PathBuf;

use nix::unistd::{geteuid, Uid, User};
use thiserror::Error;

/// Prefix shared by every AeroSpace socket path.
const SOCKET_PREFIX: &str = "/tmp/bobko.aerospace-";

/// Environment variable naming the pre-elevation user under `sudo`.
const SUDO_USER_VAR: &str = "SUDO_USER";

/// Generic current-user environment variable.
const USER_VAR: &str = "USER";

/// Superuser account name.
const ROOT_NAME: &str = "root";

/// Errors raised while resolving the default socket path.
#[derive(Debug, Error)]
pub enum SocketPathError {
    /// No account record could be found for the process at all.
    #[error("unable to determine user information for default socket path (euid {uid})")]
    UnknownUser {
        /// Effective uid that had no passwd entry.
        uid: u32,
    },
}

/// Identity lookups the resolver depends on.
///
/// Implemented by [`SystemUserDirectory`] for the real process; tests supply
/// an in-memory directory so elevation can be simulated without privileges.
pub trait UserDirectory {
    /// Effective user id of the current process.
    fn effective_uid(&self) -> u32;

    /// Account name for `uid`, if a record exists.
    fn name_by_uid(&self, uid: u32) -> Option<String>;

    /// Account name for `name`, if a record exists.
    fn name_by_name(&self, name: &str) -> Option<String>;

    /// Value of environment variable `key`, if set and valid UTF-8.
    fn var(&self, key: &str) -> Option<String>;
}

/// [`UserDirectory`] backed by the system passwd database and process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemUserDirectory;

impl UserDirectory for SystemUserDirectory {
    fn effective_uid(&self) -> u32 {
        geteuid().as_raw()
    }

    fn name_by_uid(&self, uid: u32) -> Option<String> {
        match User::from_uid(Uid::from_raw(uid)) {
            Ok(user) => user.map(|u| u.name),
            Err(e) => {
                tracing::debug!(uid, error = %e, "passwd lookup by uid failed");
                None
            }
        }
    }

    fn name_by_name(&self, name: &str) -> Option<String> {
        match User::from_name(name) {
            Ok(user) => user.map(|u| u.name),
            Err(e) => {
                tracing::debug!(name, error = %e, "passwd lookup by name failed");
                None
            }
        }
    }

    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Resolve the default socket path using the real process identity.
///
/// # Errors
///
/// Returns [`SocketPathError::UnknownUser`] if no account record can be
/// found. Callers cannot reach the daemon without a path, so this is treated
/// as unrecoverable.
///
/// # Example
///
/// ```ignore
/// let path = default_socket_path()?;
/// assert!(path.to_string_lossy().starts_with("/tmp/bobko.aerospace-"));
/// ```
pub fn default_socket_path() -> Result<PathBuf, SocketPathError> {
    resolve_socket_path(&SystemUserDirectory)
}

/// Resolve the socket path against an arbitrary [`UserDirectory`].
///
/// Resolution order:
/// 1. Non-root effective uid: that account's name.
/// 2. Root with `$SUDO_USER` set: that account, if it exists.
/// 3. Root without `$SUDO_USER`: `$USER`, unless it is literally `root`, if it exists.
/// 4. Otherwise the effective uid's own account (`root`).
///
/// A `$SUDO_USER` that names no account does not fall through to `$USER`.
pub fn resolve_socket_path(directory: &impl UserDirectory) -> Result<PathBuf, SocketPathError> {
    let uid = directory.effective_uid();
    let mut name = directory.name_by_uid(uid);

    if uid == 0 {
        let elevated_from = match directory.var(SUDO_USER_VAR) {
            Some(sudo_user) => directory.name_by_name(&sudo_user),
            None => directory
                .var(USER_VAR)
                .filter(|user| user != ROOT_NAME)
                .and_then(|user| directory.name_by_name(&user)),
        };
        if elevated_from.is_some() {
            name = elevated_from;
        }
    }

    let name = name.ok_or(SocketPathError::UnknownUser { uid })?;
    Ok(socket_path_for(&name))
}

/// Socket path for a given account name.
pub fn socket_path_for(user: &str) -> PathBuf {
    PathBuf::from(format!("{SOCKET_PREFIX}{user}.sock"))
}
