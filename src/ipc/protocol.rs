//! Wire types for the AeroSpace command protocol.
//!
//! Requests are one compact JSON object per line:
//!
//! ```text
//! {"command":"workspace","stdin":"","args":["workspace","next"]}\n
//! ```
//!
//! Responses are a single JSON object. Only `exitCode` is required; every
//! other field is looked up on demand and ignored when absent or mistyped.

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// A command request as sent to the daemon.
///
/// `args` is the full argument vector, command token included at index 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientRequest<'a> {
    pub command: &'a str,
    pub stdin: &'a str,
    pub args: Vec<&'a str>,
}

impl<'a> ClientRequest<'a> {
    /// Build a request from a non-empty argument list.
    ///
    /// Returns `None` if `args` is empty.
    pub fn new<S: AsRef<str>>(args: &'a [S], stdin: &'a str) -> Option<Self> {
        let args: Vec<&'a str> = args.iter().map(|arg| arg.as_ref()).collect();
        let command = *args.first()?;
        Some(Self {
            command,
            stdin,
            args,
        })
    }

    /// Serialize as one request line, newline included.
    pub fn to_line(&self) -> serde_json::Result<Vec<u8>> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }
}

/// Why a parsed response was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnswerDefect {
    /// The top-level value was not a JSON object.
    #[error("response is not a JSON object")]
    NotAnObject,
    /// `exitCode` was absent.
    #[error("response does not contain a valid exitCode field")]
    MissingExitCode,
    /// `exitCode` was present but not an integer.
    #[error("exitCode is not an integer (found {0})")]
    InvalidExitCode(String),
}

/// A response object whose `exitCode` has been validated.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerAnswer {
    exit_code: i64,
    fields: Map<String, Value>,
}

impl ServerAnswer {
    /// Validate a parsed JSON value as a daemon response.
    pub fn from_value(value: Value) -> Result<Self, AnswerDefect> {
        let Value::Object(fields) = value else {
            return Err(AnswerDefect::NotAnObject);
        };

        let exit_code = match fields.get("exitCode") {
            None => return Err(AnswerDefect::MissingExitCode),
            Some(code) => code
                .as_i64()
                .ok_or_else(|| AnswerDefect::InvalidExitCode(code.to_string()))?,
        };

        Ok(Self { exit_code, fields })
    }

    pub fn exit_code(&self) -> i64 {
        self.exit_code
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// The named field, only if it is present and a string.
    pub fn string_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// Convenience for the daemon's error text.
    pub fn stderr(&self) -> Option<&str> {
        self.string_field("stderr")
    }
}
