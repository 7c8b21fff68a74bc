//! Crate error type.

use std::fmt;
use std::io;

/// Errors raised by the storage, IPC and platform layers.
///
/// Component boundaries log these and carry on; nothing here is meant to
/// reach the user as a hard failure.
#[derive(Debug)]
pub enum Error {
    /// Filesystem or socket I/O failed.
    Io(io::Error),
    /// The config document could not be encoded.
    Yaml(serde_yaml::Error),
    /// An IPC message could not be encoded or decoded.
    Json(serde_json::Error),
    /// No owner process answered on the command endpoint.
    OwnerUnreachable(String),
    /// The peer sent something that is not a valid command or reply.
    Protocol(String),
    /// An OS call failed.
    Platform(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "IO error: {err}"),
            Self::Yaml(err) => write!(f, "YAML error: {err}"),
            Self::Json(err) => write!(f, "JSON error: {err}"),
            Self::OwnerUnreachable(msg) => write!(f, "No running instance reachable: {msg}"),
            Self::Protocol(msg) => write!(f, "Protocol error: {msg}"),
            Self::Platform(msg) => write!(f, "Platform call failed: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Yaml(err) => Some(err),
            Self::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Yaml(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err)
    }
}
