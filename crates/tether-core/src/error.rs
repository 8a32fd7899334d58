//! Error types shared across the registry, records, and persistence layers.

use thiserror::Error;

/// Failure reported by a remote collaborator (transport, host probe, installer).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// I/O or transport failure; the message is shown to the user as the reason.
    #[error("{0}")]
    Io(String),
    /// The user (or a timeout) aborted the operation.
    #[error("operation cancelled")]
    Cancelled,
}

impl From<std::io::Error> for RemoteError {
    fn from(err: std::io::Error) -> Self {
        RemoteError::Io(err.to_string())
    }
}

/// Problems found while decoding the saved server list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("saved server entry has no fields")]
    EmptyRecord,
    #[error("unrecognized host key: {0}")]
    UnknownHostKey(String),
    #[error("unknown {kind} token: {token}")]
    UnknownToken { kind: &'static str, token: String },
}

/// Malformed `user@host[:port]` target or unique id text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvParseError {
    #[error("expected user@host[:port], got '{0}'")]
    Malformed(String),
    #[error("invalid port in '{0}'")]
    InvalidPort(String),
}
