//! Execution environments: the identity of a target machine/account/port.

pub mod id;

use std::fmt;
use std::str::FromStr;

use crate::error::EnvParseError;

/// Port assumed when a target is written without one.
pub const DEFAULT_SSH_PORT: u16 = 22;

const LOCAL_LABEL: &str = "local";
const LOCAL_HOST: &str = "localhost";

/// Characters that delimit the saved server list and never appear in a
/// parsed user or host.
const RESERVED_CHARS: [char; 2] = [',', '|'];

/// Immutable identity of an execution target.
///
/// Equality is by value; the registry keys its records on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExecutionEnvironment {
    user: String,
    host: String,
    port: u16,
    local: bool,
}

impl ExecutionEnvironment {
    /// The machine this process runs on.
    pub fn local() -> Self {
        Self {
            user: String::new(),
            host: LOCAL_HOST.to_string(),
            port: 0,
            local: true,
        }
    }

    /// A remote account reachable at `host:port`.
    pub fn remote(user: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            user: user.into(),
            host: host.into(),
            port,
            local: false,
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_local(&self) -> bool {
        self.local
    }

    pub fn is_remote(&self) -> bool {
        !self.local
    }
}

impl fmt::Display for ExecutionEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.local {
            f.write_str(LOCAL_LABEL)
        } else {
            write!(f, "{}@{}:{}", self.user, self.host, self.port)
        }
    }
}

/// Parses `local` or `user@host[:port]`.
impl FromStr for ExecutionEnvironment {
    type Err = EnvParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == LOCAL_LABEL {
            return Ok(Self::local());
        }

        let (user, rest) = s
            .split_once('@')
            .ok_or_else(|| EnvParseError::Malformed(s.to_string()))?;

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| EnvParseError::InvalidPort(s.to_string()))?;
                (host, port)
            }
            None => (rest, DEFAULT_SSH_PORT),
        };

        if user.is_empty()
            || host.is_empty()
            || host.contains('@')
            || user.contains(RESERVED_CHARS)
            || host.contains(RESERVED_CHARS)
        {
            return Err(EnvParseError::Malformed(s.to_string()));
        }

        Ok(Self::remote(user, host, port))
    }
}
