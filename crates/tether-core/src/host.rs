//! Host profiles and the host-info probe contract.
//!
//! A host profile is the (OS family, CPU family, OS version) triple used to
//! decide which synchronization strategies apply to a target.

use std::fmt;
use std::str::FromStr;

use crate::env::ExecutionEnvironment;
use crate::error::{CodecError, RemoteError};

/// Operating system family reported by a host probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsFamily {
    Linux,
    MacOs,
    Windows,
    FreeBsd,
    Solaris,
}

impl OsFamily {
    /// Token used in the persisted server list.
    pub fn as_token(self) -> &'static str {
        match self {
            OsFamily::Linux => "LINUX",
            OsFamily::MacOs => "MACOS",
            OsFamily::Windows => "WINDOWS",
            OsFamily::FreeBsd => "FREEBSD",
            OsFamily::Solaris => "SOLARIS",
        }
    }

    pub fn is_unix(self) -> bool {
        !matches!(self, OsFamily::Windows)
    }
}

impl FromStr for OsFamily {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LINUX" => Ok(OsFamily::Linux),
            "MACOS" => Ok(OsFamily::MacOs),
            "WINDOWS" => Ok(OsFamily::Windows),
            "FREEBSD" => Ok(OsFamily::FreeBsd),
            "SOLARIS" => Ok(OsFamily::Solaris),
            other => Err(CodecError::UnknownToken {
                kind: "os family",
                token: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OsFamily::Linux => "Linux",
            OsFamily::MacOs => "macOS",
            OsFamily::Windows => "Windows",
            OsFamily::FreeBsd => "FreeBSD",
            OsFamily::Solaris => "Solaris",
        };
        f.write_str(name)
    }
}

/// CPU family reported by a host probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CpuFamily {
    X86,
    X86_64,
    Arm,
    Aarch64,
    Ppc64,
}

impl CpuFamily {
    /// Token used in the persisted server list.
    pub fn as_token(self) -> &'static str {
        match self {
            CpuFamily::X86 => "X86",
            CpuFamily::X86_64 => "X86_64",
            CpuFamily::Arm => "ARM",
            CpuFamily::Aarch64 => "AARCH64",
            CpuFamily::Ppc64 => "PPC64",
        }
    }
}

impl FromStr for CpuFamily {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "X86" => Ok(CpuFamily::X86),
            "X86_64" => Ok(CpuFamily::X86_64),
            "ARM" => Ok(CpuFamily::Arm),
            "AARCH64" => Ok(CpuFamily::Aarch64),
            "PPC64" => Ok(CpuFamily::Ppc64),
            other => Err(CodecError::UnknownToken {
                kind: "cpu family",
                token: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for CpuFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_token().to_ascii_lowercase())
    }
}

/// Cached description of a host. Every part may be unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct HostProfile {
    pub os_family: Option<OsFamily>,
    pub cpu_family: Option<CpuFamily>,
    pub os_version: Option<String>,
}

impl HostProfile {
    pub fn new(os_family: OsFamily, cpu_family: CpuFamily, os_version: impl Into<String>) -> Self {
        Self {
            os_family: Some(os_family),
            cpu_family: Some(cpu_family),
            os_version: Some(os_version.into()),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.os_family.is_none() && self.cpu_family.is_none() && self.os_version.is_none()
    }
}

/// Probes a target for its current host profile.
pub trait HostInfoProvider: Send + Sync {
    /// Whether probing is possible for this target right now.
    fn is_available(&self, env: &ExecutionEnvironment) -> bool;

    fn host_info(&self, env: &ExecutionEnvironment) -> Result<HostProfile, RemoteError>;
}

/// Provider used when no probe is installed; never available.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableHostInfo;

impl HostInfoProvider for UnavailableHostInfo {
    fn is_available(&self, _env: &ExecutionEnvironment) -> bool {
        false
    }

    fn host_info(&self, _env: &ExecutionEnvironment) -> Result<HostProfile, RemoteError> {
        Err(RemoteError::Io("host information is not available".to_string()))
    }
}
