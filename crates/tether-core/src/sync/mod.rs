//! Synchronization strategies for keeping local and remote files consistent.
//!
//! Only the selection of a strategy lives here; the algorithms themselves are
//! provided by whoever registers a strategy.

pub mod registry;

use std::fmt::Debug;

use crate::env::ExecutionEnvironment;
use crate::host::HostProfile;

pub use registry::SyncStrategyRegistry;

/// A pluggable file synchronization algorithm.
pub trait SyncStrategy: Send + Sync + Debug {
    /// Stable identifier; this is what gets persisted.
    fn id(&self) -> &'static str;

    /// Human-readable name.
    fn display_name(&self) -> &'static str;

    /// Whether the strategy can serve this target with the given host profile.
    ///
    /// An unknown profile should be treated optimistically.
    fn is_applicable(&self, env: &ExecutionEnvironment, profile: &HostProfile) -> bool;
}

/// Incremental transfer through `rsync`; needs a Unix-like remote.
#[derive(Debug, Default, Clone, Copy)]
pub struct RsyncStrategy;

impl RsyncStrategy {
    pub const ID: &'static str = "rsync";

    pub fn new() -> Self {
        Self
    }
}

impl SyncStrategy for RsyncStrategy {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn display_name(&self) -> &'static str {
        "rsync"
    }

    fn is_applicable(&self, env: &ExecutionEnvironment, profile: &HostProfile) -> bool {
        env.is_remote() && profile.os_family.is_none_or(|os| os.is_unix())
    }
}

/// Whole-file copy over SFTP; works against any remote.
#[derive(Debug, Default, Clone, Copy)]
pub struct SftpStrategy;

impl SftpStrategy {
    pub const ID: &'static str = "sftp";

    pub fn new() -> Self {
        Self
    }
}

impl SyncStrategy for SftpStrategy {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn display_name(&self) -> &'static str {
        "SFTP upload"
    }

    fn is_applicable(&self, env: &ExecutionEnvironment, _profile: &HostProfile) -> bool {
        env.is_remote()
    }
}
