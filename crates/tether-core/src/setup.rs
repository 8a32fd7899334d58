//! Collaborators for the two background jobs a record runs after connecting:
//! installing remote support files and priming path mappings.

use std::time::Duration;

use crate::env::ExecutionEnvironment;
use crate::error::RemoteError;
use crate::host::HostProfile;

/// Ceiling on how long `init` waits for the support-file setup job.
pub const DEFAULT_SETUP_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Knobs for record initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupSettings {
    /// When false the setup job skips the support-file check entirely.
    pub install_support: bool,
    /// How long `init` waits for the setup job before going online anyway.
    pub timeout: Duration,
}

impl Default for SetupSettings {
    fn default() -> Self {
        Self {
            install_support: true,
            timeout: DEFAULT_SETUP_TIMEOUT,
        }
    }
}

impl SetupSettings {
    pub fn with_install_support(mut self, enabled: bool) -> Self {
        self.install_support = enabled;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Installs or updates the helper files a remote target needs.
pub trait SupportInstaller: Send + Sync {
    fn needs_install(
        &self,
        env: &ExecutionEnvironment,
        profile: &HostProfile,
    ) -> Result<bool, RemoteError>;

    fn install(&self, env: &ExecutionEnvironment, profile: &HostProfile)
    -> Result<(), RemoteError>;
}

/// Installer for targets that need no support files.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSupportFiles;

impl SupportInstaller for NoSupportFiles {
    fn needs_install(
        &self,
        _env: &ExecutionEnvironment,
        _profile: &HostProfile,
    ) -> Result<bool, RemoteError> {
        Ok(false)
    }

    fn install(
        &self,
        _env: &ExecutionEnvironment,
        _profile: &HostProfile,
    ) -> Result<(), RemoteError> {
        Ok(())
    }
}

/// Builds the local-to-remote path translation table for a target.
pub trait PathMapper: Send + Sync {
    /// Best effort; failures are the mapper's to log.
    fn prime(&self, env: &ExecutionEnvironment);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullPathMapper;

impl PathMapper for NullPathMapper {
    fn prime(&self, _env: &ExecutionEnvironment) {}
}
