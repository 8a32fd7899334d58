//! Collaborators shared by the registry and every record it owns.

use std::fmt;
use std::sync::Arc;

use crate::connection::ConnectionManager;
use crate::credentials::{CredentialStore, MemoryCredentialStore};
use crate::host::{HostInfoProvider, UnavailableHostInfo};
use crate::setup::{NoSupportFiles, NullPathMapper, PathMapper, SetupSettings, SupportInstaller};
use crate::sync::SyncStrategyRegistry;
use crate::timing::NestedTimer;

/// Bundle of external collaborators plus setup settings.
///
/// Only the connection manager is mandatory; everything else has an inert
/// default.
#[derive(Clone)]
pub struct Services {
    connections: Arc<dyn ConnectionManager>,
    host_info: Arc<dyn HostInfoProvider>,
    strategies: Arc<SyncStrategyRegistry>,
    installer: Arc<dyn SupportInstaller>,
    path_mapper: Arc<dyn PathMapper>,
    credentials: Arc<dyn CredentialStore>,
    timer: Arc<NestedTimer>,
    settings: SetupSettings,
}

impl Services {
    pub fn new(connections: Arc<dyn ConnectionManager>) -> Self {
        Self {
            connections,
            host_info: Arc::new(UnavailableHostInfo),
            strategies: Arc::new(SyncStrategyRegistry::with_default_strategies()),
            installer: Arc::new(NoSupportFiles),
            path_mapper: Arc::new(NullPathMapper),
            credentials: Arc::new(MemoryCredentialStore::new()),
            timer: Arc::new(NestedTimer::disabled()),
            settings: SetupSettings::default(),
        }
    }

    pub fn with_host_info(mut self, host_info: Arc<dyn HostInfoProvider>) -> Self {
        self.host_info = host_info;
        self
    }

    pub fn with_strategies(mut self, strategies: SyncStrategyRegistry) -> Self {
        self.strategies = Arc::new(strategies);
        self
    }

    pub fn with_installer(mut self, installer: Arc<dyn SupportInstaller>) -> Self {
        self.installer = installer;
        self
    }

    pub fn with_path_mapper(mut self, path_mapper: Arc<dyn PathMapper>) -> Self {
        self.path_mapper = path_mapper;
        self
    }

    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialStore>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_timer(mut self, timer: NestedTimer) -> Self {
        self.timer = Arc::new(timer);
        self
    }

    pub fn with_settings(mut self, settings: SetupSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn connections(&self) -> &Arc<dyn ConnectionManager> {
        &self.connections
    }

    pub fn host_info(&self) -> &Arc<dyn HostInfoProvider> {
        &self.host_info
    }

    pub fn strategies(&self) -> &SyncStrategyRegistry {
        &self.strategies
    }

    pub fn installer(&self) -> &Arc<dyn SupportInstaller> {
        &self.installer
    }

    pub fn path_mapper(&self) -> &Arc<dyn PathMapper> {
        &self.path_mapper
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.credentials
    }

    pub fn timer(&self) -> &NestedTimer {
        &self.timer
    }

    pub fn settings(&self) -> SetupSettings {
        self.settings
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("strategies", &self.strategies.ids())
            .field("settings", &self.settings)
            .field("timings", &self.timer.is_enabled())
            .finish_non_exhaustive()
    }
}
