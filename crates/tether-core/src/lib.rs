//! Tether Core Library
//!
//! Registry of execution targets (the local machine plus remote hosts) with
//! per-target connection and setup state, and the compact persistence format
//! for the saved remote list.

pub mod config;
pub mod connection;
pub mod context;
pub mod credentials;
pub mod env;
pub mod error;
pub mod events;
pub mod host;
pub mod registry;
pub mod server;
pub mod services;
pub mod setup;
pub mod sync;
pub mod timing;

/// Re-exports of commonly used types
pub mod prelude {
    // Targets
    pub use crate::env::ExecutionEnvironment;
    pub use crate::env::id::{EnvironmentIdCodec, UriIdCodec};
    pub use crate::host::{CpuFamily, HostInfoProvider, HostProfile, OsFamily};

    // Collaborators
    pub use crate::connection::{ConnectionEvent, ConnectionManager};
    pub use crate::credentials::{CredentialStore, MemoryCredentialStore};
    pub use crate::services::Services;
    pub use crate::setup::{PathMapper, SetupSettings, SupportInstaller};
    pub use crate::sync::{SyncStrategy, SyncStrategyRegistry};

    // Registry
    pub use crate::registry::{
        AddServerOptions, Listing, RegistryBuilder, RegistryEvent, ServerRegistry,
    };
    pub use crate::server::{RecordEvent, ServerRecord, ServerState, StatusLevel, StatusMessage};

    // Configuration
    pub use crate::config::preferences::{FilePreferences, MemoryPreferences, PreferenceStore};
    pub use crate::config::{ConfigStore, TetherConfig};
    pub use crate::context::AppContext;

    // Errors
    pub use crate::error::{CodecError, EnvParseError, RemoteError};
}
