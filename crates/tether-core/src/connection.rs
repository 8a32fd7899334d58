//! Connection manager contract.
//!
//! The transport itself lives outside this crate; records only ask it to
//! connect and whether a target is still connected.

use crate::env::ExecutionEnvironment;
use crate::error::RemoteError;
use crate::events::{Listener, Subscription};

/// Transport-level connection changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected(ExecutionEnvironment),
    Disconnected(ExecutionEnvironment),
}

impl ConnectionEvent {
    pub fn env(&self) -> &ExecutionEnvironment {
        match self {
            ConnectionEvent::Connected(env) | ConnectionEvent::Disconnected(env) => env,
        }
    }
}

pub trait ConnectionManager: Send + Sync {
    /// Open (or reuse) a connection. Blocks until connected or failed.
    fn connect_to(&self, env: &ExecutionEnvironment) -> Result<(), RemoteError>;

    fn is_connected_to(&self, env: &ExecutionEnvironment) -> bool;

    /// Deliver connect/disconnect notifications until the subscription drops.
    fn add_connection_listener(&self, listener: Listener<ConnectionEvent>) -> Subscription;
}
