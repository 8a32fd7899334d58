//! Strategy registry for discovering synchronization strategies.
//!
//! Registration order matters: when a target needs a strategy picked for it,
//! the first applicable one wins.

use crate::env::ExecutionEnvironment;
use crate::host::HostProfile;

use super::{RsyncStrategy, SftpStrategy, SyncStrategy};

/// Ordered set of known strategies.
#[derive(Debug)]
pub struct SyncStrategyRegistry {
    strategies: Vec<Box<dyn SyncStrategy>>,
}

impl Default for SyncStrategyRegistry {
    fn default() -> Self {
        Self::with_default_strategies()
    }
}

impl SyncStrategyRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// Create a registry with the built-in strategies, `rsync` first.
    pub fn with_default_strategies() -> Self {
        let strategies: Vec<Box<dyn SyncStrategy>> =
            vec![Box::new(RsyncStrategy::new()), Box::new(SftpStrategy::new())];
        Self { strategies }
    }

    /// Register a strategy after all existing ones.
    pub fn register(&mut self, strategy: Box<dyn SyncStrategy>) {
        self.strategies.push(strategy);
    }

    /// All strategies in registration order.
    pub fn all(&self) -> &[Box<dyn SyncStrategy>] {
        &self.strategies
    }

    /// Get a strategy by id.
    pub fn get(&self, id: &str) -> Option<&dyn SyncStrategy> {
        self.strategies
            .iter()
            .find(|s| s.id() == id)
            .map(|s| s.as_ref())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// First strategy, in registration order, that applies to the target.
    pub fn first_applicable(
        &self,
        env: &ExecutionEnvironment,
        profile: &HostProfile,
    ) -> Option<&dyn SyncStrategy> {
        self.strategies
            .iter()
            .find(|s| s.is_applicable(env, profile))
            .map(|s| s.as_ref())
    }

    /// List all strategy ids.
    pub fn ids(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.id()).collect()
    }
}
