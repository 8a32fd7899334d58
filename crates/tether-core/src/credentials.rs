//! Credential store contract.

use std::collections::HashSet;

use parking_lot::Mutex;

use crate::env::ExecutionEnvironment;

pub trait CredentialStore: Send + Sync {
    fn is_remember_password(&self, env: &ExecutionEnvironment) -> bool;

    fn set_remember_password(&self, env: &ExecutionEnvironment, remember: bool);

    /// Replace the set of remote targets the store should keep secrets for.
    fn set_server_list(&self, envs: &[ExecutionEnvironment]);
}

/// Process-local store; nothing is written to disk.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    remember: Mutex<HashSet<ExecutionEnvironment>>,
    servers: Mutex<Vec<ExecutionEnvironment>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The list passed to the last `set_server_list` call.
    pub fn server_list(&self) -> Vec<ExecutionEnvironment> {
        self.servers.lock().clone()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn is_remember_password(&self, env: &ExecutionEnvironment) -> bool {
        self.remember.lock().contains(env)
    }

    fn set_remember_password(&self, env: &ExecutionEnvironment, remember: bool) {
        let mut set = self.remember.lock();
        if remember {
            set.insert(env.clone());
        } else {
            set.remove(env);
        }
    }

    fn set_server_list(&self, envs: &[ExecutionEnvironment]) {
        // Forget remembered flags for targets that are gone.
        self.remember.lock().retain(|env| envs.contains(env));
        *self.servers.lock() = envs.to_vec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_list_prunes_remembered_flags() {
        let store = MemoryCredentialStore::new();
        let a = ExecutionEnvironment::remote("dev", "a", 22);
        let b = ExecutionEnvironment::remote("dev", "b", 22);
        store.set_remember_password(&a, true);
        store.set_remember_password(&b, true);

        store.set_server_list(std::slice::from_ref(&b));

        assert!(!store.is_remember_password(&a));
        assert!(store.is_remember_password(&b));
        assert_eq!(store.server_list(), vec![b]);
    }
}
