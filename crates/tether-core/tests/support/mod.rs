#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

use parking_lot::Mutex;

use tether_core::connection::{ConnectionEvent, ConnectionManager};
use tether_core::env::ExecutionEnvironment;
use tether_core::error::RemoteError;
use tether_core::events::{EventBus, Listener, Subscription};
use tether_core::host::{HostInfoProvider, HostProfile};
use tether_core::services::Services;
use tether_core::setup::{PathMapper, SupportInstaller};

pub fn env(host: &str) -> ExecutionEnvironment {
    ExecutionEnvironment::remote("dev", host, 22)
}

/// Transport whose outcomes are scripted per target.
#[derive(Default)]
pub struct FakeConnections {
    connected: Mutex<HashSet<ExecutionEnvironment>>,
    failures: Mutex<HashMap<ExecutionEnvironment, RemoteError>>,
    events: EventBus<ConnectionEvent>,
    connects: AtomicUsize,
}

impl FakeConnections {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, env: &ExecutionEnvironment, error: RemoteError) {
        self.failures.lock().insert(env.clone(), error);
    }

    pub fn succeed(&self, env: &ExecutionEnvironment) {
        self.failures.lock().remove(env);
    }

    /// Drop the connection without telling anyone but listeners.
    pub fn disconnect(&self, env: &ExecutionEnvironment) {
        self.connected.lock().remove(env);
        self.events
            .publish(&ConnectionEvent::Disconnected(env.clone()));
    }

    /// Connection established from outside the registry.
    pub fn announce_connected(&self, env: &ExecutionEnvironment) {
        self.connected.lock().insert(env.clone());
        self.events.publish(&ConnectionEvent::Connected(env.clone()));
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn listener_count(&self) -> usize {
        self.events.listener_count()
    }
}

impl ConnectionManager for FakeConnections {
    fn connect_to(&self, env: &ExecutionEnvironment) -> Result<(), RemoteError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let failure = self.failures.lock().get(env).cloned();
        if let Some(error) = failure {
            return Err(error);
        }
        self.announce_connected(env);
        Ok(())
    }

    fn is_connected_to(&self, env: &ExecutionEnvironment) -> bool {
        self.connected.lock().contains(env)
    }

    fn add_connection_listener(&self, listener: Listener<ConnectionEvent>) -> Subscription {
        self.events.subscribe_listener(listener)
    }
}

/// Host info that always answers with the same profile.
pub struct FixedHostInfo(pub HostProfile);

impl HostInfoProvider for FixedHostInfo {
    fn is_available(&self, _env: &ExecutionEnvironment) -> bool {
        true
    }

    fn host_info(&self, _env: &ExecutionEnvironment) -> Result<HostProfile, RemoteError> {
        Ok(self.0.clone())
    }
}

/// Installer whose install blocks until released (or the gate is dropped).
pub struct BlockingInstaller {
    gate: Mutex<Receiver<()>>,
    started: AtomicUsize,
}

impl BlockingInstaller {
    pub fn new() -> (Arc<Self>, Sender<()>) {
        let (tx, rx) = mpsc::channel();
        let installer = Arc::new(Self {
            gate: Mutex::new(rx),
            started: AtomicUsize::new(0),
        });
        (installer, tx)
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

impl SupportInstaller for BlockingInstaller {
    fn needs_install(
        &self,
        _env: &ExecutionEnvironment,
        _profile: &HostProfile,
    ) -> Result<bool, RemoteError> {
        Ok(true)
    }

    fn install(&self, _env: &ExecutionEnvironment, _profile: &HostProfile) -> Result<(), RemoteError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let _ = self.gate.lock().recv_timeout(Duration::from_secs(30));
        Ok(())
    }
}

/// Installer whose job dies without reporting back.
pub struct PanickingInstaller;

impl SupportInstaller for PanickingInstaller {
    fn needs_install(
        &self,
        _env: &ExecutionEnvironment,
        _profile: &HostProfile,
    ) -> Result<bool, RemoteError> {
        panic!("setup worker torn down");
    }

    fn install(&self, _env: &ExecutionEnvironment, _profile: &HostProfile) -> Result<(), RemoteError> {
        Ok(())
    }
}

/// Path mapper that records which targets were primed.
#[derive(Default)]
pub struct RecordingPathMapper {
    primed: Mutex<Vec<ExecutionEnvironment>>,
}

impl RecordingPathMapper {
    pub fn primed(&self) -> Vec<ExecutionEnvironment> {
        self.primed.lock().clone()
    }
}

impl PathMapper for RecordingPathMapper {
    fn prime(&self, env: &ExecutionEnvironment) {
        self.primed.lock().push(env.clone());
    }
}

pub fn services(connections: &Arc<FakeConnections>) -> Services {
    Services::new(Arc::clone(connections) as Arc<dyn ConnectionManager>)
}

/// Poll until `check` holds or a few seconds pass.
pub fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    check()
}
