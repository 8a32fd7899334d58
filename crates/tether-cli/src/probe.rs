//! TCP reachability transport.
//!
//! A target counts as connected once a TCP connection to `host:port`
//! succeeds. Nothing is spoken over the socket.

use std::collections::HashSet;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use tether_core::connection::{ConnectionEvent, ConnectionManager};
use tether_core::env::ExecutionEnvironment;
use tether_core::error::RemoteError;
use tether_core::events::{EventBus, Listener, Subscription};

pub struct TcpProbe {
    timeout: Duration,
    connected: Mutex<HashSet<ExecutionEnvironment>>,
    events: EventBus<ConnectionEvent>,
}

impl TcpProbe {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            connected: Mutex::new(HashSet::new()),
            events: EventBus::new(),
        }
    }

    fn probe(&self, env: &ExecutionEnvironment) -> Result<(), RemoteError> {
        let addrs = (env.host(), env.port())
            .to_socket_addrs()
            .map_err(|err| RemoteError::Io(format!("cannot resolve {}: {err}", env.host())))?;

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(_) => {
                    debug!(server = %env, %addr, "reachable");
                    return Ok(());
                }
                Err(err) => last_error = Some(err),
            }
        }
        Err(match last_error {
            Some(err) => RemoteError::Io(format!("{}:{}: {err}", env.host(), env.port())),
            None => RemoteError::Io(format!("no addresses for {}", env.host())),
        })
    }
}

impl ConnectionManager for TcpProbe {
    fn connect_to(&self, env: &ExecutionEnvironment) -> Result<(), RemoteError> {
        if env.is_local() {
            return Ok(());
        }
        self.probe(env)?;
        let newly_connected = self.connected.lock().insert(env.clone());
        if newly_connected {
            self.events.publish(&ConnectionEvent::Connected(env.clone()));
        }
        Ok(())
    }

    fn is_connected_to(&self, env: &ExecutionEnvironment) -> bool {
        env.is_local() || self.connected.lock().contains(env)
    }

    fn add_connection_listener(&self, listener: Listener<ConnectionEvent>) -> Subscription {
        self.events.subscribe_listener(listener)
    }
}
