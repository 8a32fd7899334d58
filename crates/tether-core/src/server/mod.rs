//! Server records: one execution target's mutable state and setup lifecycle.
//!
//! A record is bound to exactly one [`ExecutionEnvironment`] and compares
//! equal to any other record for the same environment. Its mutable fields sit
//! behind a per-record lock that is never held across blocking calls, so the
//! registry lock and a long-running `init` never overlap.

mod init;
mod pool;
mod state;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::env::ExecutionEnvironment;
use crate::events::{EventBus, Subscription};
use crate::host::HostProfile;
use crate::registry::codec::{FIELD_SEPARATOR, RECORD_SEPARATOR, SavedServer};
use crate::services::Services;

use pool::WorkerPool;

pub use state::{ServerState, StatusLevel, StatusMessage};

const LOCAL_DISPLAY_NAME: &str = "Local Machine";
const ESCAPE_CHAR: char = '_';

/// Notifications published by a single record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordEvent {
    StateChanged {
        env: ExecutionEnvironment,
        old: ServerState,
        new: ServerState,
    },
    DisplayNameChanged {
        env: ExecutionEnvironment,
        old: String,
        new: String,
    },
    /// Host info reported a different profile. `sync_strategy` is the
    /// selection after any substitution it caused.
    HostProfileChanged {
        env: ExecutionEnvironment,
        profile: HostProfile,
        sync_strategy: Option<String>,
    },
}

/// Replace the persistence delimiters in a display name.
///
/// Idempotent: escaping an escaped name changes nothing.
pub fn escape_display_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c == FIELD_SEPARATOR || c == RECORD_SEPARATOR {
                ESCAPE_CHAR
            } else {
                c
            }
        })
        .collect()
}

fn display_name_or_label(name: Option<&str>, env: &ExecutionEnvironment) -> String {
    match name {
        Some(name) if !name.is_empty() => escape_display_name(name),
        _ => escape_display_name(&env.to_string()),
    }
}

#[derive(Debug)]
struct RecordFields {
    state: ServerState,
    display_name: String,
    deleted: bool,
    reason: Option<String>,
    problems: Option<String>,
    sync_strategy: Option<String>,
    x11_forwarding: bool,
    profile: HostProfile,
    needs_validation_on_connect: bool,
}

/// Registry entry for one execution target.
pub struct ServerRecord {
    env: ExecutionEnvironment,
    services: Services,
    fields: Mutex<RecordFields>,
    events: EventBus<RecordEvent>,
    initializing: AtomicBool,
    pool: Mutex<Option<Arc<WorkerPool>>>,
}

impl ServerRecord {
    /// The local machine: always online, never editable or deleted.
    pub(crate) fn local(services: Services) -> Self {
        Self::with_fields(
            ExecutionEnvironment::local(),
            services,
            RecordFields {
                state: ServerState::Online,
                display_name: LOCAL_DISPLAY_NAME.to_string(),
                deleted: false,
                reason: None,
                problems: None,
                sync_strategy: None,
                x11_forwarding: false,
                profile: HostProfile::default(),
                needs_validation_on_connect: false,
            },
        )
    }

    /// A remote target that has not been connected yet.
    pub(crate) fn remote(
        env: ExecutionEnvironment,
        display_name: Option<&str>,
        sync_strategy: Option<String>,
        services: Services,
    ) -> Self {
        let display_name = display_name_or_label(display_name, &env);
        Self::with_fields(
            env,
            services,
            RecordFields {
                state: ServerState::Uninitialized,
                display_name,
                deleted: false,
                reason: None,
                problems: None,
                sync_strategy,
                x11_forwarding: false,
                profile: HostProfile::default(),
                needs_validation_on_connect: true,
            },
        )
    }

    fn with_fields(env: ExecutionEnvironment, services: Services, fields: RecordFields) -> Self {
        Self {
            env,
            services,
            fields: Mutex::new(fields),
            events: EventBus::new(),
            initializing: AtomicBool::new(false),
            pool: Mutex::new(None),
        }
    }

    pub fn env(&self) -> &ExecutionEnvironment {
        &self.env
    }

    pub fn is_local(&self) -> bool {
        self.env.is_local()
    }

    /// Only remote records can be edited or removed.
    pub fn is_editable(&self) -> bool {
        !self.env.is_local()
    }

    /// Cached state, without consulting the transport.
    pub fn state(&self) -> ServerState {
        self.fields.lock().state
    }

    /// Whether the target is online.
    ///
    /// Self-healing query: a cached `Online` whose connection the transport
    /// no longer reports is demoted to `Offline` before answering.
    pub fn is_online(&self) -> bool {
        self.refresh_state() == ServerState::Online
    }

    /// Whether the target is offline. Same self-healing rule as [`is_online`].
    ///
    /// [`is_online`]: ServerRecord::is_online
    pub fn is_offline(&self) -> bool {
        self.refresh_state() == ServerState::Offline
    }

    /// Reconcile the cached state with the transport and return it.
    pub fn refresh_state(&self) -> ServerState {
        let state = self.state();
        if state != ServerState::Online
            || self.is_local()
            || self.services.connections().is_connected_to(&self.env)
        {
            return state;
        }

        self.transition(|fields| {
            if fields.state == ServerState::Online {
                fields.state = ServerState::Offline;
                fields.reason = Some("Connection lost".to_string());
            }
        });
        info!(server = %self.env, "connection lost, marking offline");
        self.state()
    }

    pub fn display_name(&self) -> String {
        self.fields.lock().display_name.clone()
    }

    /// Set the display name; persistence delimiters become `_` and an empty
    /// name falls back to the target label.
    pub fn set_display_name(&self, name: &str) {
        if self.is_local() {
            return;
        }
        let new = display_name_or_label(Some(name), &self.env);
        let old = {
            let mut fields = self.fields.lock();
            if fields.display_name == new {
                return;
            }
            std::mem::replace(&mut fields.display_name, new.clone())
        };
        self.events.publish(&RecordEvent::DisplayNameChanged {
            env: self.env.clone(),
            old,
            new,
        });
    }

    pub fn is_deleted(&self) -> bool {
        self.fields.lock().deleted
    }

    pub(crate) fn set_deleted(&self, deleted: bool) {
        if self.is_local() {
            return;
        }
        self.fields.lock().deleted = deleted;
    }

    /// Error text from the last failed connect.
    pub fn reason(&self) -> Option<String> {
        self.fields.lock().reason.clone()
    }

    /// Non-fatal setup diagnostic from the last successful `init`.
    pub fn problems(&self) -> Option<String> {
        self.fields.lock().problems.clone()
    }

    pub fn sync_strategy(&self) -> Option<String> {
        self.fields.lock().sync_strategy.clone()
    }

    pub fn set_sync_strategy(&self, strategy: Option<String>) {
        if self.is_local() {
            return;
        }
        self.fields.lock().sync_strategy = strategy;
    }

    pub fn x11_forwarding(&self) -> bool {
        self.fields.lock().x11_forwarding
    }

    pub fn set_x11_forwarding(&self, enabled: bool) {
        if self.is_local() {
            return;
        }
        self.fields.lock().x11_forwarding = enabled;
    }

    pub fn host_profile(&self) -> HostProfile {
        self.fields.lock().profile.clone()
    }

    pub fn needs_validation_on_connect(&self) -> bool {
        self.fields.lock().needs_validation_on_connect
    }

    pub fn set_needs_validation_on_connect(&self, needed: bool) {
        self.fields.lock().needs_validation_on_connect = needed;
    }

    pub fn is_remember_password(&self) -> bool {
        self.services.credentials().is_remember_password(&self.env)
    }

    pub fn set_remember_password(&self, remember: bool) {
        self.services
            .credentials()
            .set_remember_password(&self.env, remember);
    }

    /// Listen for state, display-name and host-profile changes of this record.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&RecordEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(listener)
    }

    /// User-facing summary of the current state, reason, and problems.
    pub fn status_message(&self) -> StatusMessage {
        let fields = self.fields.lock();
        StatusMessage::summarize(
            &fields.display_name,
            fields.state,
            fields.reason.as_deref(),
            fields.problems.as_deref(),
        )
    }

    /// Restore fields that were saved alongside the record.
    pub(crate) fn restore(&self, x11_forwarding: bool, profile: HostProfile) {
        let mut fields = self.fields.lock();
        fields.x11_forwarding = x11_forwarding;
        fields.profile = profile;
    }

    /// Known but not connected.
    pub(crate) fn mark_offline(&self) {
        self.transition(|fields| fields.state = ServerState::Offline);
    }

    pub(crate) fn to_saved(&self) -> SavedServer {
        let fields = self.fields.lock();
        SavedServer {
            env: self.env.clone(),
            display_name: fields.display_name.clone(),
            sync_strategy: fields.sync_strategy.clone(),
            x11_forwarding: fields.x11_forwarding,
            profile: fields.profile.clone(),
        }
    }

    /// Apply `update` under the record lock and publish a state change if
    /// the state moved. The local record never transitions.
    fn transition<F>(&self, update: F)
    where
        F: FnOnce(&mut RecordFields),
    {
        if self.is_local() {
            return;
        }
        let (old, new) = {
            let mut fields = self.fields.lock();
            let old = fields.state;
            update(&mut fields);
            (old, fields.state)
        };
        if old != new {
            debug!(server = %self.env, %old, %new, "server state changed");
            self.events.publish(&RecordEvent::StateChanged {
                env: self.env.clone(),
                old,
                new,
            });
        }
    }
}

impl PartialEq for ServerRecord {
    fn eq(&self, other: &Self) -> bool {
        self.env == other.env
    }
}

impl Eq for ServerRecord {}

impl Hash for ServerRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.env.hash(state);
    }
}

impl fmt::Debug for ServerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = self.fields.lock();
        f.debug_struct("ServerRecord")
            .field("env", &self.env)
            .field("state", &fields.state)
            .field("display_name", &fields.display_name)
            .field("deleted", &fields.deleted)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnectionEvent, ConnectionManager};
    use crate::error::RemoteError;
    use crate::events::Listener;
    use std::sync::atomic::Ordering;

    #[derive(Default)]
    struct Switch {
        connected: std::sync::atomic::AtomicBool,
    }

    impl ConnectionManager for Switch {
        fn connect_to(&self, _env: &ExecutionEnvironment) -> Result<(), RemoteError> {
            self.connected.store(true, Ordering::SeqCst);
            Ok(())
        }
        fn is_connected_to(&self, _env: &ExecutionEnvironment) -> bool {
            self.connected.load(Ordering::SeqCst)
        }
        fn add_connection_listener(&self, _listener: Listener<ConnectionEvent>) -> Subscription {
            Subscription::empty()
        }
    }

    fn remote_record(name: Option<&str>) -> (Arc<Switch>, ServerRecord) {
        let switch = Arc::new(Switch::default());
        let services = Services::new(switch.clone());
        let env = ExecutionEnvironment::remote("dev", "box", 22);
        (switch, ServerRecord::remote(env, name, None, services))
    }

    #[test]
    fn test_escape_display_name() {
        assert_eq!(escape_display_name("a|b,c"), "a_b_c");
        assert_eq!(escape_display_name("plain"), "plain");
        let once = escape_display_name("x||,y");
        assert_eq!(escape_display_name(&once), once);
    }

    #[test]
    fn test_default_display_name_is_env_label() {
        let (_, record) = remote_record(None);
        assert_eq!(record.display_name(), "dev@box:22");
    }

    #[test]
    fn test_set_display_name_escapes_and_notifies() {
        let (_, record) = remote_record(Some("build"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let _subscription = {
            let seen = Arc::clone(&seen);
            record.subscribe(move |event| seen.lock().push(event.clone()))
        };

        record.set_display_name("build|box");
        record.set_display_name("build_box");

        assert_eq!(record.display_name(), "build_box");
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_empty_display_name_falls_back_to_label() {
        let (_, record) = remote_record(Some("build"));
        record.set_display_name("");
        assert_eq!(record.display_name(), "dev@box:22");
    }

    #[test]
    fn test_local_record_is_fixed() {
        let services = Services::new(Arc::new(Switch::default()));
        let record = ServerRecord::local(services);

        record.set_deleted(true);
        record.mark_offline();

        assert!(record.is_online());
        assert!(!record.is_deleted());
        assert!(!record.is_editable());
    }

    #[test]
    fn test_is_online_demotes_when_transport_disconnected() {
        let (switch, record) = remote_record(None);
        record.transition(|fields| fields.state = ServerState::Online);

        assert!(!record.is_online());
        assert_eq!(record.state(), ServerState::Offline);
        assert_eq!(record.reason().as_deref(), Some("Connection lost"));

        switch.connected.store(true, Ordering::SeqCst);
        assert!(record.is_offline());
    }

    #[test]
    fn test_records_compare_by_environment() {
        let (_, a) = remote_record(Some("one"));
        let (_, b) = remote_record(Some("two"));
        assert_eq!(a, b);
    }
}
