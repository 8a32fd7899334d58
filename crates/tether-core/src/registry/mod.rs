//! Server registry: the ordered set of known execution targets.
//!
//! The first listed record is always the local machine; remote records follow
//! sorted by host name. Records created on demand, or dropped by a bulk
//! replace, wait in a staged ("unlisted") list until they are committed again
//! or discarded by [`ServerRegistry::save`].
//!
//! Readers get immutable snapshots and never wait on writers for long. The
//! listed and staged lists are swapped together, so a record moving between
//! them is always visible in one of the two. Every
//! structural change (insert, promotion, bulk replace, default change) is
//! serialized through one registry lock, which is never held while a record
//! connects. Registry events are published after the lock is released.

pub mod codec;

use std::cmp::Ordering;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::preferences::{MemoryPreferences, PreferenceStore, keys};
use crate::connection::ConnectionEvent;
use crate::env::ExecutionEnvironment;
use crate::env::id::{EnvironmentIdCodec, UriIdCodec};
use crate::events::{EventBus, Subscription};
use crate::host::HostProfile;
use crate::server::{RecordEvent, ServerRecord};
use crate::services::Services;

use codec::{SavedServer, ServerListCodec};

/// Immutable view of a record list at one point in time.
pub type Snapshot = Arc<Vec<Arc<ServerRecord>>>;

/// Listed and staged records, replaced as one unit.
#[derive(Clone)]
struct Lists {
    items: Snapshot,
    unlisted: Snapshot,
}

/// Picks the sync strategy id for a record that was created without one.
pub type DefaultStrategyResolver =
    Box<dyn Fn(&ExecutionEnvironment) -> Option<String> + Send + Sync>;

/// Registry-level notifications.
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    ServersChanged { old: Snapshot, new: Snapshot },
    DefaultChanged {
        old: Arc<ServerRecord>,
        new: Arc<ServerRecord>,
    },
}

/// Where a record currently sits in the registry.
#[derive(Debug, Clone)]
pub enum Listing {
    /// Listed, persisted, and eligible as default.
    Committed(Arc<ServerRecord>),
    /// Created on demand or removed by a bulk replace; not persisted.
    Staged(Arc<ServerRecord>),
}

impl Listing {
    pub fn record(&self) -> &Arc<ServerRecord> {
        match self {
            Listing::Committed(record) | Listing::Staged(record) => record,
        }
    }

    pub fn into_record(self) -> Arc<ServerRecord> {
        match self {
            Listing::Committed(record) | Listing::Staged(record) => record,
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, Listing::Committed(_))
    }
}

/// Options for [`ServerRegistry::add_server`]
#[derive(Debug, Clone)]
pub struct AddServerOptions {
    pub env: ExecutionEnvironment,
    pub display_name: Option<String>,
    pub sync_strategy: Option<String>,
    pub x11_forwarding: Option<bool>,
    /// Make the record the default server
    pub as_default: bool,
    /// Connect and run setup before returning (blocks)
    pub connect: bool,
}

impl AddServerOptions {
    pub fn new(env: ExecutionEnvironment) -> Self {
        Self {
            env,
            display_name: None,
            sync_strategy: None,
            x11_forwarding: None,
            as_default: false,
            connect: false,
        }
    }

    /// Options that reproduce an existing record's editable fields.
    pub fn from_record(record: &ServerRecord) -> Self {
        Self {
            env: record.env().clone(),
            display_name: Some(record.display_name()),
            sync_strategy: record.sync_strategy(),
            x11_forwarding: Some(record.x11_forwarding()),
            as_default: false,
            connect: false,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_sync_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.sync_strategy = Some(strategy.into());
        self
    }

    pub fn with_x11_forwarding(mut self, enabled: bool) -> Self {
        self.x11_forwarding = Some(enabled);
        self
    }

    pub fn as_default(mut self, as_default: bool) -> Self {
        self.as_default = as_default;
        self
    }

    pub fn with_connect(mut self, connect: bool) -> Self {
        self.connect = connect;
        self
    }
}

/// Builds a [`ServerRegistry`] from saved preferences.
pub struct RegistryBuilder {
    services: Services,
    ids: Arc<dyn EnvironmentIdCodec>,
    prefs: Arc<dyn PreferenceStore>,
    default_strategy: Option<DefaultStrategyResolver>,
}

impl RegistryBuilder {
    pub fn new(services: Services) -> Self {
        Self {
            services,
            ids: Arc::new(UriIdCodec),
            prefs: Arc::new(MemoryPreferences::new()),
            default_strategy: None,
        }
    }

    pub fn with_id_codec(mut self, ids: Arc<dyn EnvironmentIdCodec>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_preferences(mut self, prefs: Arc<dyn PreferenceStore>) -> Self {
        self.prefs = prefs;
        self
    }

    /// Override how new records get their sync strategy. By default the first
    /// registered strategy applicable to an unknown host is used.
    pub fn with_default_strategy<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&ExecutionEnvironment) -> Option<String> + Send + Sync + 'static,
    {
        self.default_strategy = Some(Box::new(resolver));
        self
    }

    /// Load saved servers and the default pointer, and start listening for
    /// connection events.
    pub fn load(self) -> Arc<ServerRegistry> {
        let RegistryBuilder {
            services,
            ids,
            prefs,
            default_strategy,
        } = self;
        let default_strategy =
            default_strategy.unwrap_or_else(|| first_applicable_resolver(services.clone()));

        let mut items = vec![Arc::new(ServerRecord::local(services.clone()))];
        if let Some(encoded) = prefs.get(keys::SERVERS) {
            for saved in ServerListCodec::new(ids.as_ref()).decode(&encoded) {
                if items.iter().any(|record| record.env() == &saved.env) {
                    warn!(server = %saved.env, "duplicate saved server, skipping");
                    continue;
                }
                let strategy = match saved.sync_strategy {
                    Some(id) if services.strategies().contains(&id) => Some(id),
                    Some(id) => {
                        warn!(server = %saved.env, strategy = %id, "unknown saved sync strategy, using default");
                        default_strategy(&saved.env)
                    }
                    None => default_strategy(&saved.env),
                };
                let record = ServerRecord::remote(
                    saved.env,
                    Some(&saved.display_name),
                    strategy,
                    services.clone(),
                );
                record.restore(saved.x11_forwarding, saved.profile);
                insert_sorted(&mut items, Arc::new(record));
            }
        }

        let default_record = resolve_default(&items, prefs.as_ref(), ids.as_ref());
        info!(
            servers = items.len() - 1,
            default = %default_record.env(),
            "server registry loaded"
        );

        let registry = Arc::new_cyclic(|this| ServerRegistry {
            this: Weak::clone(this),
            services,
            ids,
            prefs,
            default_strategy,
            lists: RwLock::new(Lists {
                items: Arc::new(items),
                unlisted: Arc::new(Vec::new()),
            }),
            default_record: RwLock::new(default_record),
            lock: Mutex::new(()),
            events: EventBus::new(),
            connection_subscription: Mutex::new(None),
        });
        for record in registry.servers().iter() {
            registry.watch_record(record);
        }
        registry.watch_connections();
        registry
    }
}

/// Changes accumulated under the registry lock, published after it.
#[derive(Default)]
struct Changes {
    servers: Option<Snapshot>,
    default: Option<Arc<ServerRecord>>,
}

impl Changes {
    fn is_empty(&self) -> bool {
        self.servers.is_none() && self.default.is_none()
    }
}

/// The set of execution targets known to the application.
pub struct ServerRegistry {
    this: Weak<ServerRegistry>,
    services: Services,
    ids: Arc<dyn EnvironmentIdCodec>,
    prefs: Arc<dyn PreferenceStore>,
    default_strategy: DefaultStrategyResolver,
    lists: RwLock<Lists>,
    default_record: RwLock<Arc<ServerRecord>>,
    lock: Mutex<()>,
    events: EventBus<RegistryEvent>,
    connection_subscription: Mutex<Option<Subscription>>,
}

impl ServerRegistry {
    pub fn builder(services: Services) -> RegistryBuilder {
        RegistryBuilder::new(services)
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Listed records: local first, then remotes by host name.
    pub fn servers(&self) -> Snapshot {
        Arc::clone(&self.lists.read().items)
    }

    /// Staged records that are not listed.
    pub fn unlisted(&self) -> Snapshot {
        Arc::clone(&self.lists.read().unlisted)
    }

    pub fn remote_servers(&self) -> Vec<Arc<ServerRecord>> {
        self.servers()
            .iter()
            .filter(|record| record.env().is_remote())
            .cloned()
            .collect()
    }

    pub fn local(&self) -> Arc<ServerRecord> {
        Arc::clone(&self.lists.read().items[0])
    }

    pub fn default_record(&self) -> Arc<ServerRecord> {
        Arc::clone(&self.default_record.read())
    }

    /// Find the record for `env`, listed or staged.
    pub fn get(&self, env: &ExecutionEnvironment) -> Option<Arc<ServerRecord>> {
        self.lookup(env).map(Listing::into_record)
    }

    /// Find the record for `env` and report whether it is committed.
    pub fn lookup(&self, env: &ExecutionEnvironment) -> Option<Listing> {
        let lists = self.lists.read().clone();
        if let Some(record) = find(&lists.items, env) {
            return Some(Listing::Committed(record));
        }
        find(&lists.unlisted, env).map(Listing::Staged)
    }

    /// Find the record for `env`, staging a new one if there is none.
    pub fn get_or_create(&self, env: &ExecutionEnvironment) -> Arc<ServerRecord> {
        if let Some(record) = self.get(env) {
            return record;
        }

        let _guard = self.lock.lock();
        // Another thread may have created it while we waited.
        if let Some(record) = self.get(env) {
            return record;
        }

        let record = Arc::new(ServerRecord::remote(
            env.clone(),
            None,
            (self.default_strategy)(env),
            self.services.clone(),
        ));
        self.watch_record(&record);
        let mut staged = Vec::clone(&self.unlisted());
        staged.push(Arc::clone(&record));
        self.lists.write().unlisted = Arc::new(staged);
        debug!(server = %env, "staged new server");
        record
    }

    /// Add a server, or return the existing one.
    ///
    /// A listed record is returned unchanged (promoted to default if asked).
    /// A staged record is revived with the given name and strategy and
    /// listed. Otherwise a new record is created `Offline`. With `connect`,
    /// the call then blocks while the record connects and runs its setup.
    pub fn add_server(&self, options: AddServerOptions) -> Arc<ServerRecord> {
        let (record, changes) = {
            let _guard = self.lock.lock();
            let mut changes = Changes::default();
            let record = self.add_server_locked(&options, &mut changes);
            (record, changes)
        };
        self.publish(changes);

        if options.connect {
            record.check_setup_after_connection();
        }
        record
    }

    /// Replace the listed servers with `records` and make `default` the
    /// default server.
    ///
    /// Current remote records are not destroyed: they are flagged deleted and
    /// staged, and come back unchanged if they appear in `records`.
    ///
    /// # Panics
    ///
    /// If `default` is neither local nor one of `records`.
    pub fn set(&self, records: &[Arc<ServerRecord>], default: &Arc<ServerRecord>) {
        assert!(
            default.is_local() || records.iter().any(|record| record.env() == default.env()),
            "default server {} is not among the servers being set",
            default.env()
        );

        let changes = {
            let _guard = self.lock.lock();
            let old_items = self.servers();

            let (kept, dropped): (Vec<_>, Vec<_>) =
                old_items.iter().cloned().partition(|record| record.is_local());
            for record in &dropped {
                record.set_deleted(true);
            }
            let mut staged = Vec::clone(&self.unlisted());
            staged.extend(dropped);
            *self.lists.write() = Lists {
                items: Arc::new(kept),
                unlisted: Arc::new(staged),
            };

            let mut changes = Changes {
                servers: Some(old_items),
                default: None,
            };
            for record in records {
                self.add_server_locked(&AddServerOptions::from_record(record), &mut changes);
            }

            let listed = find(&self.servers(), default.env()).unwrap_or_else(|| self.local());
            self.set_default_locked(&listed, &mut changes);
            changes
        };
        self.publish(changes);

        let remotes: Vec<ExecutionEnvironment> = self
            .remote_servers()
            .iter()
            .map(|record| record.env().clone())
            .collect();
        self.services.credentials().set_server_list(&remotes);
    }

    /// Commit the current list: staged records that were never listed are
    /// discarded.
    pub fn save(&self) {
        let _guard = self.lock.lock();
        let discarded = self.unlisted().len();
        self.lists.write().unlisted = Arc::new(Vec::new());
        if discarded > 0 {
            debug!(discarded, "discarded staged servers");
        }
    }

    /// Make a listed record the default server.
    ///
    /// # Panics
    ///
    /// If the record is not listed. The default is left unchanged.
    pub fn set_default_record(&self, record: &Arc<ServerRecord>) {
        let changes = {
            let _guard = self.lock.lock();
            let Some(listed) = find(&self.servers(), record.env()) else {
                panic!("default server {} is not a listed server", record.env());
            };
            let mut changes = Changes::default();
            self.set_default_locked(&listed, &mut changes);
            changes
        };
        self.publish(changes);
    }

    /// Listen for list and default changes.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&RegistryEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(listener)
    }

    /// Write the remote list and default pointer to preferences.
    pub fn persist(&self) {
        let servers: Vec<SavedServer> = self
            .servers()
            .iter()
            .filter(|record| record.env().is_remote())
            .map(|record| record.to_saved())
            .collect();
        let encoded = ServerListCodec::new(self.ids.as_ref()).encode(&servers);
        let default_id = self.ids.to_unique_id(self.default_record().env());

        self.prefs.set(keys::SERVERS, &encoded);
        self.prefs.set(keys::DEFAULT_SERVER, &default_id);
        self.prefs.remove(keys::LEGACY_DEFAULT_INDEX);
        debug!(servers = servers.len(), default = %default_id, "server list persisted");
    }

    fn add_server_locked(
        &self,
        options: &AddServerOptions,
        changes: &mut Changes,
    ) -> Arc<ServerRecord> {
        let env = &options.env;
        let lists = self.lists.read().clone();

        if let Some(existing) = find(&lists.items, env) {
            if options.as_default {
                self.set_default_locked(&existing, changes);
            }
            return existing;
        }

        let mut unlisted = Vec::clone(&lists.unlisted);
        let staged = unlisted
            .iter()
            .position(|record| record.env() == env)
            .map(|position| unlisted.remove(position));
        let record = match staged {
            Some(staged) => {
                staged.set_deleted(false);
                if let Some(name) = &options.display_name {
                    staged.set_display_name(name);
                }
                if options.sync_strategy.is_some() {
                    staged.set_sync_strategy(options.sync_strategy.clone());
                }
                staged
            }
            None => {
                let strategy = options
                    .sync_strategy
                    .clone()
                    .or_else(|| (self.default_strategy)(env));
                let record = Arc::new(ServerRecord::remote(
                    env.clone(),
                    options.display_name.as_deref(),
                    strategy,
                    self.services.clone(),
                ));
                record.mark_offline();
                self.watch_record(&record);
                record
            }
        };
        if let Some(enabled) = options.x11_forwarding {
            record.set_x11_forwarding(enabled);
        }

        let mut items = Vec::clone(&lists.items);
        insert_sorted(&mut items, Arc::clone(&record));
        *self.lists.write() = Lists {
            items: Arc::new(items),
            unlisted: Arc::new(unlisted),
        };
        changes.servers.get_or_insert(lists.items);
        info!(server = %env, "server added");

        if options.as_default {
            self.set_default_locked(&record, changes);
        }
        record
    }

    fn set_default_locked(&self, record: &Arc<ServerRecord>, changes: &mut Changes) {
        let old = std::mem::replace(&mut *self.default_record.write(), Arc::clone(record));
        if changes.default.is_none() && old != *record {
            changes.default = Some(old);
        }
    }

    fn publish(&self, changes: Changes) {
        if changes.is_empty() {
            return;
        }
        if let Some(old) = changes.servers {
            self.events.publish(&RegistryEvent::ServersChanged {
                old,
                new: self.servers(),
            });
        }
        if let Some(old) = changes.default {
            let new = self.default_record();
            if old != new {
                self.events
                    .publish(&RegistryEvent::DefaultChanged { old, new });
            }
        }
        self.persist();
    }

    /// Persist when a listed record learns a new host profile, since the
    /// change may also have replaced its sync strategy.
    fn watch_record(&self, record: &ServerRecord) {
        let weak = Weak::clone(&self.this);
        record
            .subscribe(move |event| {
                if let RecordEvent::HostProfileChanged { env, .. } = event
                    && let Some(registry) = weak.upgrade()
                    && registry
                        .lookup(env)
                        .is_some_and(|listing| listing.is_committed())
                {
                    registry.persist();
                }
            })
            .detach();
    }

    fn watch_connections(&self) {
        let weak = Weak::clone(&self.this);
        let subscription = self
            .services
            .connections()
            .add_connection_listener(Arc::new(move |event: &ConnectionEvent| {
                if let Some(registry) = weak.upgrade() {
                    registry.on_connection_event(event);
                }
            }));
        *self.connection_subscription.lock() = Some(subscription);
    }

    fn on_connection_event(&self, event: &ConnectionEvent) {
        match event {
            ConnectionEvent::Connected(env) => {
                if let Some(record) = find(&self.servers(), env) {
                    record.check_setup_after_connection();
                }
            }
            ConnectionEvent::Disconnected(env) => {
                // State is corrected lazily by the next is_online/is_offline query.
                debug!(server = %env, "disconnected");
            }
        }
    }
}

impl fmt::Debug for ServerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerRegistry")
            .field("servers", &self.servers())
            .field("unlisted", &self.unlisted())
            .field("default", &self.default_record().env())
            .finish_non_exhaustive()
    }
}

fn find(records: &[Arc<ServerRecord>], env: &ExecutionEnvironment) -> Option<Arc<ServerRecord>> {
    records.iter().find(|record| record.env() == env).cloned()
}

/// Local first, then ascending host name.
fn compare_records(a: &ServerRecord, b: &ServerRecord) -> Ordering {
    b.is_local()
        .cmp(&a.is_local())
        .then_with(|| a.env().host().cmp(b.env().host()))
}

/// Insert before the first record that does not sort before `record`,
/// shifting the tail right.
fn insert_sorted(records: &mut Vec<Arc<ServerRecord>>, record: Arc<ServerRecord>) {
    let position = records
        .iter()
        .position(|existing| compare_records(existing, &record) != Ordering::Less)
        .unwrap_or(records.len());
    records.insert(position, record);
}

fn first_applicable_resolver(services: Services) -> DefaultStrategyResolver {
    Box::new(move |env| {
        services
            .strategies()
            .first_applicable(env, &HostProfile::default())
            .map(|strategy| strategy.id().to_string())
    })
}

/// Default from the saved id, else the legacy index (clamped), else local.
fn resolve_default(
    items: &[Arc<ServerRecord>],
    prefs: &dyn PreferenceStore,
    ids: &dyn EnvironmentIdCodec,
) -> Arc<ServerRecord> {
    if let Some(id) = prefs.get(keys::DEFAULT_SERVER) {
        let saved = ids
            .from_unique_id(&id)
            .and_then(|env| find(items, &env));
        return saved.unwrap_or_else(|| {
            warn!(id = %id, "saved default server is not listed, using local");
            Arc::clone(&items[0])
        });
    }

    let legacy_index = prefs
        .get(keys::LEGACY_DEFAULT_INDEX)
        .and_then(|value| value.trim().parse::<i64>().ok());
    if let Some(index) = legacy_index {
        let last = items.len().saturating_sub(1) as i64;
        let index = index.clamp(0, last) as usize;
        return Arc::clone(&items[index]);
    }

    Arc::clone(&items[0])
}
