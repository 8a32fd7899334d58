mod support;

use std::collections::HashSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use tether_core::config::preferences::{MemoryPreferences, PreferenceStore, keys};
use tether_core::credentials::MemoryCredentialStore;
use tether_core::env::ExecutionEnvironment;
use tether_core::env::id::UriIdCodec;
use tether_core::registry::codec::ServerListCodec;
use tether_core::registry::{AddServerOptions, RegistryEvent, ServerRegistry};
use tether_core::server::ServerState;

use support::{FakeConnections, env, services};

fn registry_with_prefs() -> (Arc<FakeConnections>, Arc<MemoryPreferences>, Arc<ServerRegistry>) {
    let connections = FakeConnections::new();
    let prefs = Arc::new(MemoryPreferences::new());
    let registry = ServerRegistry::builder(services(&connections))
        .with_preferences(Arc::clone(&prefs) as Arc<dyn PreferenceStore>)
        .load();
    (connections, prefs, registry)
}

fn hosts(registry: &ServerRegistry) -> Vec<String> {
    registry
        .servers()
        .iter()
        .map(|record| record.env().host().to_string())
        .collect()
}

fn assert_invariants(registry: &ServerRegistry) {
    let servers = registry.servers();
    assert!(servers[0].is_local(), "first record must be local");
    assert!(servers[0].is_online(), "local record must be online");

    let mut seen = HashSet::new();
    for record in servers.iter().chain(registry.unlisted().iter()) {
        assert!(seen.insert(record.env().clone()), "duplicate {}", record.env());
    }

    let default = registry.default_record();
    assert!(servers.iter().any(|record| record.env() == default.env()));
}

#[test]
fn add_then_replace_scenario() {
    let (_connections, prefs, registry) = registry_with_prefs();
    assert_eq!(registry.servers().len(), 1);
    assert!(registry.default_record().is_local());

    let a = registry.add_server(AddServerOptions::new(env("alpha")));
    assert_eq!(a.state(), ServerState::Offline);
    assert!(registry.lookup(a.env()).unwrap().is_committed());

    let b = registry.add_server(AddServerOptions::new(env("bravo")).as_default(true));
    assert_eq!(registry.default_record().env(), b.env());
    assert_invariants(&registry);

    registry.set(&[Arc::clone(&b)], &b);

    assert_eq!(hosts(&registry), vec!["localhost", "bravo"]);
    assert_eq!(registry.default_record().env(), b.env());
    let unlisted = registry.unlisted();
    assert_eq!(unlisted.len(), 1);
    assert_eq!(unlisted[0].env(), a.env());
    assert!(unlisted[0].is_deleted());
    assert_invariants(&registry);

    let encoded = prefs.get(keys::SERVERS).unwrap();
    let saved = ServerListCodec::new(&UriIdCodec).decode(&encoded);
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].env, env("bravo"));
    assert_eq!(
        prefs.get(keys::DEFAULT_SERVER).as_deref(),
        Some("ssh://dev@bravo:22")
    );

    registry.save();
    assert!(registry.unlisted().is_empty());
}

#[test]
fn replaced_record_comes_back_unchanged() {
    let (_connections, _prefs, registry) = registry_with_prefs();
    let a = registry.add_server(AddServerOptions::new(env("alpha")).with_display_name("Build box"));
    let local = registry.local();

    registry.set(&[], &local);
    assert!(a.is_deleted());
    assert!(registry.default_record().is_local());

    registry.set(&[Arc::clone(&a)], &local);
    let listed = registry.get(&env("alpha")).unwrap();
    assert!(Arc::ptr_eq(&listed, &a));
    assert!(!listed.is_deleted());
    assert_eq!(listed.display_name(), "Build box");
    assert_invariants(&registry);
}

#[test]
fn servers_stay_sorted() {
    let (_connections, _prefs, registry) = registry_with_prefs();
    for host in ["mike", "charlie", "zulu", "alpha", "kilo"] {
        registry.add_server(AddServerOptions::new(env(host)));
        assert_invariants(&registry);
    }

    assert_eq!(
        hosts(&registry),
        vec!["localhost", "alpha", "charlie", "kilo", "mike", "zulu"]
    );
}

#[test]
fn adding_twice_returns_the_same_record() {
    let (_connections, _prefs, registry) = registry_with_prefs();
    let first = registry.add_server(AddServerOptions::new(env("alpha")).with_display_name("one"));
    let second = registry.add_server(AddServerOptions::new(env("alpha")).with_display_name("two"));

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(second.display_name(), "one");
    assert_eq!(registry.servers().len(), 2);
}

#[test]
fn get_or_create_stages_once() {
    let (_connections, _prefs, registry) = registry_with_prefs();
    let staged = registry.get_or_create(&env("alpha"));
    let again = registry.get_or_create(&env("alpha"));

    assert!(Arc::ptr_eq(&staged, &again));
    assert_eq!(staged.state(), ServerState::Uninitialized);
    assert_eq!(staged.sync_strategy().as_deref(), Some("rsync"));
    assert_eq!(registry.unlisted().len(), 1);
    assert_eq!(registry.servers().len(), 1);
    assert_invariants(&registry);

    let promoted = registry.add_server(
        AddServerOptions::new(env("alpha"))
            .with_display_name("Alpha")
            .with_sync_strategy("sftp")
            .with_x11_forwarding(true),
    );
    assert!(Arc::ptr_eq(&promoted, &staged));
    assert_eq!(promoted.display_name(), "Alpha");
    assert_eq!(promoted.sync_strategy().as_deref(), Some("sftp"));
    assert!(promoted.x11_forwarding());
    assert!(registry.unlisted().is_empty());
    assert_invariants(&registry);
}

#[test]
fn concurrent_get_or_create_yields_one_record() {
    let (_connections, _prefs, registry) = registry_with_prefs();
    let target = env("alpha");

    let records: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| registry.get_or_create(&target)))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for record in &records {
        assert!(Arc::ptr_eq(record, &records[0]));
    }
    assert_invariants(&registry);
}

#[test]
fn promotion_is_never_invisible_to_readers() {
    let (_connections, _prefs, registry) = registry_with_prefs();
    let targets: Vec<_> = (0..64).map(|i| env(&format!("host{i:02}"))).collect();
    for target in &targets {
        registry.get_or_create(target);
    }

    let done = AtomicBool::new(false);
    let misses = std::thread::scope(|scope| {
        let reader = scope.spawn(|| {
            let mut misses = 0;
            while !done.load(Ordering::SeqCst) {
                for target in &targets {
                    if registry.lookup(target).is_none() {
                        misses += 1;
                    }
                }
            }
            misses
        });
        for target in &targets {
            registry.add_server(AddServerOptions::new(target.clone()));
        }
        let replaced = registry.remote_servers();
        registry.set(&replaced[..32], &registry.local());
        done.store(true, Ordering::SeqCst);
        reader.join().unwrap()
    });

    assert_eq!(misses, 0);
    assert_eq!(registry.servers().len(), 33);
    assert_eq!(registry.unlisted().len(), 32);
    assert_invariants(&registry);
}

#[test]
fn default_must_be_listed() {
    let (_connections, _prefs, registry) = registry_with_prefs();
    let listed = registry.add_server(AddServerOptions::new(env("alpha")).as_default(true));
    let staged = registry.get_or_create(&env("bravo"));

    let result = catch_unwind(AssertUnwindSafe(|| registry.set_default_record(&staged)));

    assert!(result.is_err());
    assert_eq!(registry.default_record().env(), listed.env());
    assert_invariants(&registry);
}

#[test]
fn set_rejects_unknown_default_before_changing_anything() {
    let (_connections, _prefs, registry) = registry_with_prefs();
    let a = registry.add_server(AddServerOptions::new(env("alpha")));
    let stranger = registry.get_or_create(&env("bravo"));

    let result = catch_unwind(AssertUnwindSafe(|| registry.set(&[Arc::clone(&a)], &stranger)));

    assert!(result.is_err());
    assert_eq!(hosts(&registry), vec!["localhost", "alpha"]);
    assert!(!a.is_deleted());
}

#[test]
fn set_publishes_once_and_updates_credentials() {
    let connections = FakeConnections::new();
    let credentials = Arc::new(MemoryCredentialStore::new());
    let registry = ServerRegistry::builder(
        services(&connections).with_credentials(Arc::clone(&credentials) as _),
    )
    .load();
    let a = registry.add_server(AddServerOptions::new(env("alpha")));
    let b = registry.add_server(AddServerOptions::new(env("bravo")));

    let events = Arc::new(Mutex::new(Vec::new()));
    let subscription = {
        let events = Arc::clone(&events);
        registry.subscribe(move |event| events.lock().push(event.clone()))
    };

    registry.set(&[Arc::clone(&a), Arc::clone(&b)], &b);

    {
        let events = events.lock();
        let list_changes = events
            .iter()
            .filter(|event| matches!(event, RegistryEvent::ServersChanged { .. }))
            .count();
        assert_eq!(list_changes, 1);
        assert!(events.iter().any(|event| matches!(
            event,
            RegistryEvent::DefaultChanged { new, .. } if new.env() == b.env()
        )));
    }
    assert_eq!(credentials.server_list(), vec![env("alpha"), env("bravo")]);

    drop(subscription);
    registry.add_server(AddServerOptions::new(env("charlie")));
    assert_eq!(
        events
            .lock()
            .iter()
            .filter(|event| matches!(event, RegistryEvent::ServersChanged { .. }))
            .count(),
        1
    );
}

#[test]
fn add_with_connect_brings_record_online() {
    let (connections, _prefs, registry) = registry_with_prefs();

    let record = registry.add_server(AddServerOptions::new(env("alpha")).with_connect(true));

    assert_eq!(record.state(), ServerState::Online);
    assert_eq!(connections.connect_count(), 1);
}

#[test]
fn connected_event_runs_setup_for_listed_records() {
    let (connections, _prefs, registry) = registry_with_prefs();
    let listed = registry.add_server(AddServerOptions::new(env("alpha")));
    let staged = registry.get_or_create(&env("bravo"));

    connections.announce_connected(listed.env());
    connections.announce_connected(staged.env());

    assert_eq!(listed.state(), ServerState::Online);
    assert_eq!(staged.state(), ServerState::Uninitialized);
}

#[test]
fn disconnect_is_noticed_on_next_query() {
    let (connections, _prefs, registry) = registry_with_prefs();
    let record = registry.add_server(AddServerOptions::new(env("alpha")).with_connect(true));
    assert_eq!(record.state(), ServerState::Online);

    connections.disconnect(record.env());
    // The disconnect event itself changes nothing.
    assert_eq!(record.state(), ServerState::Online);

    assert!(!record.is_online());
    assert_eq!(record.state(), ServerState::Offline);
}

#[test]
fn dropping_registry_releases_connection_listener() {
    let (connections, _prefs, registry) = registry_with_prefs();
    assert_eq!(connections.listener_count(), 1);

    drop(registry);

    assert_eq!(connections.listener_count(), 0);
}

#[test]
fn local_lookup_is_committed() {
    let (_connections, _prefs, registry) = registry_with_prefs();
    let listing = registry.lookup(&ExecutionEnvironment::local()).unwrap();
    assert!(listing.is_committed());
    assert!(listing.record().is_local());
}
