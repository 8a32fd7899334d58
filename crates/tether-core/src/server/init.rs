//! Connection setup orchestration for a record.
//!
//! `init` connects, then runs two jobs on the record's worker pool: the
//! gating setup job (host profile refresh plus support-file install) and the
//! path-mapping job, which nobody waits for. The record goes online once the
//! setup job reports back or the setup timeout passes, whichever is first.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::RemoteError;

use super::pool::WorkerPool;
use super::{RecordEvent, ServerRecord, ServerState, StatusMessage};

/// Marks a record as having an `init` in flight.
struct InitGuard<'a>(&'a AtomicBool);

impl<'a> InitGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        (!flag.swap(true, Ordering::AcqRel)).then(|| Self(flag))
    }
}

impl Drop for InitGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ServerRecord {
    /// Connect to the target and run its setup. Blocks.
    ///
    /// Must not be called from an async runtime thread. Transport failures
    /// leave the record `Offline` with a reason, cancellation leaves it
    /// `Cancelled`; nothing is returned as an error. If another `init` is
    /// already running for this record, returns the current state at once.
    pub fn init(self: &Arc<Self>) -> ServerState {
        debug_assert!(
            tokio::runtime::Handle::try_current().is_err(),
            "ServerRecord::init blocks and must not run on an async runtime thread"
        );

        if self.is_local() {
            return ServerState::Online;
        }
        let Some(_running) = InitGuard::acquire(&self.initializing) else {
            debug!(server = %self.env, "init already in progress");
            return self.state();
        };

        let label = self.env.to_string();
        let timer = self.services.timer();
        let _init_scope = timer.start("init", &label);

        let connected = {
            let _scope = timer.start("connect", &label);
            self.services.connections().connect_to(&self.env)
        };
        match connected {
            Ok(()) => {}
            Err(RemoteError::Io(message)) => {
                warn!(server = %self.env, reason = %message, "connect failed");
                self.transition(|fields| {
                    fields.state = ServerState::Offline;
                    fields.reason = Some(message);
                    fields.problems = None;
                });
                return ServerState::Offline;
            }
            Err(RemoteError::Cancelled) => {
                info!(server = %self.env, "connect cancelled");
                self.transition(|fields| fields.state = ServerState::Cancelled);
                return ServerState::Cancelled;
            }
        }

        self.transition(|fields| {
            fields.state = ServerState::Initializing;
            fields.reason = None;
            fields.problems = None;
        });

        let pool = match self.worker_pool() {
            Ok(pool) => pool,
            Err(err) => {
                warn!(server = %self.env, error = %err, "could not start setup workers");
                self.transition(|fields| {
                    fields.state = ServerState::Offline;
                    fields.reason = Some(format!("Could not start setup workers: {err}"));
                });
                return ServerState::Offline;
            }
        };

        let (done_tx, done_rx) = oneshot::channel::<Option<String>>();
        {
            let record = Arc::clone(self);
            pool.spawn_blocking(move || {
                let problem = record.run_setup();
                // The waiter may already have timed out.
                let _ = done_tx.send(problem);
            });
        }
        {
            let mapper = Arc::clone(self.services.path_mapper());
            let env = self.env.clone();
            pool.spawn_blocking(move || mapper.prime(&env));
        }

        let timeout = self.services.settings().timeout;
        let waited = {
            let _scope = timer.start("setup-wait", &label);
            pool.block_on(async { tokio::time::timeout(timeout, done_rx).await })
        };

        match waited {
            Ok(Ok(problem)) => self.finish_online(problem),
            Ok(Err(_)) => {
                // Sender dropped without reporting: the job was torn down.
                warn!(server = %self.env, "setup job was interrupted");
                self.transition(|fields| fields.state = ServerState::Cancelled);
            }
            Err(_) => {
                warn!(server = %self.env, ?timeout, "setup did not finish in time, continuing");
                self.finish_online(None);
            }
        }

        self.state()
    }

    /// Run `init` if not online, showing the outcome.
    ///
    /// Returns `None` when the record is already online or `force` is false.
    pub fn validate(self: &Arc<Self>, force: bool) -> Option<StatusMessage> {
        if self.is_online() || !force {
            return None;
        }
        let _span = tracing::info_span!("validate", server = %self.env).entered();
        info!("connecting");
        self.init();
        Some(self.status_message())
    }

    /// Re-run setup after the transport (re)connected.
    pub fn check_setup_after_connection(self: &Arc<Self>) {
        if self.is_local()
            || self.initializing.load(Ordering::Acquire)
            || self.state() == ServerState::Online
        {
            return;
        }
        self.transition(|fields| {
            if !matches!(
                fields.state,
                ServerState::Initializing | ServerState::Online
            ) {
                fields.state = ServerState::Uninitialized;
            }
        });
        self.init();
    }

    /// Refresh the cached host profile. Best effort: probe failures are
    /// logged and ignored.
    ///
    /// When the profile changed and the selected sync strategy no longer
    /// applies, the first applicable strategy in registration order replaces
    /// it. Returns whether the profile changed.
    pub fn check_host_info(&self) -> bool {
        let host_info = self.services.host_info();
        if self.is_local() || !host_info.is_available(&self.env) {
            return false;
        }

        let profile = match host_info.host_info(&self.env) {
            Ok(profile) => profile,
            Err(err) => {
                debug!(server = %self.env, error = %err, "host info probe failed");
                return false;
            }
        };

        let current = {
            let mut fields = self.fields.lock();
            if fields.profile == profile {
                return false;
            }
            fields.profile = profile.clone();
            fields.sync_strategy.clone()
        };

        let strategies = self.services.strategies();
        let still_applicable = current
            .as_deref()
            .and_then(|id| strategies.get(id))
            .is_some_and(|strategy| strategy.is_applicable(&self.env, &profile));

        let mut sync_strategy = current;
        if !still_applicable
            && let Some(replacement) = strategies.first_applicable(&self.env, &profile)
        {
            info!(
                server = %self.env,
                from = sync_strategy.as_deref().unwrap_or("none"),
                to = replacement.id(),
                "sync strategy does not fit the host, switching"
            );
            sync_strategy = Some(replacement.id().to_string());
            self.fields.lock().sync_strategy = sync_strategy.clone();
        }

        self.events.publish(&RecordEvent::HostProfileChanged {
            env: self.env.clone(),
            profile,
            sync_strategy,
        });
        true
    }

    /// The gating setup job. Returns a non-fatal problem, if any.
    fn run_setup(&self) -> Option<String> {
        let label = self.env.to_string();
        let _scope = self.services.timer().start("setup", &label);

        self.check_host_info();

        if !self.services.settings().install_support {
            debug!(server = %self.env, "support file setup disabled");
            return None;
        }

        let profile = self.host_profile();
        let installer = self.services.installer();
        match installer.needs_install(&self.env, &profile) {
            Ok(false) => None,
            Ok(true) => {
                info!(server = %self.env, "installing support files");
                match installer.install(&self.env, &profile) {
                    Ok(()) => None,
                    Err(err) => {
                        warn!(server = %self.env, error = %err, "support file install failed");
                        Some(format!("Installing support files failed: {err}"))
                    }
                }
            }
            Err(err) => {
                warn!(server = %self.env, error = %err, "support file check failed");
                Some(format!("Checking support files failed: {err}"))
            }
        }
    }

    fn finish_online(&self, problem: Option<String>) {
        self.transition(|fields| {
            fields.state = ServerState::Online;
            fields.reason = None;
            fields.problems = problem;
            fields.needs_validation_on_connect = false;
        });
    }

    fn worker_pool(&self) -> std::io::Result<Arc<WorkerPool>> {
        let mut pool = self.pool.lock();
        if let Some(pool) = pool.as_ref() {
            return Ok(Arc::clone(pool));
        }
        let created = Arc::new(WorkerPool::new(self.env.host())?);
        *pool = Some(Arc::clone(&created));
        Ok(created)
    }
}
