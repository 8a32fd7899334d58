//! Nested diagnostic timings.
//!
//! Each `start` returns a scope guard; dropping it records the elapsed time
//! at `debug` level under the `tether::timing` target, indented by how many
//! scopes for the same key are open. A disabled timer allocates nothing.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

const INDENT: &str = "  ";

#[derive(Debug, Default)]
pub struct NestedTimer {
    enabled: bool,
    depths: Mutex<HashMap<String, usize>>,
}

impl NestedTimer {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            depths: Mutex::new(HashMap::new()),
        }
    }

    pub fn disabled() -> Self {
        Self::new(false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Open a timing scope for `(category, key)`.
    pub fn start(&self, category: &str, key: &str) -> TimerScope<'_> {
        if !self.enabled {
            return TimerScope { active: None };
        }

        let depth = {
            let mut depths = self.depths.lock();
            let depth = depths.entry(key.to_string()).or_insert(0);
            let current = *depth;
            *depth += 1;
            current
        };

        tracing::debug!(
            target: "tether::timing",
            "{}> {category}/{key}",
            INDENT.repeat(depth)
        );

        TimerScope {
            active: Some(ActiveScope {
                timer: self,
                category: category.to_string(),
                key: key.to_string(),
                depth,
                started: Instant::now(),
            }),
        }
    }

    /// Number of open scopes for `key`.
    pub fn depth(&self, key: &str) -> usize {
        self.depths.lock().get(key).copied().unwrap_or(0)
    }

    fn finish(&self, key: &str) {
        let mut depths = self.depths.lock();
        if let Some(depth) = depths.get_mut(key) {
            *depth = depth.saturating_sub(1);
            if *depth == 0 {
                depths.remove(key);
            }
        }
    }
}

/// Open timing scope; stops when dropped.
#[must_use = "the timing stops as soon as the scope is dropped"]
pub struct TimerScope<'a> {
    active: Option<ActiveScope<'a>>,
}

struct ActiveScope<'a> {
    timer: &'a NestedTimer,
    category: String,
    key: String,
    depth: usize,
    started: Instant,
}

impl TimerScope<'_> {
    /// Time since the scope opened; zero when the timer is disabled.
    pub fn elapsed(&self) -> Duration {
        self.active
            .as_ref()
            .map(|scope| scope.started.elapsed())
            .unwrap_or_default()
    }
}

impl Drop for TimerScope<'_> {
    fn drop(&mut self) {
        if let Some(scope) = self.active.take() {
            scope.timer.finish(&scope.key);
            tracing::debug!(
                target: "tether::timing",
                "{}< {}/{}: {:?}",
                INDENT.repeat(scope.depth),
                scope.category,
                scope.key,
                scope.started.elapsed()
            );
        }
    }
}
