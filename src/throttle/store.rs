use crate::throttle::OperationClass;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Counter namespace: one window per identity per operation class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowKey {
    pub identity: String,
    pub operation: OperationClass,
}

impl WindowKey {
    pub fn new(identity: impl Into<String>, operation: OperationClass) -> Self {
        Self { identity: identity.into(), operation }
    }
}

/// Requests counted in the current window and when the window closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    pub count: u32,
    /// Milliseconds since the Unix epoch.
    pub reset_at_millis: i64,
}

impl RateWindow {
    /// A window is live until its reset instant; at `reset_at_millis` it has expired.
    pub fn is_active(&self, now_millis: i64) -> bool {
        self.reset_at_millis > now_millis
    }
}

/// Abstract storage for throttle windows.
///
/// Writes use compare-and-set so a shared backend (e.g. a key-value store with
/// atomic updates) can give exact counts across processes. The in-process map
/// below is the default.
pub trait WindowStore: Send + Sync + std::fmt::Debug {
    /// Fetch the window for a key, expired or not.
    fn load(&self, key: &WindowKey) -> Option<RateWindow>;

    /// Store `next` only if the current value still equals `expected`.
    ///
    /// `expected == None` means "only if the key is absent".
    /// Returns `false` when another writer got there first (retry needed).
    fn compare_and_store(
        &self,
        key: &WindowKey,
        expected: Option<RateWindow>,
        next: RateWindow,
    ) -> bool;

    /// Delete every window whose reset instant is at or before `now_millis`.
    ///
    /// Returns the number of windows removed.
    fn purge_expired(&self, now_millis: i64) -> usize;

    /// Number of windows currently held, live or expired.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-local window store.
#[derive(Default, Debug)]
pub struct InMemoryWindowStore {
    windows: Mutex<HashMap<WindowKey, RateWindow>>,
}

impl InMemoryWindowStore {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave a window half-written, so the
    // map is still usable after poisoning.
    fn guard(&self) -> MutexGuard<'_, HashMap<WindowKey, RateWindow>> {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl WindowStore for InMemoryWindowStore {
    fn load(&self, key: &WindowKey) -> Option<RateWindow> {
        self.guard().get(key).copied()
    }

    fn compare_and_store(
        &self,
        key: &WindowKey,
        expected: Option<RateWindow>,
        next: RateWindow,
    ) -> bool {
        let mut guard = self.guard();
        if guard.get(key).copied() != expected {
            return false; // Race detected
        }
        guard.insert(key.clone(), next);
        true
    }

    fn purge_expired(&self, now_millis: i64) -> usize {
        let mut guard = self.guard();
        let before = guard.len();
        guard.retain(|_, window| window.is_active(now_millis));
        before - guard.len()
    }

    fn len(&self) -> usize {
        self.guard().len()
    }
}
