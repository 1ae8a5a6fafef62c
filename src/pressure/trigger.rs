//! Memory Pressure Trigger
//!
//! Background task that clears a cache when a memory pressure signal
//! arrives, as long as the trigger is armed.

use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::CacheStore;
use crate::pressure::{MemoryPressureSource, PressureLevel, PressureMask};

// == Trigger State ==
/// Lifecycle state of a [`MemoryPressureTrigger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    /// Pressure signals clear the cache
    Armed,
    /// Pressure signals are ignored
    Disarmed,
    /// The subscription is gone; no signal will ever be handled again
    Cancelled,
}

/// Spawns the listener task onto a runtime. Owns the subscription until then.
type StartListener = Box<dyn FnOnce(&Handle) -> JoinHandle<()> + Send>;

enum Listener {
    /// Subscribed, waiting for a tokio runtime to run on
    Pending(StartListener),
    Running(JoinHandle<()>),
    Cancelled,
}

// == Memory Pressure Trigger ==
/// Bridges a [`MemoryPressureSource`] to `remove_all_values` on one cache.
///
/// The listener only holds a weak reference to the cache store. Once the
/// store is dropped the next signal ends the task. Dropping the trigger
/// cancels the subscription.
pub struct MemoryPressureTrigger {
    armed: Arc<AtomicBool>,
    listener: Mutex<Listener>,
}

impl MemoryPressureTrigger {
    // == Spawn ==
    /// Subscribes to `source` and starts listening on the current tokio runtime.
    ///
    /// The subscription is always opened before this returns, so no signal
    /// sent afterwards is missed. Outside a runtime the listener is deferred
    /// until [`ensure_started`](Self::ensure_started) runs inside one; signals
    /// sent in between are buffered by the source and handled then.
    ///
    /// # Arguments
    /// * `source` - Where pressure signals come from
    /// * `mask` - Levels that should clear the cache
    /// * `store` - Non-owning handle to the cache store
    /// * `armed` - Initial value of the clear-on-pressure flag
    pub fn spawn<K, V>(
        source: &MemoryPressureSource,
        mask: PressureMask,
        store: Weak<RwLock<CacheStore<K, V>>>,
        armed: bool,
    ) -> Self
    where
        K: Hash + Eq + Send + Sync + 'static,
        V: Send + Sync + 'static,
    {
        let armed = Arc::new(AtomicBool::new(armed));
        let receiver = source.subscribe();

        let flag = Arc::clone(&armed);
        let start: StartListener =
            Box::new(move |runtime: &Handle| runtime.spawn(listen(receiver, mask, store, flag)));

        let trigger = Self {
            armed,
            listener: Mutex::new(Listener::Pending(start)),
        };
        if !trigger.ensure_started() {
            debug!("No tokio runtime yet, memory pressure listener deferred");
        }
        trigger
    }

    // == Ensure Started ==
    /// Starts a deferred listener if a tokio runtime is now available.
    ///
    /// Returns true if the listener is running afterwards.
    pub fn ensure_started(&self) -> bool {
        let mut listener = self.listener.lock();

        if matches!(&*listener, Listener::Pending(_)) {
            let Ok(runtime) = Handle::try_current() else {
                return false;
            };
            if let Listener::Pending(start) = std::mem::replace(&mut *listener, Listener::Cancelled) {
                *listener = Listener::Running(start(&runtime));
            }
        }

        matches!(&*listener, Listener::Running(_))
    }

    // == Arm / Disarm ==
    /// Makes future pressure signals clear the cache.
    pub fn arm(&self) {
        self.set_armed(true);
    }

    /// Makes future pressure signals be ignored.
    pub fn disarm(&self) {
        self.set_armed(false);
    }

    pub fn set_armed(&self, armed: bool) {
        self.armed.store(armed, Ordering::Release);
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    // == State ==
    /// A deferred listener counts as live: it is subscribed and only waits
    /// for a runtime.
    pub fn state(&self) -> TriggerState {
        match &*self.listener.lock() {
            Listener::Cancelled => TriggerState::Cancelled,
            Listener::Running(handle) if handle.is_finished() => TriggerState::Cancelled,
            _ if self.is_armed() => TriggerState::Armed,
            _ => TriggerState::Disarmed,
        }
    }

    // == Cancel ==
    /// Stops listening and drops the subscription. Idempotent.
    pub fn cancel(&self) {
        let previous = std::mem::replace(&mut *self.listener.lock(), Listener::Cancelled);
        match previous {
            Listener::Running(handle) => {
                handle.abort();
                debug!("Memory pressure trigger cancelled");
            }
            Listener::Pending(_) => debug!("Deferred memory pressure trigger cancelled"),
            Listener::Cancelled => {}
        }
    }
}

impl fmt::Debug for MemoryPressureTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryPressureTrigger")
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for MemoryPressureTrigger {
    fn drop(&mut self) {
        self.cancel();
    }
}

// == Listener Loop ==
async fn listen<K, V>(
    mut receiver: broadcast::Receiver<PressureLevel>,
    mask: PressureMask,
    store: Weak<RwLock<CacheStore<K, V>>>,
    armed: Arc<AtomicBool>,
) where
    K: Hash + Eq,
{
    debug!("Memory pressure trigger started");

    loop {
        let level = match receiver.recv().await {
            Ok(level) => level,
            // The retained signals still follow, so missed ones are coalesced
            Err(RecvError::Lagged(missed)) => {
                let name = cache_name(&store).await;
                debug!(
                    "Cache '{}': memory pressure trigger lagged, {} signals coalesced",
                    name, missed
                );
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        if !mask.contains(level) {
            continue;
        }

        if !armed.load(Ordering::Acquire) {
            let name = cache_name(&store).await;
            debug!(
                "Cache '{}': memory pressure signal ({}) ignored, trigger disarmed",
                name, level
            );
            continue;
        }

        let Some(cache) = store.upgrade() else {
            debug!("Cache dropped, memory pressure trigger exiting");
            break;
        };

        let mut guard = cache.write().await;

        // A disarm may have landed while waiting for the lock
        if !armed.load(Ordering::Acquire) {
            debug!(
                "Cache '{}': memory pressure signal ({}) dropped, disarmed while waiting",
                guard.name(),
                level
            );
            continue;
        }

        let cleared = guard.count();
        guard.remove_all_values();
        guard.record_pressure_clear();

        info!(
            "Cache '{}': cleared {} entries on {} memory pressure",
            guard.name(),
            cleared,
            level
        );
    }

    debug!("Memory pressure trigger stopped");
}

async fn cache_name<K, V>(store: &Weak<RwLock<CacheStore<K, V>>>) -> String
where
    K: Hash + Eq,
{
    match store.upgrade() {
        Some(cache) => cache.read().await.name().to_string(),
        None => String::new(),
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    type SharedStore = Arc<RwLock<CacheStore<String, u32>>>;

    fn filled_store() -> SharedStore {
        let mut store = CacheStore::new(i64::MAX, 100);
        store.insert("a".to_string(), 1, 1);
        store.insert("b".to_string(), 2, 1);
        Arc::new(RwLock::new(store))
    }

    fn mask() -> PressureMask {
        PressureMask::WARNING | PressureMask::CRITICAL
    }

    async fn wait_until_empty(store: &SharedStore) -> bool {
        for _ in 0..200 {
            if store.read().await.is_empty() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_armed_trigger_clears_on_signal() {
        let source = MemoryPressureSource::new();
        let store = filled_store();
        let trigger = MemoryPressureTrigger::spawn(&source, mask(), Arc::downgrade(&store), true);

        assert_eq!(trigger.state(), TriggerState::Armed);
        assert_eq!(source.notify(PressureLevel::Critical), 1);

        assert!(wait_until_empty(&store).await, "Cache should be cleared");
        let guard = store.read().await;
        assert_eq!(guard.total_cost(), 0);
        assert_eq!(guard.stats().pressure_clears, 1);
    }

    #[tokio::test]
    async fn test_disarmed_trigger_ignores_signal() {
        let source = MemoryPressureSource::new();
        let store = filled_store();
        let trigger = MemoryPressureTrigger::spawn(&source, mask(), Arc::downgrade(&store), false);

        assert_eq!(trigger.state(), TriggerState::Disarmed);
        source.notify(PressureLevel::Critical);
        tokio::time::sleep(Duration::from_millis(100)).await;

        let guard = store.read().await;
        assert_eq!(guard.count(), 2);
        assert_eq!(guard.stats().pressure_clears, 0);
    }

    #[tokio::test]
    async fn test_masked_level_is_ignored() {
        let source = MemoryPressureSource::new();
        let store = filled_store();
        let _trigger = MemoryPressureTrigger::spawn(&source, mask(), Arc::downgrade(&store), true);

        source.notify(PressureLevel::Normal);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(store.read().await.count(), 2);
    }

    #[tokio::test]
    async fn test_rearm_after_disarm() {
        let source = MemoryPressureSource::new();
        let store = filled_store();
        let trigger = MemoryPressureTrigger::spawn(&source, mask(), Arc::downgrade(&store), true);

        trigger.disarm();
        assert_eq!(trigger.state(), TriggerState::Disarmed);
        source.notify(PressureLevel::Warning);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.read().await.count(), 2);

        trigger.arm();
        assert_eq!(trigger.state(), TriggerState::Armed);
        source.notify(PressureLevel::Warning);
        assert!(wait_until_empty(&store).await);
    }

    #[tokio::test]
    async fn test_cancel_unsubscribes() {
        let source = MemoryPressureSource::new();
        let store = filled_store();
        let trigger = MemoryPressureTrigger::spawn(&source, mask(), Arc::downgrade(&store), true);

        trigger.cancel();
        trigger.cancel();
        assert_eq!(trigger.state(), TriggerState::Cancelled);

        // Let the aborted task drop its receiver
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(source.subscriber_count(), 0);
        assert_eq!(store.read().await.count(), 2);
    }

    #[tokio::test]
    async fn test_drop_unsubscribes() {
        let source = MemoryPressureSource::new();
        let store = filled_store();
        let trigger = MemoryPressureTrigger::spawn(&source, mask(), Arc::downgrade(&store), true);
        assert_eq!(source.subscriber_count(), 1);

        drop(trigger);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(source.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_exits_once_store_is_gone() {
        let source = MemoryPressureSource::new();
        let store = filled_store();
        let trigger = MemoryPressureTrigger::spawn(&source, mask(), Arc::downgrade(&store), true);

        drop(store);
        source.notify(PressureLevel::Critical);

        let mut finished = false;
        for _ in 0..200 {
            if trigger.state() == TriggerState::Cancelled {
                finished = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(finished, "Trigger task should exit after the store is dropped");
    }

    #[tokio::test]
    async fn test_disarm_while_waiting_for_lock_wins() {
        let source = MemoryPressureSource::new();
        let store = filled_store();
        let trigger = MemoryPressureTrigger::spawn(&source, mask(), Arc::downgrade(&store), true);

        let guard = store.write().await;
        assert_eq!(source.notify(PressureLevel::Critical), 1);

        // Listener has passed the first armed check and now waits on the lock
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.disarm();
        drop(guard);
        tokio::time::sleep(Duration::from_millis(100)).await;

        let guard = store.read().await;
        assert_eq!(guard.count(), 2);
        assert_eq!(guard.stats().pressure_clears, 0);
        assert_eq!(trigger.state(), TriggerState::Disarmed);
    }

    #[test]
    fn test_spawn_outside_runtime_subscribes_and_defers() {
        let source = MemoryPressureSource::new();
        let store = filled_store();
        let trigger = MemoryPressureTrigger::spawn(&source, mask(), Arc::downgrade(&store), true);

        assert_eq!(source.subscriber_count(), 1);
        assert_eq!(trigger.state(), TriggerState::Armed);
        assert!(!trigger.ensure_started());

        // Sent before any runtime exists; buffered by the subscription
        assert_eq!(source.notify(PressureLevel::Warning), 1);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            assert!(trigger.ensure_started());
            assert!(wait_until_empty(&store).await, "Buffered signal should clear the cache");
            assert_eq!(store.read().await.stats().pressure_clears, 1);
        });
    }

    #[test]
    fn test_cancel_deferred_trigger_unsubscribes() {
        let source = MemoryPressureSource::new();
        let store = filled_store();
        let trigger = MemoryPressureTrigger::spawn(&source, mask(), Arc::downgrade(&store), true);
        assert_eq!(source.subscriber_count(), 1);

        trigger.cancel();

        assert_eq!(source.subscriber_count(), 0);
        assert_eq!(trigger.state(), TriggerState::Cancelled);
        assert!(!trigger.ensure_started());
    }
}
