//! Observer traits and the per-instance observer bus
//!
//! Observers are registered as `Arc`s and compared by identity: registering
//! the same `Arc` twice is a no-op, while two equal-valued observers behind
//! different allocations are distinct. The bus assigns an [`ObserverToken`]
//! at registration; observers never carry or mutate their own identifier.
//!
//! Notifications run synchronously on the calling thread. The observer list
//! is snapshotted under the lock and the lock released before any callback
//! runs, so callbacks may re-enter the SDK (including registering or removing
//! observers) without deadlocking.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::warn;

use crate::device::{CentralDevice, PeripheralDevice};
use crate::errors::EightBallError;
use crate::types::{ObserverToken, SdkOrigin};

// ----------------------------------------------------------------------------
// Observer Traits
// ----------------------------------------------------------------------------

/// Capability shared by every observer, regardless of role
pub trait Observer: Send + Sync {
    /// An exchange or the transport failed on the observed SDK instance
    fn error_occurred(&self, error: &EightBallError, sdk: &SdkOrigin);
}

/// Listener for a Central SDK instance
pub trait CentralObserver: Observer {
    /// A peripheral finished characteristic discovery and can take questions
    fn device_discovered(&self, _device: &PeripheralDevice, _sdk: &SdkOrigin) {}

    /// A peripheral's link went down
    fn device_disconnected(&self, _device: &PeripheralDevice, _sdk: &SdkOrigin) {}

    /// A question was issued to `device`
    fn question_asked_of_device(&self, device: &PeripheralDevice, sdk: &SdkOrigin);

    /// `device` answered; its `question` and `answer` are both set
    fn question_answered_by_device(&self, device: &PeripheralDevice, sdk: &SdkOrigin);
}

/// Listener for a Peripheral SDK instance
pub trait PeripheralObserver: Observer {
    /// A Central connected to this peripheral
    fn central_connected(&self, _central: &CentralDevice, _sdk: &SdkOrigin) {}

    /// A question arrived and the session moved to busy
    fn question_asked_by_device(&self, central: &CentralDevice, question: &str, sdk: &SdkOrigin);

    /// An answer reached the Central and the session is idle again
    fn answer_sent_to_device(
        &self,
        central: &CentralDevice,
        answer: &str,
        question: &str,
        sdk: &SdkOrigin,
    );
}

// ----------------------------------------------------------------------------
// Observer Bus
// ----------------------------------------------------------------------------

struct Entry<O: ?Sized> {
    token: ObserverToken,
    observer: Arc<O>,
}

impl<O: ?Sized> Clone for Entry<O> {
    fn clone(&self) -> Self {
        Self {
            token: self.token,
            observer: Arc::clone(&self.observer),
        }
    }
}

/// Ordered, thread-safe list of observers for one SDK instance
pub struct ObserverBus<O: ?Sized> {
    entries: Mutex<Vec<Entry<O>>>,
}

impl<O: ?Sized> Default for ObserverBus<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: ?Sized> ObserverBus<O> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Entry<O>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn same_observer(a: &Arc<O>, b: &Arc<O>) -> bool {
        // Compare data pointers only; vtable pointers for the same type may differ
        // across codegen units.
        std::ptr::eq(
            Arc::as_ptr(a) as *const (),
            Arc::as_ptr(b) as *const (),
        )
    }

    /// Add an observer; returns `None` if this exact observer is already registered
    pub fn register(&self, observer: Arc<O>) -> Option<ObserverToken> {
        let mut entries = self.lock();
        if entries
            .iter()
            .any(|entry| Self::same_observer(&entry.observer, &observer))
        {
            return None;
        }
        let token = ObserverToken::generate();
        entries.push(Entry { token, observer });
        Some(token)
    }

    /// Remove the observer registered under `token`
    pub fn unregister(&self, token: &ObserverToken) -> bool {
        let mut entries = self.lock();
        match entries.iter().position(|entry| entry.token == *token) {
            Some(index) => {
                entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Remove an observer by identity
    pub fn unregister_observer(&self, observer: &Arc<O>) -> bool {
        let mut entries = self.lock();
        match entries
            .iter()
            .position(|entry| Self::same_observer(&entry.observer, observer))
        {
            Some(index) => {
                entries.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn is_registered(&self, token: &ObserverToken) -> bool {
        self.lock().iter().any(|entry| entry.token == *token)
    }

    /// Check whether this exact observer is registered
    pub fn contains(&self, observer: &Arc<O>) -> bool {
        self.lock()
            .iter()
            .any(|entry| Self::same_observer(&entry.observer, observer))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Invoke `callback` on every observer in registration order
    ///
    /// A panicking observer is logged and skipped; later observers still run.
    /// Returns the number of observers that completed without panicking.
    pub fn notify_all<F>(&self, callback: F) -> usize
    where
        F: Fn(&O),
    {
        let snapshot: Vec<Entry<O>> = self.lock().clone();
        let mut delivered = 0;
        for entry in &snapshot {
            let observer = &*entry.observer;
            match catch_unwind(AssertUnwindSafe(|| callback(observer))) {
                Ok(()) => delivered += 1,
                Err(_) => warn!("Observer {} panicked during notification", entry.token),
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    trait Counter: Send + Sync {
        fn bump(&self);
    }

    #[derive(Default)]
    struct Counting(AtomicUsize);

    impl Counter for Counting {
        fn bump(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Panicking;

    impl Counter for Panicking {
        fn bump(&self) {
            panic!("observer failure");
        }
    }

    #[test]
    fn test_register_is_identity_based() {
        let bus: ObserverBus<dyn Counter> = ObserverBus::new();
        let a: Arc<dyn Counter> = Arc::new(Counting::default());
        let b: Arc<dyn Counter> = Arc::new(Counting::default());

        let token = bus.register(Arc::clone(&a)).unwrap();
        assert!(bus.register(Arc::clone(&a)).is_none());
        assert!(bus.register(Arc::clone(&b)).is_some());
        assert_eq!(bus.len(), 2);
        assert!(bus.is_registered(&token));
        assert!(bus.contains(&a));
    }

    #[test]
    fn test_unregister_then_reregister_yields_new_token() {
        let bus: ObserverBus<dyn Counter> = ObserverBus::new();
        let a: Arc<dyn Counter> = Arc::new(Counting::default());

        let first = bus.register(Arc::clone(&a)).unwrap();
        assert!(bus.unregister(&first));
        assert!(!bus.is_registered(&first));
        assert!(!bus.unregister(&first));

        let second = bus.register(Arc::clone(&a)).unwrap();
        assert_ne!(first, second);
        assert!(bus.unregister_observer(&a));
        assert!(bus.is_empty());
    }

    #[test]
    fn test_panicking_observer_does_not_block_delivery() {
        let bus: ObserverBus<dyn Counter> = ObserverBus::new();
        let before = Arc::new(Counting::default());
        let after = Arc::new(Counting::default());
        bus.register(before.clone() as Arc<dyn Counter>);
        bus.register(Arc::new(Panicking) as Arc<dyn Counter>);
        bus.register(after.clone() as Arc<dyn Counter>);

        let delivered = bus.notify_all(|observer| observer.bump());

        assert_eq!(delivered, 2);
        assert_eq!(before.0.load(Ordering::SeqCst), 1);
        assert_eq!(after.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callbacks_may_reenter_the_bus() {
        let bus: Arc<ObserverBus<dyn Counter>> = Arc::new(ObserverBus::new());
        bus.register(Arc::new(Counting::default()) as Arc<dyn Counter>);

        let inner = Arc::clone(&bus);
        bus.notify_all(|_| {
            inner.register(Arc::new(Counting::default()) as Arc<dyn Counter>);
        });

        assert_eq!(bus.len(), 2);
    }
}
