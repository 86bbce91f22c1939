use std::sync::{Arc, Mutex, Weak};

use tracing::debug;
use uuid::Uuid;

use super::base::AuthChange;

/// Callback invoked synchronously for every auth state change.
pub type AuthListener = Arc<dyn Fn(AuthChange) + Send + Sync>;

type Registry = Mutex<Vec<(Uuid, AuthListener)>>;

/// Listener registry shared by the provider implementations.
#[derive(Clone, Default)]
pub struct AuthListeners {
    inner: Arc<Registry>,
}

impl AuthListeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. It stays registered until the returned
    /// `Subscription` is unsubscribed or dropped.
    pub fn subscribe(&self, listener: AuthListener) -> Subscription {
        let id = Uuid::new_v4();
        lock(&self.inner).push((id, listener));
        debug!(subscription_id = %id, "auth listener registered");
        Subscription {
            id,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver a change to every registered listener, in registration order.
    pub fn notify(&self, change: AuthChange) {
        // Snapshot first so a listener may unsubscribe without deadlocking.
        let listeners: Vec<AuthListener> = lock(&self.inner)
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        debug!(
            event_name = "providers.auth_change",
            event_domain = "providers",
            auth_event = change.event.as_str(),
            listeners = listeners.len(),
            "notifying auth listeners"
        );
        for listener in listeners {
            listener(change.clone());
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle returned by `on_auth_state_change`.
pub struct Subscription {
    id: Uuid,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Remove the listener. Safe to call more than once.
    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).retain(|(id, _)| *id != self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

fn lock(registry: &Registry) -> std::sync::MutexGuard<'_, Vec<(Uuid, AuthListener)>> {
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::AuthEvent;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_listener(counter: Arc<AtomicUsize>) -> AuthListener {
        Arc::new(move |_change| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_notify_reaches_every_listener() {
        let listeners = AuthListeners::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let _a = listeners.subscribe(counting_listener(counter.clone()));
        let _b = listeners.subscribe(counting_listener(counter.clone()));

        listeners.notify(AuthChange::new(AuthEvent::SignedOut, None));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_dropping_subscription_unsubscribes() {
        let listeners = AuthListeners::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let subscription = listeners.subscribe(counting_listener(counter.clone()));
        assert_eq!(listeners.len(), 1);

        drop(subscription);
        assert!(listeners.is_empty());

        listeners.notify(AuthChange::new(AuthEvent::SignedOut, None));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unsubscribe_after_registry_dropped() {
        let listeners = AuthListeners::new();
        let subscription = listeners.subscribe(Arc::new(|_| {}));
        drop(listeners);
        subscription.unsubscribe();
    }
}
