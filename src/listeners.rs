use std::sync::Arc;

use parking_lot::Mutex;

/// Registration list shared between a broadcaster and its subscribers.
///
/// Broadcasters take a snapshot under the lock and iterate the copy with the
/// lock released, so a listener may register or unregister others while it
/// is being notified.
pub struct ListenerSet<L: ?Sized> {
    inner: Mutex<Vec<Arc<L>>>,
}

impl<L: ?Sized> ListenerSet<L> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Vec::new()),
        }
    }

    pub fn add(&self, listener: Arc<L>) {
        self.inner.lock().push(listener);
    }

    /// Remove a listener by identity. Returns false if it was not registered.
    pub fn remove(&self, listener: &Arc<L>) -> bool {
        let target = Arc::as_ptr(listener) as *const ();
        let mut guard = self.inner.lock();
        let before = guard.len();
        guard.retain(|l| Arc::as_ptr(l) as *const () != target);
        guard.len() != before
    }

    /// Copy of the current registrations, in registration order.
    pub fn snapshot(&self) -> Vec<Arc<L>> {
        self.inner.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl<L: ?Sized> Default for ListenerSet<L> {
    fn default() -> Self {
        Self::new()
    }
}
