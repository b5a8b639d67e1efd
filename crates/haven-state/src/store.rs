use std::sync::Arc;

use tokio::sync::watch;

/// Publish-on-change container for a piece of state.
///
/// Values are held behind an `Arc`; subscribers are woken only when the stored
/// `Arc` is replaced by a different allocation. Handing back the current value
/// (`Arc::ptr_eq`) is a no-op, which is what lets the engines skip redundant
/// downstream updates.
///
/// Update closures run while the store is locked and must not call back into
/// the same store.
pub struct StateStore<T> {
    tx: watch::Sender<Arc<T>>,
}

impl<T> StateStore<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _) = watch::channel(Arc::new(initial));
        Self { tx }
    }

    pub fn get_latest(&self) -> Arc<T> {
        self.tx.borrow().clone()
    }

    /// Replaces the whole value. Returns whether subscribers were notified.
    pub fn next(&self, value: Arc<T>) -> bool {
        self.tx.send_if_modified(|current| {
            if Arc::ptr_eq(current, &value) {
                return false;
            }
            *current = value;
            true
        })
    }

    /// Derives the next value from the current one; returning the same `Arc` is a no-op.
    pub fn update(&self, f: impl FnOnce(&Arc<T>) -> Arc<T>) -> bool {
        self.tx.send_if_modified(|current| {
            let value = f(current);
            if Arc::ptr_eq(current, &value) {
                return false;
            }
            *current = value;
            true
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<T>> {
        self.tx.subscribe()
    }
}

impl<T: Clone> StateStore<T> {
    /// Patches a copy of the current value and publishes it.
    pub fn partial_next(&self, f: impl FnOnce(&mut T)) {
        self.tx.send_modify(|current| {
            let mut value = T::clone(current);
            f(&mut value);
            *current = Arc::new(value);
        });
    }
}
