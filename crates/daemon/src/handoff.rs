//! Single-slot, last-value hand-off between loops.

use std::sync::Arc;

use parking_lot::Mutex;

/// Shared cell holding the latest published value.
///
/// Writers overwrite, readers copy out. Neither side ever waits on the other's cycle.
#[derive(Debug, Default)]
pub struct LatestCell<T> {
    inner: Arc<Mutex<T>>,
}

impl<T> Clone for LatestCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone> LatestCell<T> {
    pub fn new(initial: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(initial)),
        }
    }

    /// Replaces the held value.
    pub fn publish(&self, value: T) {
        *self.inner.lock() = value;
    }

    /// Copy of the held value.
    pub fn latest(&self) -> T {
        self.inner.lock().clone()
    }
}
