use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Collects the output of a job into a shared vector.
/// This uses an `Arc<Mutex<Vec<T>>>` internally, so it can be freely cloned.
#[derive(Debug)]
pub struct OutputCollector<T> {
    inner: Arc<Mutex<Vec<T>>>,
}

impl<T> Clone for OutputCollector<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for OutputCollector<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> OutputCollector<T> {
    /// Create an empty collector
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Put a value into this collector
    pub fn give(&self, value: T) {
        self.lock().push(value)
    }

    /// Take all values collected so far
    pub fn take(&self) -> Vec<T> {
        std::mem::take(&mut *self.lock())
    }

    /// Count of values collected so far
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True if nothing was collected so far
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl<T> IntoIterator for OutputCollector<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.take().into_iter()
    }
}
