//! A very simple store of metric updates which notifies listeners on every put
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use tracing::trace;

use super::{MetricUpdates, MetricsContainer};

/// Store of the latest [MetricUpdates] of every processor of a job, keyed by
/// processor. Cloning gives another handle to the same store.
#[derive(Default, Clone)]
pub struct MetricsAccumulator {
    inner: Arc<Mutex<AccumulatorInner>>,
}

#[derive(Default)]
struct AccumulatorInner {
    /// latest updates per processor
    store: IndexMap<String, MetricUpdates>,
    listeners: Vec<Box<dyn EntryListener>>,
}

impl MetricsAccumulator {
    fn lock(&self) -> MutexGuard<'_, AccumulatorInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert the updates of a processor, replacing any previous updates under
    /// the same key, and pass them to every listener.
    pub fn put(&self, key: String, updates: MetricUpdates) -> Option<MetricUpdates> {
        let mut guard = self.lock();
        trace!(%key, "Storing metric updates");
        for listener in guard.listeners.iter() {
            listener.entry_updated(&key, &updates);
        }
        guard.store.insert(key, updates)
    }

    /// Register a listener. The listener is called once for every entry
    /// already present and then for every subsequent put.
    pub fn add_entry_listener(&self, listener: impl EntryListener) {
        let mut guard = self.lock();
        for (key, updates) in guard.store.iter() {
            listener.entry_updated(key, updates);
        }
        guard.listeners.push(Box::new(listener));
    }

    /// Copy of all entries
    pub fn entries(&self) -> IndexMap<String, MetricUpdates> {
        self.lock().store.clone()
    }
}

impl std::fmt::Debug for MetricsAccumulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let guard = self.lock();
        f.debug_struct("MetricsAccumulator")
            .field("entries", &guard.store.len())
            .field("listeners", &guard.listeners.len())
            .finish()
    }
}

/// Called on every entry put into a [MetricsAccumulator]
pub trait EntryListener: Send + 'static {
    /// An entry was added or replaced
    fn entry_updated(&self, key: &str, updates: &MetricUpdates);
}

impl<X> EntryListener for X
where
    X: Fn(&str, &MetricUpdates) + Send + 'static,
{
    fn entry_updated(&self, key: &str, updates: &MetricUpdates) {
        self(key, updates)
    }
}

/// Publishes the metrics of one processor under its own key
#[derive(Clone)]
pub struct MetricsReporter {
    accumulator: MetricsAccumulator,
    key: String,
}

impl MetricsReporter {
    /// Create a reporter putting entries under `key`
    pub fn new(accumulator: MetricsAccumulator, key: String) -> Self {
        Self { accumulator, key }
    }

    /// Key this reporter puts entries under
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Publish the current state of `container`
    pub fn report(&self, container: &MetricsContainer) {
        self.accumulator.put(self.key.clone(), container.updates());
    }
}
