use serde::{Deserialize, Serialize};

use crate::types::Instant;

/// Merges the timestamps of values grouped into the same window.
///
/// Implementations must be commutative and associative, as values arrive in
/// no particular order.
pub trait TimestampCombinePolicy: Clone + Send + 'static {
    /// Combine two timestamps into one
    fn combine(&self, current: Instant, incoming: Instant) -> Instant;
}

/// Built in combine policies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimestampCombiner {
    /// Keep the earliest timestamp
    Earliest,
    /// Keep the latest timestamp
    Latest,
}

impl TimestampCombinePolicy for TimestampCombiner {
    fn combine(&self, current: Instant, incoming: Instant) -> Instant {
        match self {
            TimestampCombiner::Earliest => current.earliest(incoming),
            TimestampCombiner::Latest => current.latest(incoming),
        }
    }
}

impl<X> TimestampCombinePolicy for X
where
    X: Fn(Instant, Instant) -> Instant + Clone + Send + 'static,
{
    fn combine(&self, current: Instant, incoming: Instant) -> Instant {
        self(current, incoming)
    }
}
