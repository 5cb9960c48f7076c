//! Event time as carried by windowed values.

use serde::{Deserialize, Serialize};

/// A point in event time, in milliseconds since the unix epoch.
///
/// [Instant::MIN] and [Instant::MAX] are sentinels for "before all data" and
/// "after all data". Both keep headroom to the limits of `i64`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Instant(i64);

impl Instant {
    /// Smallest timestamp any element may carry
    pub const MIN: Instant = Instant(i64::MIN / 1000);
    /// Largest timestamp any element may carry. This is also the
    /// end of the global window.
    pub const MAX: Instant = Instant(i64::MAX / 1000);

    /// Create an instant from milliseconds since the unix epoch
    pub const fn from_millis(millis: i64) -> Self {
        Instant(millis)
    }

    /// Milliseconds since the unix epoch
    #[inline]
    pub const fn millis(&self) -> i64 {
        self.0
    }

    /// The earlier of both instants
    #[inline]
    pub fn earliest(self, other: Instant) -> Instant {
        self.min(other)
    }

    /// The later of both instants
    #[inline]
    pub fn latest(self, other: Instant) -> Instant {
        self.max(other)
    }
}

impl From<i64> for Instant {
    fn from(value: i64) -> Self {
        Instant(value)
    }
}
