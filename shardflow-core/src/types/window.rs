//! Windows, panes and the windowed values which carry them.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use super::Instant;

/// Identifier of a time-bounded grouping of elements.
/// Windows are used as map keys, hence they are cheap to copy, hash and compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BoundedWindow {
    /// The single window spanning all of event time
    Global,
    /// A window covering `[start, end)`
    Interval {
        /// Inclusive start
        start: Instant,
        /// Exclusive end
        end: Instant,
    },
}

impl BoundedWindow {
    /// Create an interval window covering `[start, end)`
    pub fn interval(start: impl Into<Instant>, end: impl Into<Instant>) -> Self {
        BoundedWindow::Interval {
            start: start.into(),
            end: end.into(),
        }
    }

    /// Largest timestamp an element of this window may carry
    pub fn max_timestamp(&self) -> Instant {
        match self {
            BoundedWindow::Global => Instant::MAX,
            BoundedWindow::Interval { end, .. } => {
                Instant::from_millis(end.millis().saturating_sub(1))
            }
        }
    }
}

/// When, relative to the watermark, a pane was fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaneTiming {
    /// Fired before the watermark passed the end of the window
    Early,
    /// The on-time firing
    OnTime,
    /// Fired after the watermark passed the end of the window
    Late,
    /// No timing information, e.g. because no trigger ever fired
    Unknown,
}

/// Firing metadata of a windowed value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaneInfo {
    /// True if this is the first pane of the window
    pub is_first: bool,
    /// True if no more panes will follow for the window
    pub is_last: bool,
    /// Timing of the firing
    pub timing: PaneTiming,
    /// Index of this pane among all panes of the window
    pub index: u64,
    /// Index among all non-speculative panes, -1 for speculative ones
    pub non_speculative_index: i64,
}

impl PaneInfo {
    /// The pane of values which were never grouped by a trigger.
    /// This is the only pane bounded reads produce.
    pub const NO_FIRING: PaneInfo = PaneInfo {
        is_first: true,
        is_last: true,
        timing: PaneTiming::Unknown,
        index: 0,
        non_speculative_index: 0,
    };
}

impl Default for PaneInfo {
    fn default() -> Self {
        Self::NO_FIRING
    }
}

/// A value together with its event timestamp, the windows it belongs to
/// and the pane it was fired in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowedValue<V> {
    value: V,
    timestamp: Instant,
    windows: IndexSet<BoundedWindow>,
    pane: PaneInfo,
}

impl<V> WindowedValue<V> {
    /// Create a windowed value from all its parts
    pub fn of(
        value: V,
        timestamp: Instant,
        windows: impl IntoIterator<Item = BoundedWindow>,
        pane: PaneInfo,
    ) -> Self {
        Self {
            value,
            timestamp,
            windows: windows.into_iter().collect(),
            pane,
        }
    }

    /// A value in the global window which was never fired by a trigger
    pub fn timestamped_in_global_window(value: V, timestamp: Instant) -> Self {
        Self::of(value, timestamp, [BoundedWindow::Global], PaneInfo::NO_FIRING)
    }

    /// The wrapped value
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Take the wrapped value, discarding all windowing information
    pub fn into_value(self) -> V {
        self.value
    }

    /// Event time of the value
    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    /// All windows this value belongs to
    pub fn windows(&self) -> &IndexSet<BoundedWindow> {
        &self.windows
    }

    /// Firing metadata
    pub fn pane(&self) -> &PaneInfo {
        &self.pane
    }
}
