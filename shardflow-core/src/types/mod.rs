//! Core value types flowing through shardflow processors
mod data;
mod time;
mod window;

pub use data::Data;
pub use time::Instant;
pub use window::{BoundedWindow, PaneInfo, PaneTiming, WindowedValue};
