//! Reactive adapters over `spark-signals`.
//!
//! - [`Cell`] - mutable, derived or sensor-backed property value
//! - [`Watch`] / [`WatchSet`] / [`Watchable`] - activation tracking for lazy sources

pub mod cell;
pub mod watch;

pub use cell::Cell;
pub use watch::{SharedWatchSet, Watch, WatchSet, Watchable, is_tracking, track, with_frame};
