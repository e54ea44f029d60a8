//! Tracker-facing layer: header view models, controls and expand state

pub mod controls;
pub mod expand;
pub mod header;

pub use controls::ControlOutcome;
pub use expand::ExpandStore;
pub use header::{build_headers, GroupHeader, HeaderControl};
