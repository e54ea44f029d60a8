//! Squad Initiative - group initiative for turn-based encounter trackers

pub mod core;
pub mod group;
pub mod host;
pub mod tracker;
