// EnrolSift - core/mod.rs
//
// Core business logic layer: record model, date matching, filtering,
// facet options, filter snapshots and export.
// Must NOT depend on: app or platform.

pub mod date;
pub mod export;
pub mod filter;
pub mod model;
pub mod options;
pub mod snapshot;
