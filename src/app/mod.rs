// EnrolSift - app/mod.rs
//
// Application layer: persistence backends, saved configurations, and the
// filter session host.
// Dependencies: core layer, platform::fs.

pub mod repository;
pub mod session;
pub mod store;
