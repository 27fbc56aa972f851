// EnrolSift - platform/mod.rs
//
// Platform abstraction layer: directories, config.toml, JSON files on disk.
// Must NOT depend on: core, app.

pub mod config;
pub mod fs;
