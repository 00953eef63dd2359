pub mod config;
pub mod constants;
pub mod error;
pub mod graph;
pub mod primitives;

/// Identifier for a config entry. Free-form, unique within a configuration
/// (§3 "Config entry").
pub type BlockDeviceId = String;
