//! Configuration module for the bagplane control plane

mod settings;

pub use settings::{ListenerSettings, Settings, WatchConfig, XdsConfig, ZoneListenerSettings};
