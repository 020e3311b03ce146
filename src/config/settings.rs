//! # Configuration Settings
//!
//! Runtime configuration for the bagplane control plane. Everything here
//! is materialized from command-line flags at startup; there is no
//! persisted configuration beyond the watched databag tree itself.

use std::path::PathBuf;

use crate::errors::{Error, Result};
use crate::model::Zone;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory tree of databag files to watch
    pub watch: WatchConfig,

    /// Static placement of the two zone listeners
    pub listeners: ListenerSettings,

    /// xDS server configuration
    pub xds: XdsConfig,

    /// When set, each zone gets an HTTP redirector in front of its
    /// TLS listener
    pub add_http: bool,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.listeners.internal.port == self.listeners.external.port {
            return Err(Error::config("internal and external listener ports cannot be the same"));
        }
        if self.watch.directory.as_os_str().is_empty() {
            return Err(Error::config("watch directory cannot be empty"));
        }
        Ok(())
    }
}

/// Watched-directory configuration
#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub directory: PathBuf,
}

/// Static placement for one zone's proxy listener
#[derive(Debug, Clone)]
pub struct ZoneListenerSettings {
    pub address: String,
    pub port: u16,
    /// Common name used to locate the zone's certificate pair
    pub common_name: String,
}

/// Placement of the two fixed zone listeners
#[derive(Debug, Clone)]
pub struct ListenerSettings {
    pub internal: ZoneListenerSettings,
    pub external: ZoneListenerSettings,
}

impl ListenerSettings {
    pub fn zone(&self, zone: Zone) -> &ZoneListenerSettings {
        match zone {
            Zone::Internal => &self.internal,
            Zone::External => &self.external,
        }
    }
}

impl Default for ListenerSettings {
    fn default() -> Self {
        Self {
            internal: ZoneListenerSettings {
                address: "0.0.0.0".to_string(),
                port: 7777,
                common_name: "localhost".to_string(),
            },
            external: ZoneListenerSettings {
                address: "0.0.0.0".to_string(),
                port: 8888,
                common_name: "localhost".to_string(),
            },
        }
    }
}

/// xDS gRPC server configuration
#[derive(Debug, Clone)]
pub struct XdsConfig {
    pub bind_address: String,
    pub port: u16,
    /// Node identifier the proxy presents when connecting
    pub node_id: String,
}

impl XdsConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

impl Default for XdsConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 6515,
            node_id: "envoy-instance".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xds_config_default() {
        let config = XdsConfig::default();
        assert_eq!(config.bind_address(), "0.0.0.0:6515");
        assert_eq!(config.node_id, "envoy-instance");
    }

    #[test]
    fn test_listener_settings_zone_lookup() {
        let settings = ListenerSettings::default();
        assert_eq!(settings.zone(Zone::Internal).port, 7777);
        assert_eq!(settings.zone(Zone::External).port, 8888);
    }

    #[test]
    fn test_settings_rejects_colliding_listener_ports() {
        let mut settings = Settings {
            watch: WatchConfig { directory: PathBuf::from("databags/dev") },
            listeners: ListenerSettings::default(),
            xds: XdsConfig::default(),
            add_http: false,
        };
        assert!(settings.validate().is_ok());

        settings.listeners.external.port = settings.listeners.internal.port;
        assert!(settings.validate().is_err());
    }
}
