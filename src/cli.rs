//! Command line interface.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{ListenerSettings, Settings, WatchConfig, XdsConfig, ZoneListenerSettings};

#[derive(Debug, Parser)]
#[command(name = "bagplane")]
#[command(about = "Databag-driven Envoy control plane")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Directory tree of databag files to watch
    #[arg(long = "dir", default_value = "databags/dev")]
    pub directory: PathBuf,

    /// Add plain HTTP listeners that redirect to the HTTPS ones
    #[arg(long)]
    pub add_http: bool,

    /// Internal listener bind address
    #[arg(long, default_value = "0.0.0.0")]
    pub internal_address: String,

    /// Internal listener port
    #[arg(long, default_value_t = 7777)]
    pub internal_port: u16,

    /// Common name of the internal listener certificate pair
    #[arg(long, default_value = "localhost")]
    pub internal_common_name: String,

    /// External listener bind address
    #[arg(long, default_value = "0.0.0.0")]
    pub external_address: String,

    /// External listener port
    #[arg(long, default_value_t = 8888)]
    pub external_port: u16,

    /// Common name of the external listener certificate pair
    #[arg(long, default_value = "localhost")]
    pub external_common_name: String,

    /// xDS server bind address
    #[arg(long, default_value = "0.0.0.0")]
    pub xds_bind: String,

    /// xDS server port
    #[arg(long, default_value_t = 6515)]
    pub xds_port: u16,

    /// Node identifier expected from the connecting proxy
    #[arg(long, default_value = "envoy-instance")]
    pub node_id: String,
}

impl Cli {
    pub fn into_settings(self) -> Settings {
        Settings {
            watch: WatchConfig { directory: self.directory },
            listeners: ListenerSettings {
                internal: ZoneListenerSettings {
                    address: self.internal_address,
                    port: self.internal_port,
                    common_name: self.internal_common_name,
                },
                external: ZoneListenerSettings {
                    address: self.external_address,
                    port: self.external_port,
                    common_name: self.external_common_name,
                },
            },
            xds: XdsConfig {
                bind_address: self.xds_bind,
                port: self.xds_port,
                node_id: self.node_id,
            },
            add_http: self.add_http,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_ports() {
        let cli = Cli::parse_from(["bagplane"]);
        let settings = cli.into_settings();
        assert_eq!(settings.watch.directory, PathBuf::from("databags/dev"));
        assert_eq!(settings.listeners.internal.port, 7777);
        assert_eq!(settings.listeners.external.port, 8888);
        assert_eq!(settings.xds.port, 6515);
        assert!(!settings.add_http);
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::parse_from([
            "bagplane",
            "--dir",
            "bags/prod",
            "--add-http",
            "--external-common-name",
            "edge.example.com",
            "--xds-port",
            "7000",
        ]);
        let settings = cli.into_settings();
        assert_eq!(settings.watch.directory, PathBuf::from("bags/prod"));
        assert!(settings.add_http);
        assert_eq!(settings.listeners.external.common_name, "edge.example.com");
        assert_eq!(settings.xds.port, 7000);
    }
}
