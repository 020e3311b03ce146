//! Snapshot publication.
//!
//! Turns a merged model into the four Envoy resource collections and
//! installs them as one atomically-versioned snapshot. Cross-collection
//! references are validated first; a model that fails validation leaves
//! the previous snapshot untouched.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::errors::{Error, Result};
use crate::model::Config;
use crate::xds::resources::{
    CLUSTER_TYPE_URL, ENDPOINT_TYPE_URL, LISTENER_TYPE_URL, ROUTE_TYPE_URL,
};
use crate::xds::{cluster, endpoint, listener, route, XdsState};

pub struct SnapshotPublisher {
    state: Arc<XdsState>,
    add_http: bool,
}

impl SnapshotPublisher {
    pub fn new(state: Arc<XdsState>, add_http: bool) -> Self {
        Self { state, add_http }
    }

    /// Reject models whose collections reference each other dangling.
    fn validate(config: &Config) -> Result<()> {
        for (key, route) in &config.routes {
            if !config.clusters.contains_key(&route.cluster_name) {
                return Err(Error::consistency(format!(
                    "route {key:?} targets unknown cluster {:?}",
                    route.cluster_name
                )));
            }
        }

        for (zone, listener) in &config.listeners {
            for key in &listener.routes {
                if !config.routes.contains_key(key) {
                    return Err(Error::consistency(format!(
                        "{} listener references unknown route {key:?}",
                        zone.as_str()
                    )));
                }
            }
        }

        for name in config.clusters.keys() {
            if config.endpoints.get(name).map_or(true, |eps| eps.is_empty()) {
                return Err(Error::consistency(format!("cluster {name:?} has no endpoints")));
            }
        }

        Ok(())
    }

    /// Translate the model and swap in a new snapshot. Returns the new
    /// version number.
    pub fn publish(&self, config: &Config) -> Result<u64> {
        Self::validate(config)?;

        let mut snapshot = HashMap::new();
        snapshot
            .insert(LISTENER_TYPE_URL.to_string(), listener::listeners_from_model(config, self.add_http)?);
        snapshot.insert(CLUSTER_TYPE_URL.to_string(), cluster::clusters_from_model(config)?);
        snapshot.insert(ROUTE_TYPE_URL.to_string(), route::routes_from_model(config)?);
        snapshot.insert(ENDPOINT_TYPE_URL.to_string(), endpoint::endpoints_from_model(config)?);

        let version = self.state.set_snapshot(snapshot);
        info!(
            version,
            clusters = config.clusters.len(),
            routes = config.routes.len(),
            "published snapshot"
        );
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ListenerSettings;
    use crate::model::{LoadBalancingPolicy, MatchType, Zone};

    fn publisher() -> (Arc<XdsState>, SnapshotPublisher) {
        let state = Arc::new(XdsState::new("envoy-instance"));
        let publisher = SnapshotPublisher::new(state.clone(), false);
        (state, publisher)
    }

    fn valid_config() -> Config {
        let mut config = Config::new();
        let settings = ListenerSettings::default();
        for zone in Zone::ALL {
            let placement = settings.zone(zone);
            config.add_listener(zone, &placement.address, placement.port, &placement.common_name);
        }
        config.add_cluster("svc-in", LoadBalancingPolicy::RoundRobin, None).unwrap();
        config.add_route("svc-in", "/svc", MatchType::StartsWith).unwrap();
        config.add_endpoint("10.0.0.1", "svc-in", 8080, "", 0);
        config.listeners.get_mut(&Zone::Internal).unwrap().routes.push("svc-in".to_string());
        config
    }

    #[test]
    fn test_publish_installs_all_four_collections() {
        let (state, publisher) = publisher();
        let version = publisher.publish(&valid_config()).unwrap();
        assert_eq!(version, 1);
        assert_eq!(state.resources_for(LISTENER_TYPE_URL).len(), 2);
        assert_eq!(state.resources_for(CLUSTER_TYPE_URL).len(), 1);
        assert_eq!(state.resources_for(ROUTE_TYPE_URL).len(), 2);
        assert_eq!(state.resources_for(ENDPOINT_TYPE_URL).len(), 1);
    }

    #[test]
    fn test_dangling_route_target_is_rejected() {
        let (state, publisher) = publisher();
        let mut config = valid_config();
        config.clusters.remove("svc-in");
        config.endpoints.remove("svc-in");

        let err = publisher.publish(&config).unwrap_err();
        assert!(matches!(err, Error::Consistency(_)));
        // Failed publish must not disturb the version counter.
        assert_eq!(state.get_version(), 0);
    }

    #[test]
    fn test_dangling_listener_route_is_rejected() {
        let (_, publisher) = publisher();
        let mut config = valid_config();
        config.listeners.get_mut(&Zone::Internal).unwrap().routes.push("ghost-in".to_string());
        assert!(publisher.publish(&config).is_err());
    }

    #[test]
    fn test_endpointless_cluster_is_rejected() {
        let (_, publisher) = publisher();
        let mut config = valid_config();
        config.endpoints.remove("svc-in");
        assert!(publisher.publish(&config).is_err());
    }

    #[test]
    fn test_republish_bumps_version() {
        let (_, publisher) = publisher();
        let config = valid_config();
        assert_eq!(publisher.publish(&config).unwrap(), 1);
        assert_eq!(publisher.publish(&config).unwrap(), 2);
    }
}
