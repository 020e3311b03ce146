//! Route configuration (RDS) resource construction.
//!
//! Each zone listener gets one `RouteConfiguration` named `<zone>-routes`
//! carrying a single wildcard virtual host. The listener's ordered route
//! keys become the virtual host's routes, so attachment order (and
//! therefore more-specific-wins shadowing) is preserved on the wire.

use envoy_types::pb::envoy::config::route::v3::{
    route::Action, route_action::ClusterSpecifier, route_action::HostRewriteSpecifier,
    route_match::PathSpecifier, Route as EnvoyRoute, RouteAction, RouteConfiguration, RouteMatch,
    VirtualHost,
};
use envoy_types::pb::envoy::r#type::matcher::v3::RegexMatcher;
use envoy_types::pb::google::protobuf::BoolValue;
use prost::Message;
use tracing::debug;

use crate::errors::{Error, Result};
use crate::model::{Config, MatchType, Route, Zone};
use crate::xds::resources::{BuiltResource, ROUTE_TYPE_URL};

pub(super) fn route_config_name(zone: Zone) -> String {
    format!("{}-routes", zone.as_str())
}

fn path_specifier(route: &Route) -> PathSpecifier {
    match route.match_type {
        MatchType::Exact => PathSpecifier::Path(route.path.clone()),
        MatchType::StartsWith => PathSpecifier::Prefix(route.path.clone()),
        MatchType::Regex => PathSpecifier::SafeRegex(RegexMatcher {
            regex: route.path.clone(),
            ..Default::default()
        }),
    }
}

fn to_envoy_route(key: &str, route: &Route) -> EnvoyRoute {
    EnvoyRoute {
        name: key.to_string(),
        r#match: Some(RouteMatch {
            path_specifier: Some(path_specifier(route)),
            ..Default::default()
        }),
        action: Some(Action::Route(RouteAction {
            cluster_specifier: Some(ClusterSpecifier::Cluster(route.cluster_name.clone())),
            host_rewrite_specifier: Some(HostRewriteSpecifier::AutoHostRewrite(BoolValue {
                value: true,
            })),
            ..Default::default()
        })),
        ..Default::default()
    }
}

/// Build one route configuration per zone listener.
pub fn routes_from_model(config: &Config) -> Result<Vec<BuiltResource>> {
    let mut built = Vec::with_capacity(config.listeners.len());

    for (zone, listener) in &config.listeners {
        let mut routes = Vec::with_capacity(listener.routes.len());
        for key in &listener.routes {
            let route = config.routes.get(key).ok_or_else(|| {
                Error::consistency(format!(
                    "{} listener references unknown route {key:?}",
                    zone.as_str()
                ))
            })?;
            routes.push(to_envoy_route(key, route));
        }

        let name = route_config_name(*zone);
        let route_config = RouteConfiguration {
            name: name.clone(),
            virtual_hosts: vec![VirtualHost {
                name: format!("{}-services", zone.as_str()),
                domains: vec!["*".to_string()],
                routes,
                ..Default::default()
            }],
            ..Default::default()
        };

        let encoded = route_config.encode_to_vec();
        debug!(routes = %name, count = listener.routes.len(), "built route configuration");
        built.push(BuiltResource::new(name, ROUTE_TYPE_URL, encoded));
    }

    Ok(built)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ListenerSettings;
    use crate::model::LoadBalancingPolicy;

    fn seeded_config() -> Config {
        let mut config = Config::new();
        let settings = ListenerSettings::default();
        for zone in Zone::ALL {
            let placement = settings.zone(zone);
            config.add_listener(zone, &placement.address, placement.port, &placement.common_name);
        }
        config
    }

    #[test]
    fn test_empty_model_still_yields_both_route_configs() {
        let built = routes_from_model(&seeded_config()).unwrap();
        assert_eq!(built.len(), 2);
        let names: Vec<_> = built.iter().map(|b| b.name.as_str()).collect();
        assert!(names.contains(&"internal-routes"));
        assert!(names.contains(&"external-routes"));
    }

    #[test]
    fn test_routes_follow_listener_attachment_order() {
        let mut config = seeded_config();
        for key in ["svc-b-in", "svc-a-in"] {
            config.add_cluster(key, LoadBalancingPolicy::RoundRobin, None).unwrap();
            config.add_route(key, "/svc", MatchType::StartsWith).unwrap();
        }
        let listener = config.listeners.get_mut(&Zone::Internal).unwrap();
        listener.routes = vec!["svc-b-in".to_string(), "svc-a-in".to_string()];

        let built = routes_from_model(&config).unwrap();
        let internal = built.iter().find(|b| b.name == "internal-routes").unwrap();
        let decoded = RouteConfiguration::decode(&*internal.resource.value).unwrap();
        let names: Vec<_> =
            decoded.virtual_hosts[0].routes.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["svc-b-in", "svc-a-in"]);
    }

    #[test]
    fn test_match_types_map_to_path_specifiers() {
        let mut config = seeded_config();
        let cases = [
            ("svc-a-in", "/a", MatchType::Exact),
            ("svc-b-in", "/b", MatchType::StartsWith),
            ("svc-c-in", "/c/.*", MatchType::Regex),
        ];
        for (key, path, match_type) in cases {
            config.add_cluster(key, LoadBalancingPolicy::RoundRobin, None).unwrap();
            config.add_route(key, path, match_type).unwrap();
            config.listeners.get_mut(&Zone::Internal).unwrap().routes.push(key.to_string());
        }

        let built = routes_from_model(&config).unwrap();
        let internal = built.iter().find(|b| b.name == "internal-routes").unwrap();
        let decoded = RouteConfiguration::decode(&*internal.resource.value).unwrap();
        let specs: Vec<_> = decoded.virtual_hosts[0]
            .routes
            .iter()
            .map(|r| r.r#match.as_ref().unwrap().path_specifier.clone().unwrap())
            .collect();
        assert!(matches!(specs[0], PathSpecifier::Path(ref p) if p == "/a"));
        assert!(matches!(specs[1], PathSpecifier::Prefix(ref p) if p == "/b"));
        assert!(matches!(specs[2], PathSpecifier::SafeRegex(ref m) if m.regex == "/c/.*"));
    }

    #[test]
    fn test_unknown_route_reference_is_a_consistency_error() {
        let mut config = seeded_config();
        config.listeners.get_mut(&Zone::Internal).unwrap().routes.push("ghost-in".to_string());
        let err = routes_from_model(&config).unwrap_err();
        assert!(matches!(err, Error::Consistency(_)));
    }
}
