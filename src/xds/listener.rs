//! Listener (LDS) resource construction.
//!
//! Each zone always gets an HTTPS listener whose route table comes in via
//! RDS over the ADS stream and whose server certificate is loaded from
//! `certs/<common_name>.crt` and `.key`. With HTTP redirects enabled the
//! HTTPS listener moves to a fixed high port and a plain HTTP listener
//! takes the zone's configured port, answering everything with a redirect
//! to its HTTPS sibling.

use envoy_types::pb::envoy::config::core::v3::transport_socket::ConfigType as TransportSocketConfigType;
use envoy_types::pb::envoy::config::core::v3::{
    address::Address as AddressType, config_source::ConfigSourceSpecifier, data_source,
    socket_address, Address, AggregatedConfigSource, ConfigSource, DataSource, SocketAddress,
    TransportSocket,
};
use envoy_types::pb::envoy::config::listener::v3::{
    filter::ConfigType as FilterConfigType, Filter, FilterChain, Listener as EnvoyListener,
};
use envoy_types::pb::envoy::config::route::v3::{
    redirect_action::SchemeRewriteSpecifier, route::Action, route_match::PathSpecifier,
    RedirectAction, Route as EnvoyRoute, RouteConfiguration, RouteMatch, VirtualHost,
};
use envoy_types::pb::envoy::extensions::filters::network::http_connection_manager::v3::{
    http_connection_manager::RouteSpecifier, HttpConnectionManager, Rds,
};
use envoy_types::pb::envoy::extensions::transport_sockets::tls::v3::{
    CommonTlsContext, DownstreamTlsContext, TlsCertificate,
};
use envoy_types::pb::google::protobuf::Any;
use prost::Message;
use tracing::debug;

use crate::errors::Result;
use crate::model::{Config, Listener, Zone};
use crate::xds::resources::{BuiltResource, LISTENER_TYPE_URL};
use crate::xds::route::route_config_name;

/// Fixed HTTPS ports used when the configured zone ports are given over
/// to plain HTTP redirect listeners.
const HTTPS_PORT_INTERNAL: u16 = 48877;
const HTTPS_PORT_EXTERNAL: u16 = 48878;

const HCM_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.network.http_connection_manager.v3.HttpConnectionManager";
const DOWNSTREAM_TLS_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.transport_sockets.tls.v3.DownstreamTlsContext";

fn https_port(zone: Zone) -> u16 {
    match zone {
        Zone::Internal => HTTPS_PORT_INTERNAL,
        Zone::External => HTTPS_PORT_EXTERNAL,
    }
}

fn socket_address(host: &str, port: u16) -> Address {
    Address {
        address: Some(AddressType::SocketAddress(SocketAddress {
            address: host.to_string(),
            port_specifier: Some(socket_address::PortSpecifier::PortValue(port.into())),
            ..Default::default()
        })),
    }
}

fn data_source_from_path(path: String) -> DataSource {
    DataSource { specifier: Some(data_source::Specifier::Filename(path)), ..Default::default() }
}

fn downstream_tls_socket(common_name: &str) -> TransportSocket {
    let common = CommonTlsContext {
        tls_certificates: vec![TlsCertificate {
            certificate_chain: Some(data_source_from_path(format!("certs/{common_name}.crt"))),
            private_key: Some(data_source_from_path(format!("certs/{common_name}.key"))),
            ..Default::default()
        }],
        ..Default::default()
    };
    let downstream =
        DownstreamTlsContext { common_tls_context: Some(common), ..Default::default() };

    TransportSocket {
        name: "envoy.transport_sockets.tls".to_string(),
        config_type: Some(TransportSocketConfigType::TypedConfig(Any {
            type_url: DOWNSTREAM_TLS_TYPE_URL.to_string(),
            value: downstream.encode_to_vec(),
        })),
    }
}

fn hcm_filter(hcm: HttpConnectionManager) -> Filter {
    Filter {
        name: "envoy.filters.network.http_connection_manager".to_string(),
        config_type: Some(FilterConfigType::TypedConfig(Any {
            type_url: HCM_TYPE_URL.to_string(),
            value: hcm.encode_to_vec(),
        })),
    }
}

fn https_listener(listener: &Listener, port: u16) -> EnvoyListener {
    let hcm = HttpConnectionManager {
        stat_prefix: "ingress_http".to_string(),
        route_specifier: Some(RouteSpecifier::Rds(Rds {
            config_source: Some(ConfigSource {
                config_source_specifier: Some(ConfigSourceSpecifier::Ads(
                    AggregatedConfigSource::default(),
                )),
                ..Default::default()
            }),
            route_config_name: route_config_name(listener.zone),
        })),
        ..Default::default()
    };

    EnvoyListener {
        name: format!("https-{}", listener.zone.as_str()),
        address: Some(socket_address(&listener.address, port)),
        filter_chains: vec![FilterChain {
            filters: vec![hcm_filter(hcm)],
            transport_socket: Some(downstream_tls_socket(&listener.common_name)),
            ..Default::default()
        }],
        ..Default::default()
    }
}

/// Plain HTTP listener redirecting every request to the HTTPS sibling.
fn redirect_listener(listener: &Listener, https_port: u16) -> EnvoyListener {
    let zone = listener.zone.as_str();
    let route_config = RouteConfiguration {
        name: format!("{zone}-redirect"),
        virtual_hosts: vec![VirtualHost {
            name: format!("{zone}-redirect"),
            domains: vec!["*".to_string()],
            routes: vec![EnvoyRoute {
                r#match: Some(RouteMatch {
                    path_specifier: Some(PathSpecifier::Prefix("/".to_string())),
                    ..Default::default()
                }),
                action: Some(Action::Redirect(RedirectAction {
                    scheme_rewrite_specifier: Some(SchemeRewriteSpecifier::HttpsRedirect(true)),
                    port_redirect: https_port.into(),
                    ..Default::default()
                })),
                ..Default::default()
            }],
            ..Default::default()
        }],
        ..Default::default()
    };

    let hcm = HttpConnectionManager {
        stat_prefix: "ingress_http".to_string(),
        route_specifier: Some(RouteSpecifier::RouteConfig(route_config)),
        ..Default::default()
    };

    EnvoyListener {
        name: format!("http-{zone}"),
        address: Some(socket_address(&listener.address, listener.port)),
        filter_chains: vec![FilterChain { filters: vec![hcm_filter(hcm)], ..Default::default() }],
        ..Default::default()
    }
}

/// Build the LDS collection for the model's two zone listeners.
pub fn listeners_from_model(config: &Config, add_http: bool) -> Result<Vec<BuiltResource>> {
    let mut built = Vec::with_capacity(if add_http { 4 } else { 2 });

    for listener in config.listeners.values() {
        let https = if add_http {
            let port = https_port(listener.zone);
            let redirect = redirect_listener(listener, port);
            debug!(listener = %redirect.name, "built redirect listener");
            built.push(BuiltResource::new(
                redirect.name.clone(),
                LISTENER_TYPE_URL,
                redirect.encode_to_vec(),
            ));
            https_listener(listener, port)
        } else {
            https_listener(listener, listener.port)
        };

        debug!(listener = %https.name, "built https listener");
        built.push(BuiltResource::new(
            https.name.clone(),
            LISTENER_TYPE_URL,
            https.encode_to_vec(),
        ));
    }

    Ok(built)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ListenerSettings;

    fn seeded_config() -> Config {
        let mut config = Config::new();
        let settings = ListenerSettings::default();
        for zone in Zone::ALL {
            let placement = settings.zone(zone);
            config.add_listener(zone, &placement.address, placement.port, &placement.common_name);
        }
        config
    }

    fn listener_port(listener: &EnvoyListener) -> u32 {
        match listener.address.as_ref().unwrap().address.as_ref().unwrap() {
            AddressType::SocketAddress(socket) => match socket.port_specifier.as_ref().unwrap() {
                socket_address::PortSpecifier::PortValue(port) => *port,
                other => panic!("unexpected port specifier {other:?}"),
            },
            other => panic!("unexpected address {other:?}"),
        }
    }

    #[test]
    fn test_https_only_uses_configured_ports() {
        let built = listeners_from_model(&seeded_config(), false).unwrap();
        assert_eq!(built.len(), 2);

        let internal = built.iter().find(|b| b.name == "https-internal").unwrap();
        let decoded = EnvoyListener::decode(&*internal.resource.value).unwrap();
        assert_eq!(listener_port(&decoded), 7777);
        assert!(decoded.filter_chains[0].transport_socket.is_some());
    }

    #[test]
    fn test_add_http_moves_https_and_adds_redirectors() {
        let built = listeners_from_model(&seeded_config(), true).unwrap();
        assert_eq!(built.len(), 4);

        let https = built.iter().find(|b| b.name == "https-external").unwrap();
        let https = EnvoyListener::decode(&*https.resource.value).unwrap();
        assert_eq!(listener_port(&https), 48878);

        let http = built.iter().find(|b| b.name == "http-external").unwrap();
        let http = EnvoyListener::decode(&*http.resource.value).unwrap();
        assert_eq!(listener_port(&http), 8888);
        // Redirect listeners carry no TLS.
        assert!(http.filter_chains[0].transport_socket.is_none());
    }

    #[test]
    fn test_certificate_paths_derive_from_common_name() {
        let socket = downstream_tls_socket("proxy.example.com");
        let any = match socket.config_type.unwrap() {
            TransportSocketConfigType::TypedConfig(any) => any,
        };
        let tls = DownstreamTlsContext::decode(&*any.value).unwrap();
        let cert = &tls.common_tls_context.unwrap().tls_certificates[0];
        match cert.certificate_chain.as_ref().unwrap().specifier.as_ref().unwrap() {
            data_source::Specifier::Filename(path) => {
                assert_eq!(path, "certs/proxy.example.com.crt");
            }
            other => panic!("unexpected specifier {other:?}"),
        }
    }

    #[test]
    fn test_rds_names_follow_zone() {
        let built = listeners_from_model(&seeded_config(), false).unwrap();
        let internal = built.iter().find(|b| b.name == "https-internal").unwrap();
        let decoded = EnvoyListener::decode(&*internal.resource.value).unwrap();

        let filter = &decoded.filter_chains[0].filters[0];
        let any = match filter.config_type.as_ref().unwrap() {
            FilterConfigType::TypedConfig(any) => any,
            other => panic!("unexpected config type {other:?}"),
        };
        let hcm = HttpConnectionManager::decode(&*any.value).unwrap();
        match hcm.route_specifier.unwrap() {
            RouteSpecifier::Rds(rds) => assert_eq!(rds.route_config_name, "internal-routes"),
            other => panic!("expected rds, got {other:?}"),
        }
    }
}
