//! Endpoint (EDS) resource construction.

use envoy_types::pb::envoy::config::core::v3::{
    address::Address as AddressType, socket_address, Address, Locality, SocketAddress,
};
use envoy_types::pb::envoy::config::endpoint::v3::{
    lb_endpoint, ClusterLoadAssignment, Endpoint as EnvoyEndpoint, LbEndpoint,
    LocalityLbEndpoints,
};
use envoy_types::pb::google::protobuf::UInt32Value;
use prost::Message;
use tracing::debug;

use crate::errors::Result;
use crate::model::{Config, Endpoint};
use crate::xds::resources::{BuiltResource, ENDPOINT_TYPE_URL};

fn socket_address(host: &str, port: u16) -> Address {
    Address {
        address: Some(AddressType::SocketAddress(SocketAddress {
            address: host.to_string(),
            port_specifier: Some(socket_address::PortSpecifier::PortValue(port.into())),
            ..Default::default()
        })),
    }
}

fn to_lb_endpoint(endpoint: &Endpoint) -> LbEndpoint {
    LbEndpoint {
        host_identifier: Some(lb_endpoint::HostIdentifier::Endpoint(EnvoyEndpoint {
            address: Some(socket_address(&endpoint.address, endpoint.port)),
            ..Default::default()
        })),
        // Envoy rejects an explicit weight of zero, so unweighted hosts
        // leave the field unset.
        load_balancing_weight: (endpoint.weight != 0)
            .then(|| UInt32Value { value: endpoint.weight }),
        ..Default::default()
    }
}

/// Build the load assignment for one cluster's endpoint sequence.
pub(super) fn build_load_assignment(
    cluster_name: &str,
    endpoints: &[Endpoint],
) -> ClusterLoadAssignment {
    let locality =
        endpoints.iter().find(|e| !e.region.is_empty()).map(|e| Locality {
            region: e.region.clone(),
            ..Default::default()
        });

    ClusterLoadAssignment {
        cluster_name: cluster_name.to_string(),
        endpoints: vec![LocalityLbEndpoints {
            locality,
            lb_endpoints: endpoints.iter().map(to_lb_endpoint).collect(),
            ..Default::default()
        }],
        ..Default::default()
    }
}

/// Build one `ClusterLoadAssignment` per cluster in the model.
pub fn endpoints_from_model(config: &Config) -> Result<Vec<BuiltResource>> {
    let mut built = Vec::with_capacity(config.endpoints.len());

    for (cluster_name, endpoints) in &config.endpoints {
        let assignment = build_load_assignment(cluster_name, endpoints);
        let encoded = assignment.encode_to_vec();
        debug!(cluster = %cluster_name, hosts = endpoints.len(), "built load assignment");
        built.push(BuiltResource::new(cluster_name.clone(), ENDPOINT_TYPE_URL, encoded));
    }

    Ok(built)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(address: &str, port: u16, weight: u32) -> Endpoint {
        Endpoint {
            address: address.to_string(),
            cluster_name: "svc-ie".to_string(),
            port,
            region: String::new(),
            weight,
        }
    }

    #[test]
    fn test_weight_zero_leaves_field_unset() {
        let assignment = build_load_assignment("svc-ie", &[endpoint("10.0.0.1", 8080, 0)]);
        let lb = &assignment.endpoints[0].lb_endpoints[0];
        assert!(lb.load_balancing_weight.is_none());
    }

    #[test]
    fn test_explicit_weight_is_carried() {
        let assignment = build_load_assignment("svc-ie", &[endpoint("10.0.0.1", 8080, 3)]);
        let lb = &assignment.endpoints[0].lb_endpoints[0];
        assert_eq!(lb.load_balancing_weight.as_ref().unwrap().value, 3);
    }

    #[test]
    fn test_one_assignment_per_cluster() {
        let mut config = Config::new();
        config.add_endpoint("10.0.0.1", "svc-a-in", 8080, "", 0);
        config.add_endpoint("10.0.0.2", "svc-a-in", 8080, "", 0);
        config.add_endpoint("10.0.0.3", "svc-b-ex", 9090, "", 0);

        let built = endpoints_from_model(&config).unwrap();
        assert_eq!(built.len(), 2);
        assert_eq!(built[0].name, "svc-a-in");
        assert_eq!(built[0].type_url(), ENDPOINT_TYPE_URL);

        let decoded =
            ClusterLoadAssignment::decode(&*built[0].resource.value).unwrap();
        assert_eq!(decoded.endpoints[0].lb_endpoints.len(), 2);
    }

    #[test]
    fn test_region_maps_to_locality() {
        let mut ep = endpoint("10.0.0.1", 8080, 0);
        ep.region = "us-east1".to_string();
        let assignment = build_load_assignment("svc-ie", &[ep]);
        assert_eq!(assignment.endpoints[0].locality.as_ref().unwrap().region, "us-east1");
    }
}
