//! Cluster (CDS) resource construction.

use envoy_types::pb::envoy::config::cluster::v3::cluster::{
    ClusterDiscoveryType, DiscoveryType, LbPolicy,
};
use envoy_types::pb::envoy::config::cluster::v3::Cluster as EnvoyCluster;
use envoy_types::pb::envoy::config::core::v3::transport_socket::ConfigType as TransportSocketConfigType;
use envoy_types::pb::envoy::config::core::v3::{
    health_check::{HealthChecker, HttpHealthCheck, TcpHealthCheck},
    HealthCheck as EnvoyHealthCheck, TransportSocket,
};
use envoy_types::pb::envoy::extensions::transport_sockets::tls::v3::{
    CommonTlsContext, UpstreamTlsContext,
};
use envoy_types::pb::google::protobuf::{Any, Duration, UInt32Value};
use prost::Message;
use tracing::debug;

use crate::errors::{Error, Result};
use crate::model::{Cluster, Config, HealthCheck, HealthCheckType, LoadBalancingPolicy};
use crate::xds::endpoint::build_load_assignment;
use crate::xds::resources::{BuiltResource, CLUSTER_TYPE_URL};

const CONNECT_TIMEOUT_SECS: i64 = 5;
const HEALTH_CHECK_TIMEOUT_SECS: i64 = 5;

fn lb_policy(policy: LoadBalancingPolicy) -> i32 {
    let mapped = match policy {
        LoadBalancingPolicy::RoundRobin => LbPolicy::RoundRobin,
        LoadBalancingPolicy::LeastRequest => LbPolicy::LeastRequest,
        LoadBalancingPolicy::RingHash => LbPolicy::RingHash,
        LoadBalancingPolicy::Random => LbPolicy::Random,
        LoadBalancingPolicy::Maglev => LbPolicy::Maglev,
        LoadBalancingPolicy::ClusterProvided => LbPolicy::ClusterProvided,
        LoadBalancingPolicy::LbPolicyConfig => LbPolicy::LoadBalancingPolicyConfig,
    };
    mapped as i32
}

fn seconds(value: i64) -> Duration {
    Duration { seconds: value, nanos: 0 }
}

fn build_health_check(check: &HealthCheck) -> EnvoyHealthCheck {
    let checker = match check.check_type {
        HealthCheckType::Http => HealthChecker::HttpHealthCheck(HttpHealthCheck {
            host: check.host.clone().unwrap_or_default(),
            path: check.path.clone(),
            ..Default::default()
        }),
        HealthCheckType::Tcp => HealthChecker::TcpHealthCheck(TcpHealthCheck::default()),
    };

    EnvoyHealthCheck {
        timeout: Some(seconds(HEALTH_CHECK_TIMEOUT_SECS)),
        interval: Some(seconds(check.interval_secs as i64)),
        healthy_threshold: Some(UInt32Value { value: check.healthy_threshold }),
        unhealthy_threshold: Some(UInt32Value { value: check.unhealthy_threshold }),
        health_checker: Some(checker),
        ..Default::default()
    }
}

fn upstream_tls_socket(sni: &str) -> TransportSocket {
    let tls_context = UpstreamTlsContext {
        common_tls_context: Some(CommonTlsContext::default()),
        sni: sni.to_string(),
        ..Default::default()
    };

    TransportSocket {
        name: "envoy.transport_sockets.tls".to_string(),
        config_type: Some(TransportSocketConfigType::TypedConfig(Any {
            type_url:
                "type.googleapis.com/envoy.extensions.transport_sockets.tls.v3.UpstreamTlsContext"
                    .to_string(),
            value: tls_context.encode_to_vec(),
        })),
    }
}

fn to_envoy_cluster(cluster: &Cluster, config: &Config) -> Result<EnvoyCluster> {
    let endpoints = config
        .endpoints
        .get(&cluster.name)
        .filter(|eps| !eps.is_empty())
        .ok_or_else(|| {
            Error::consistency(format!("cluster {:?} has no endpoints", cluster.name))
        })?;

    let mut envoy = EnvoyCluster {
        name: cluster.name.clone(),
        connect_timeout: Some(seconds(CONNECT_TIMEOUT_SECS)),
        cluster_discovery_type: Some(ClusterDiscoveryType::Type(DiscoveryType::StrictDns as i32)),
        lb_policy: lb_policy(cluster.policy),
        load_assignment: Some(build_load_assignment(&cluster.name, endpoints)),
        ..Default::default()
    };

    if let Some(check) = &cluster.health_check {
        envoy.health_checks = vec![build_health_check(check)];
    }

    // An all-443 upstream set is taken to speak TLS.
    if endpoints.iter().all(|ep| ep.port == 443) {
        envoy.transport_socket = Some(upstream_tls_socket(&endpoints[0].address));
    }

    Ok(envoy)
}

/// Build a CDS resource per cluster in the model.
pub fn clusters_from_model(config: &Config) -> Result<Vec<BuiltResource>> {
    let mut built = Vec::with_capacity(config.clusters.len());

    for cluster in config.clusters.values() {
        let envoy = to_envoy_cluster(cluster, config)?;
        let encoded = envoy.encode_to_vec();
        debug!(cluster = %cluster.name, bytes = encoded.len(), "built cluster resource");
        built.push(BuiltResource::new(cluster.name.clone(), CLUSTER_TYPE_URL, encoded));
    }

    Ok(built)
}
