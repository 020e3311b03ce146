//! Intermediate configuration model.
//!
//! This is the normalized topology every databag compiles into: two fixed
//! zone listeners, clusters keyed by availability-suffixed names, routes
//! keyed by their owning cluster, and per-cluster endpoint sequences. One
//! `Config` exists per source file (partial) and a merged global `Config`
//! is rebuilt from the partials on every change, so the global view never
//! reflects a half-applied edit.

mod naming;

pub use naming::resolve_name;

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::ListenerSettings;
use crate::errors::{Error, Result};

/// One of the two traffic classes a listener serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Zone {
    Internal,
    External,
}

impl Zone {
    pub const ALL: [Zone; 2] = [Zone::Internal, Zone::External];

    pub fn as_str(&self) -> &'static str {
        match self {
            Zone::Internal => "internal",
            Zone::External => "external",
        }
    }
}

/// The zone set a cluster or route is eligible to serve.
///
/// Encoded on the wire as the trailing key suffix (`-in`, `-ex`, `-ie`);
/// the typed value is derived from the suffix exactly once, when the
/// cluster or route is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Availability {
    Internal = 0b01,
    External = 0b10,
    Both = 0b11,
}

impl Availability {
    /// Two-letter suffix form used in cluster and route keys.
    pub fn suffix(&self) -> &'static str {
        match self {
            Availability::Internal => "in",
            Availability::External => "ex",
            Availability::Both => "ie",
        }
    }

    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "in" => Some(Availability::Internal),
            "ex" => Some(Availability::External),
            "ie" => Some(Availability::Both),
            _ => None,
        }
    }

    /// Re-derive availability from a composite key's trailing suffix.
    ///
    /// Keys are produced by [`resolve_name`], so a failure here means the
    /// naming engine and the merge step have diverged; callers treat it
    /// as an invariant violation, not recoverable input.
    pub fn from_key(key: &str) -> Result<Self> {
        let suffix = key
            .get(key.len().saturating_sub(2)..)
            .ok_or_else(|| Error::internal(format!("availability suffix missing in key {key:?}")))?;
        Self::from_suffix(suffix).ok_or_else(|| {
            Error::internal(format!("unrecognized availability suffix in key {key:?}"))
        })
    }

    pub fn serves(&self, zone: Zone) -> bool {
        let bit = match zone {
            Zone::Internal => 0b01,
            Zone::External => 0b10,
        };
        (*self as u8) & bit != 0
    }
}

/// How a route path pattern is matched against the request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Exact,
    StartsWith,
    Regex,
}

impl MatchType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "exact" => Some(MatchType::Exact),
            "starts_with" => Some(MatchType::StartsWith),
            "regex" => Some(MatchType::Regex),
            _ => None,
        }
    }
}

/// Upstream load-balancing policy, mirroring Envoy's cluster LB policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadBalancingPolicy {
    #[default]
    RoundRobin,
    LeastRequest,
    RingHash,
    Random,
    Maglev,
    ClusterProvided,
    LbPolicyConfig,
}

impl LoadBalancingPolicy {
    /// Map a databag `balance` value onto a policy. HAProxy-style aliases
    /// are accepted alongside the native names; anything unrecognized
    /// (including the empty string) defaults to round robin.
    pub fn from_balance(balance: &str) -> Self {
        match balance {
            "" | "static-rr" | "round_robin" => LoadBalancingPolicy::RoundRobin,
            "leastconn" | "least_request" => LoadBalancingPolicy::LeastRequest,
            "ring_hash" => LoadBalancingPolicy::RingHash,
            "random" => LoadBalancingPolicy::Random,
            "maglev" => LoadBalancingPolicy::Maglev,
            "cluster_provided" => LoadBalancingPolicy::ClusterProvided,
            "lb_policy_config" => LoadBalancingPolicy::LbPolicyConfig,
            _ => LoadBalancingPolicy::RoundRobin,
        }
    }
}

/// Health checking method for a cluster's endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthCheckType {
    Http,
    Tcp,
}

/// Active health check attached to a cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthCheck {
    pub check_type: HealthCheckType,
    pub path: String,
    pub host: Option<String>,
    pub interval_secs: u64,
    pub healthy_threshold: u32,
    pub unhealthy_threshold: u32,
}

/// One of the two fixed zone listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct Listener {
    pub address: String,
    pub zone: Zone,
    pub port: u16,
    pub common_name: String,
    /// Ordered route keys served by this listener, rebuilt on every merge.
    pub routes: Vec<String>,
}

/// One upstream pool, keyed by its availability-suffixed name.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub name: String,
    pub availability: Availability,
    pub policy: LoadBalancingPolicy,
    pub health_check: Option<HealthCheck>,
}

/// One path match forwarding to a cluster; keyed by the cluster name.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub availability: Availability,
    pub cluster_name: String,
    pub path: String,
    pub match_type: MatchType,
}

/// One upstream host. `weight == 0` means unweighted.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub address: String,
    pub cluster_name: String,
    pub port: u16,
    pub region: String,
    pub weight: u32,
}

/// The normalized topology compiled from one or more databags.
///
/// `BTreeMap` keeps iteration deterministic, which matters only for test
/// stability, not semantics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub listeners: BTreeMap<Zone, Listener>,
    pub clusters: BTreeMap<String, Cluster>,
    pub routes: BTreeMap<String, Route>,
    pub endpoints: BTreeMap<String, Vec<Endpoint>>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&mut self, zone: Zone, address: &str, port: u16, common_name: &str) {
        self.listeners.insert(
            zone,
            Listener {
                address: address.to_string(),
                zone,
                port,
                common_name: common_name.to_string(),
                routes: Vec::new(),
            },
        );
    }

    /// Register a cluster, re-deriving its availability from the key
    /// suffix. The re-derivation is a deliberate self-check that the
    /// naming engine and the merge step agree on the encoding.
    pub fn add_cluster(
        &mut self,
        name: &str,
        policy: LoadBalancingPolicy,
        health_check: Option<HealthCheck>,
    ) -> Result<()> {
        let availability = Availability::from_key(name)?;
        self.clusters.insert(
            name.to_string(),
            Cluster { name: name.to_string(), availability, policy, health_check },
        );
        Ok(())
    }

    /// Register a route under its owning cluster's key.
    pub fn add_route(&mut self, cluster_name: &str, path: &str, match_type: MatchType) -> Result<()> {
        let availability = Availability::from_key(cluster_name)?;
        self.routes.insert(
            cluster_name.to_string(),
            Route {
                availability,
                cluster_name: cluster_name.to_string(),
                path: path.to_string(),
                match_type,
            },
        );
        Ok(())
    }

    pub fn add_endpoint(
        &mut self,
        address: &str,
        cluster_name: &str,
        port: u16,
        region: &str,
        weight: u32,
    ) {
        self.endpoints.entry(cluster_name.to_string()).or_default().push(Endpoint {
            address: address.to_string(),
            cluster_name: cluster_name.to_string(),
            port,
            region: region.to_string(),
            weight,
        });
    }
}

/// Rebuild the global model from the union of per-file partials.
///
/// Always seeds the two zone listeners at their fixed identity, then
/// copies listener route references, re-adds clusters and routes
/// (idempotent keyed overwrite, so merge order is commutative for them)
/// and appends endpoints (additive across partials).
pub fn merge_configs(
    partials: &BTreeMap<PathBuf, Config>,
    listeners: &ListenerSettings,
) -> Result<Config> {
    let mut merged = Config::new();
    for zone in Zone::ALL {
        let placement = listeners.zone(zone);
        merged.add_listener(zone, &placement.address, placement.port, &placement.common_name);
    }

    for partial in partials.values() {
        for (zone, listener) in &partial.listeners {
            let target = merged
                .listeners
                .get_mut(zone)
                .ok_or_else(|| Error::internal(format!("missing seeded {} listener", zone.as_str())))?;
            target.routes.extend(listener.routes.iter().cloned());
        }
        for cluster in partial.clusters.values() {
            merged.add_cluster(&cluster.name, cluster.policy, cluster.health_check.clone())?;
        }
        for route in partial.routes.values() {
            merged.add_route(&route.cluster_name, &route.path, route.match_type)?;
        }
        for endpoints in partial.endpoints.values() {
            for endpoint in endpoints {
                merged.add_endpoint(
                    &endpoint.address,
                    &endpoint.cluster_name,
                    endpoint.port,
                    &endpoint.region,
                    endpoint.weight,
                );
            }
        }
    }

    Ok(merged)
}
