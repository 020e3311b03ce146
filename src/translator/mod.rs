//! Databag-to-model translation.
//!
//! Compiles one databag document into a partial [`Config`]. The four
//! steps run in a fixed order because later steps depend on state the
//! earlier ones wrote: listeners, then clusters, then endpoints (which
//! prune empty clusters), then routes (which skip pruned clusters and
//! attach themselves to the zone listeners).
//!
//! Any step failure aborts the whole file; a half-translated partial is
//! never returned.

use url::Url;

use crate::config::ListenerSettings;
use crate::databag::{Backend, BagEndpoint, Databag};
use crate::errors::{Error, Result};
use crate::model::{
    resolve_name, Availability, Config, HealthCheck, HealthCheckType, LoadBalancingPolicy,
    MatchType, Zone,
};

/// Default health-check cadence when a databag asks for checking but the
/// format carries no tuning knobs.
const HEALTH_CHECK_INTERVAL_SECS: u64 = 5;
const HEALTH_CHECK_THRESHOLD: u32 = 3;

/// Well-known URL schemes and their default ports. Endpoint addresses
/// using any other scheme are rejected.
const SCHEME_PORTS: &[(&str, u16)] = &[
    ("ftp", 20),
    ("gopher", 70),
    ("http", 80),
    ("https", 443),
    ("imap", 143),
    ("ldap", 389),
    ("nfs", 2049),
    ("nntp", 119),
    ("pop", 110),
    ("smtp", 25),
    ("telnet", 23),
];

fn scheme_default_port(scheme: &str) -> Option<u16> {
    SCHEME_PORTS.iter().find(|(name, _)| *name == scheme).map(|(_, port)| *port)
}

/// Holds the databags being compiled and the partial model under
/// construction.
struct BagTranslator<'a> {
    bags: &'a [Databag],
    listeners: &'a ListenerSettings,
    config: Config,
}

/// Compile a set of databags into one partial model.
pub fn translate(bags: &[Databag], listeners: &ListenerSettings) -> Result<Config> {
    let mut translator = BagTranslator { bags, listeners, config: Config::new() };

    translator.add_listeners();
    translator.add_clusters()?;
    translator.add_endpoints()?;
    translator.add_routes()?;

    Ok(translator.config)
}

impl BagTranslator<'_> {
    /// Materialize the two fixed zone listeners from static placement.
    fn add_listeners(&mut self) {
        for zone in Zone::ALL {
            let placement = self.listeners.zone(zone);
            self.config.add_listener(zone, &placement.address, placement.port, &placement.common_name);
        }
    }

    fn add_clusters(&mut self) -> Result<()> {
        for bag in self.bags {
            for backend in &bag.backends {
                let name = cluster_key(bag, backend)?;
                let policy = LoadBalancingPolicy::from_balance(&backend.balance);
                let health_check = backend.healthcheck.as_ref().map(|hc| HealthCheck {
                    check_type: if hc.check_type == "tcp" {
                        HealthCheckType::Tcp
                    } else {
                        HealthCheckType::Http
                    },
                    path: hc.path.clone(),
                    host: None,
                    interval_secs: HEALTH_CHECK_INTERVAL_SECS,
                    healthy_threshold: HEALTH_CHECK_THRESHOLD,
                    unhealthy_threshold: HEALTH_CHECK_THRESHOLD,
                });
                self.config.add_cluster(&name, policy, health_check)?;
            }
        }
        Ok(())
    }

    /// Resolve and register every backend endpoint. A backend with zero
    /// endpoints has its cluster removed instead; a cluster may exist
    /// only if at least one endpoint backs it.
    fn add_endpoints(&mut self) -> Result<()> {
        for bag in self.bags {
            for backend in &bag.backends {
                let name = cluster_key(bag, backend)?;
                if backend.server.endpoints.is_empty() {
                    self.config.clusters.remove(&name);
                    continue;
                }
                for endpoint in &backend.server.endpoints {
                    let (address, port) = resolve_endpoint_address(endpoint)?;
                    self.config.add_endpoint(&address, &name, port, &endpoint.region, endpoint.weight);
                }
            }
        }
        Ok(())
    }

    fn add_routes(&mut self) -> Result<()> {
        for bag in self.bags {
            let base_path = format!("/{}", bag.id.replace('-', "/"));
            for backend in &bag.backends {
                let name = cluster_key(bag, backend)?;
                // Backends pruned for having no endpoints get no route.
                if !self.config.clusters.contains_key(&name) {
                    continue;
                }

                let pattern = &backend.match_spec.path.pattern;
                if pattern.is_empty() {
                    self.config.add_route(&name, &base_path, MatchType::StartsWith)?;
                    continue;
                }

                if !backend.ignore_default_match && !pattern.starts_with(&base_path) {
                    return Err(Error::validation(format!(
                        "path pattern must start with \"{base_path}\""
                    )));
                }

                let match_type = match backend.match_spec.path.match_type.as_str() {
                    "" => MatchType::StartsWith,
                    other => MatchType::parse(other).ok_or_else(|| {
                        Error::validation(format!("invalid match type: {other}"))
                    })?,
                };
                self.config.add_route(&name, pattern, match_type)?;
            }
        }

        self.attach_routes_to_listeners();
        Ok(())
    }

    /// Append routes to the zone listeners: strictly-internal and
    /// strictly-external routes go to their own zone; unrestricted routes
    /// go to a zone only when no more specific route exists for the same
    /// base name there (suffix substitution implements more-specific-wins
    /// without a separate override table).
    fn attach_routes_to_listeners(&mut self) {
        let mut internal = Vec::new();
        let mut external = Vec::new();

        for (name, route) in &self.config.routes {
            match route.availability {
                Availability::Internal => internal.push(name.clone()),
                Availability::External => external.push(name.clone()),
                Availability::Both => {}
            }
        }
        for (name, route) in &self.config.routes {
            if route.availability != Availability::Both {
                continue;
            }
            let base = &name[..name.len() - 2];
            if !self.config.routes.contains_key(&format!("{base}in")) {
                internal.push(name.clone());
            }
            if !self.config.routes.contains_key(&format!("{base}ex")) {
                external.push(name.clone());
            }
        }

        if let Some(listener) = self.config.listeners.get_mut(&Zone::Internal) {
            listener.routes.extend(internal);
        }
        if let Some(listener) = self.config.listeners.get_mut(&Zone::External) {
            listener.routes.extend(external);
        }
    }
}

/// Derive a backend's cluster/route key: match pattern (slashes to
/// dashes, leading separator stripped) if set, else the databag id, plus
/// the resolved availability suffix.
fn cluster_key(bag: &Databag, backend: &Backend) -> Result<String> {
    let pattern = &backend.match_spec.path.pattern;
    let base = if pattern.is_empty() {
        bag.id.clone()
    } else {
        pattern.replace('/', "-").trim_start_matches('-').to_string()
    };
    resolve_name(&bag.availability, &backend.availability, &base)
}

/// Normalize an endpoint address into `(host[/path], port)`.
///
/// Addresses without a scheme are treated as https. Port precedence:
/// URL-embedded port, then the explicit `port` field, then the scheme
/// default.
fn resolve_endpoint_address(endpoint: &BagEndpoint) -> Result<(String, u16)> {
    let raw = if endpoint.address.contains("://") {
        endpoint.address.clone()
    } else {
        format!("https://{}", endpoint.address)
    };

    let url = Url::parse(&raw).map_err(|err| {
        Error::validation(format!("error parsing endpoint url {:?}: {err}", endpoint.address))
    })?;
    let scheme_port = scheme_default_port(url.scheme())
        .ok_or_else(|| Error::validation(format!("invalid scheme: {}", url.scheme())))?;
    let host = url
        .host_str()
        .ok_or_else(|| Error::validation(format!("endpoint url {:?} has no host", endpoint.address)))?;

    let mut address = format!("{host}{}", url.path());
    if address.ends_with('/') {
        address.pop();
    }

    let port = match url.port() {
        Some(port) => port,
        None if endpoint.port != 0 => endpoint.port,
        None => scheme_port,
    };

    Ok((address, port))
}
