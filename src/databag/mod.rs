//! On-disk databag document format.
//!
//! One JSON document per file describes a logical service: the zones it
//! is available in and the backends (match pattern, balance policy,
//! upstream endpoints) that serve it. Every field defaults so sparse
//! documents parse cleanly; semantic validation happens in the
//! translator, not here.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// One user-authored service description.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Databag {
    /// Zone tags: "internal", "external", or both. Empty means both.
    pub availability: Vec<String>,
    pub backends: Vec<Backend>,
    pub groups: Vec<String>,
    /// Service identifier; also the URL path with slashes swapped for dashes.
    pub id: String,
}

/// One routable unit within a databag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Backend {
    pub availability: Vec<String>,
    /// Load balancing policy; empty defaults to round robin.
    pub balance: String,
    pub healthcheck: Option<BagHealthCheck>,
    /// Opts this backend out of the id-derived match-pattern prefix rule.
    pub ignore_default_match: bool,
    #[serde(rename = "match")]
    pub match_spec: Match,
    pub rate_limit: RateLimit,
    #[serde(rename = "servers")]
    pub server: Server,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Server {
    pub endpoints: Vec<BagEndpoint>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BagEndpoint {
    pub address: String,
    /// Explicit upstream port; 0 falls back to the address scheme default.
    pub port: u16,
    pub region: String,
    pub weight: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BagHealthCheck {
    pub method: String,
    pub path: String,
    /// "http" or "tcp".
    #[serde(rename = "type")]
    pub check_type: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Match {
    pub path: MatchPath,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchPath {
    pub pattern: String,
    /// "exact", "starts_with", or "regex"; empty defaults to starts_with.
    #[serde(rename = "type")]
    pub match_type: String,
}

/// Rate limiting intent; parsed but not enforced by this control plane.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimit {
    pub count: u32,
    pub field: String,
}

impl Databag {
    /// Read and decode one databag document from disk.
    pub fn from_file(path: &Path) -> Result<Databag> {
        let contents = fs::read(path)?;
        serde_json::from_slice(&contents)
            .map_err(|source| Error::Parse { path: path.to_path_buf(), source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sparse_document_parses_with_defaults() {
        let bag: Databag = serde_json::from_str(r#"{"id": "fletcher-3"}"#).unwrap();
        assert_eq!(bag.id, "fletcher-3");
        assert!(bag.availability.is_empty());
        assert!(bag.backends.is_empty());
    }

    #[test]
    fn test_full_document_parses() {
        let doc = r#"{
            "availability": ["internal"],
            "backends": [{
                "availability": [],
                "balance": "leastconn",
                "healthcheck": {"method": "GET", "path": "/healthz", "type": "http"},
                "ignore_default_match": false,
                "match": {"path": {"pattern": "/fletcher/3", "type": "starts_with"}},
                "rate_limit": {"count": 100, "field": "ip"},
                "servers": {"endpoints": [
                    {"address": "127.0.0.1", "port": 3333, "region": "global", "weight": 2}
                ]}
            }],
            "groups": ["dev"],
            "id": "fletcher-3"
        }"#;
        let bag: Databag = serde_json::from_str(doc).unwrap();
        assert_eq!(bag.backends.len(), 1);
        let backend = &bag.backends[0];
        assert_eq!(backend.balance, "leastconn");
        assert_eq!(backend.match_spec.path.pattern, "/fletcher/3");
        assert_eq!(backend.server.endpoints[0].port, 3333);
        assert_eq!(backend.healthcheck.as_ref().unwrap().check_type, "http");
    }

    #[test]
    fn test_malformed_document_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, b"{not json").unwrap();
        let err = Databag::from_file(&path).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }
}
