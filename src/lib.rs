//! # Bagplane
//!
//! A databag-driven Envoy control plane. A directory tree of declarative
//! JSON databag files is watched for changes; each file compiles into a
//! partial traffic model, the partials merge into one global model, and
//! that model is translated into Envoy listeners, clusters, routes, and
//! endpoints served over an ADS gRPC stream as atomically-versioned
//! snapshots.
//!
//! ## Core components
//!
//! - **Databag format** ([`databag`]): the on-disk JSON documents
//! - **Translator** ([`translator`]): databag to partial model compilation
//! - **Store** ([`store`]): per-file partials and global model rebuilds
//! - **xDS layer** ([`xds`]): resource construction, snapshots, ADS server
//! - **Watcher** ([`watcher`]): filesystem events feeding the store

pub mod cli;
pub mod config;
pub mod databag;
pub mod errors;
pub mod model;
pub mod observability;
pub mod store;
pub mod translator;
pub mod watcher;
pub mod xds;

pub use errors::{Error, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
