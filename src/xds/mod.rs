//! Envoy xDS resource construction and the ADS gRPC server.

mod cluster;
mod endpoint;
mod listener;
mod publisher;
mod resources;
mod route;
mod server;
mod state;

pub use publisher::SnapshotPublisher;
pub use resources::{
    BuiltResource, CLUSTER_TYPE_URL, ENDPOINT_TYPE_URL, LISTENER_TYPE_URL, ROUTE_TYPE_URL,
};
pub use server::{start_xds_server, AdsService};
pub use state::XdsState;
