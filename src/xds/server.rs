//! ADS gRPC server.
//!
//! State-of-the-world aggregated discovery: each subscribed type URL gets
//! the full current collection whenever the snapshot version moves.
//! ACKs are detected by matching the request's nonce and version against
//! the last response sent on the stream; NACKs keep Envoy on its last
//! good version and are only logged.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use envoy_types::pb::envoy::service::discovery::v3::{
    aggregated_discovery_service_server::{
        AggregatedDiscoveryService, AggregatedDiscoveryServiceServer,
    },
    DeltaDiscoveryRequest, DeltaDiscoveryResponse, DiscoveryRequest, DiscoveryResponse,
};
use tokio::sync::mpsc;
use tokio_stream::{wrappers::ReceiverStream, Stream, StreamExt};
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::{debug, error, info, warn};

use crate::errors::{Error, Result};
use crate::xds::resources::BuiltResource;
use crate::xds::XdsState;

/// Version and nonce of the last response pushed for one type URL.
struct SentSnapshot {
    version: String,
    nonce: String,
}

#[derive(Debug)]
pub struct AdsService {
    state: Arc<XdsState>,
}

impl AdsService {
    pub fn new(state: Arc<XdsState>) -> Self {
        Self { state }
    }
}

fn build_response(state: &XdsState, type_url: &str) -> DiscoveryResponse {
    let resources =
        state.resources_for(type_url).into_iter().map(BuiltResource::into_any).collect();

    DiscoveryResponse {
        version_info: state.version_info(),
        resources,
        type_url: type_url.to_string(),
        nonce: uuid::Uuid::new_v4().to_string(),
        ..Default::default()
    }
}

async fn run_stream_loop(
    state: Arc<XdsState>,
    mut requests: tonic::Streaming<DiscoveryRequest>,
    tx: mpsc::Sender<std::result::Result<DiscoveryResponse, Status>>,
) {
    let mut updates = state.subscribe_updates();
    let mut sent: HashMap<String, SentSnapshot> = HashMap::new();

    loop {
        tokio::select! {
            request = requests.next() => {
                match request {
                    Some(Ok(request)) => {
                        if let Some(node) = &request.node {
                            debug!(node_id = %node.id, type_url = %request.type_url, "discovery request");
                        }

                        if let Some(last) = sent.get(&request.type_url) {
                            if request.response_nonce == last.nonce {
                                if let Some(detail) = &request.error_detail {
                                    warn!(
                                        type_url = %request.type_url,
                                        version = %last.version,
                                        message = %detail.message,
                                        "envoy rejected configuration"
                                    );
                                    continue;
                                }
                                if request.version_info == last.version {
                                    debug!(
                                        type_url = %request.type_url,
                                        version = %last.version,
                                        "configuration acknowledged"
                                    );
                                    continue;
                                }
                            }
                        }

                        let response = build_response(&state, &request.type_url);
                        sent.insert(
                            request.type_url.clone(),
                            SentSnapshot {
                                version: response.version_info.clone(),
                                nonce: response.nonce.clone(),
                            },
                        );
                        if tx.send(Ok(response)).await.is_err() {
                            break;
                        }
                    }
                    Some(Err(status)) => {
                        warn!(error = %status, "discovery stream error");
                        let _ = tx.send(Err(status)).await;
                        break;
                    }
                    None => {
                        info!("ads stream closed by client");
                        break;
                    }
                }
            }
            update = updates.recv() => {
                match update {
                    // A lagged receiver still wants the latest state, so
                    // both arms push the current snapshot.
                    Ok(_) | Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                        let subscribed: Vec<String> = sent.keys().cloned().collect();
                        for type_url in subscribed {
                            let response = build_response(&state, &type_url);
                            sent.insert(
                                type_url,
                                SentSnapshot {
                                    version: response.version_info.clone(),
                                    nonce: response.nonce.clone(),
                                },
                            );
                            if tx.send(Ok(response)).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
}

#[tonic::async_trait]
impl AggregatedDiscoveryService for AdsService {
    type StreamAggregatedResourcesStream =
        Pin<Box<dyn Stream<Item = std::result::Result<DiscoveryResponse, Status>> + Send>>;
    type DeltaAggregatedResourcesStream =
        Pin<Box<dyn Stream<Item = std::result::Result<DeltaDiscoveryResponse, Status>> + Send>>;

    async fn stream_aggregated_resources(
        &self,
        request: Request<tonic::Streaming<DiscoveryRequest>>,
    ) -> std::result::Result<Response<Self::StreamAggregatedResourcesStream>, Status> {
        info!("ads stream connected");

        let (tx, rx) = mpsc::channel(100);
        tokio::spawn(run_stream_loop(self.state.clone(), request.into_inner(), tx));

        let out_stream = ReceiverStream::new(rx);
        Ok(Response::new(Box::pin(out_stream) as Self::StreamAggregatedResourcesStream))
    }

    async fn delta_aggregated_resources(
        &self,
        _request: Request<tonic::Streaming<DeltaDiscoveryRequest>>,
    ) -> std::result::Result<Response<Self::DeltaAggregatedResourcesStream>, Status> {
        // Incremental xDS is not served; Envoy falls back to SOTW.
        Err(Status::unimplemented("delta xds is not supported"))
    }
}

/// Run the ADS gRPC server until the shutdown future resolves.
pub async fn start_xds_server<F>(
    state: Arc<XdsState>,
    bind_address: &str,
    port: u16,
    shutdown_signal: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("{bind_address}:{port}")
        .parse()
        .map_err(|err| Error::config(format!("invalid xds address: {err}")))?;

    let ads_service = AdsService::new(state);

    info!(address = %addr, "starting xds server");

    Server::builder()
        .add_service(AggregatedDiscoveryServiceServer::new(ads_service))
        .serve_with_shutdown(addr, shutdown_signal)
        .await
        .map_err(|err| {
            let message = err.to_string();
            if message.contains("Address already in use") || message.contains("bind") {
                error!(address = %addr, "xds port already in use");
                Error::transport(format!("xds server failed to bind {addr}: {message}"))
            } else {
                Error::transport(format!("xds server failed: {message}"))
            }
        })
}
