//! RPC client seam between the scheduler and the worker pool.
//!
//! The scheduler only needs "send one part, get one answer". [`FenceClient`]
//! captures exactly that so the fan-out logic can be driven by the generated
//! tonic client in production and by in-process doubles in tests.

use crate::config::FenceConfig;
use core::future::Future;
use tonic::{
    Request, Status,
    codec::CompressionEncoding,
    transport::{Channel, Endpoint},
};
use vds_fence_core::proto::{FenceRequest, FenceResponse, oneseismic_client::OneseismicClient};

/// A handle capable of sending one fence part to a worker.
///
/// Implementations must be cheap to clone; the scheduler clones the handle
/// once per dispatched part.
pub trait FenceClient: Clone + Send + Sync + 'static {
    fn fetch_part(
        &self,
        request: Request<FenceRequest>,
    ) -> impl Future<Output = Result<FenceResponse, Status>> + Send;
}

impl FenceClient for OneseismicClient<Channel> {
    async fn fetch_part(&self, request: Request<FenceRequest>) -> Result<FenceResponse, Status> {
        // `Channel` multiplexes, so a clone per call is the intended usage.
        let mut client = self.clone();
        client
            .get_fence(request)
            .await
            .map(tonic::Response::into_inner)
    }
}

/// Connects to the worker pool at `config.worker_addr`.
///
/// Responses may be compressed with zstd or gzip. Requests are only
/// compressed when `config.send_compression` is set, since not every worker
/// accepts compressed requests.
pub async fn connect(
    config: &FenceConfig,
) -> Result<OneseismicClient<Channel>, tonic::transport::Error> {
    let channel = Endpoint::from_shared(config.worker_addr.clone())?
        .connect()
        .await?;

    let client = OneseismicClient::new(channel)
        .accept_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Gzip)
        .max_decoding_message_size(config.max_message_bytes);

    Ok(match config.send_compression {
        Some(encoding) => client.send_compressed(encoding),
        None => client,
    })
}
