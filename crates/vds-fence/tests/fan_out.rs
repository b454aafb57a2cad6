//! End-to-end fan-out over real gRPC: an in-process tonic worker on an
//! ephemeral port, reached through `client::connect`.

use core::num::NonZeroUsize;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::{Request, Response, Status, codec::CompressionEncoding, transport::Server};
use vds_fence::{
    ConnectionResolver, FenceQuery, Scheduler,
    config::FenceConfig,
    connection::{Allowlist, StorageProtocol},
    partition::PartitionPolicy,
    vds_fence_core::{
        Error,
        proto::{
            FenceRequest, FenceResponse,
            oneseismic_server::{Oneseismic, OneseismicServer},
        },
        types::{CoordinateSystem, CubeShape},
    },
};

const ACCOUNT: &str = "https://foo.blob.core.windows.net";
const VOLUME: &str = "https://foo.blob.core.windows.net/container/sub/file.vds";

/// Answers every part with samples derived from its coordinates.
struct FakeWorker {
    samples: usize,
    fail_part: Option<i32>,
}

#[tonic::async_trait]
impl Oneseismic for FakeWorker {
    async fn get_fence(
        &self,
        request: Request<FenceRequest>,
    ) -> Result<Response<FenceResponse>, Status> {
        let request = request.into_inner();
        let info = request
            .info
            .ok_or_else(|| Status::invalid_argument("missing info"))?;

        if Some(info.part) == self.fail_part {
            return Err(Status::not_found("blob not found"));
        }

        let coords: Vec<[f32; 2]> = request.coordinates.iter().map(|c| [c.x, c.y]).collect();
        Ok(Response::new(FenceResponse {
            info: Some(info),
            fence: traces(&coords, self.samples).into(),
        }))
    }
}

fn traces(coords: &[[f32; 2]], samples: usize) -> Vec<u8> {
    coords
        .iter()
        .flat_map(|&[x, y]| (0..samples).map(move |s| x * 100.0 - y + s as f32 * 0.25))
        .flat_map(f32::to_le_bytes)
        .collect()
}

async fn spawn_worker(server: OneseismicServer<FakeWorker>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(
        Server::builder()
            .add_service(server)
            .serve_with_incoming(TcpListenerStream::new(listener)),
    );
    addr
}

fn config(addr: SocketAddr, parts: usize) -> FenceConfig {
    FenceConfig {
        allowlist: Allowlist::new([ACCOUNT]).unwrap(),
        protocol: StorageProtocol::Azure,
        storage_root: String::new(),
        worker_addr: format!("http://{addr}"),
        policy: PartitionPolicy::Fixed(NonZeroUsize::new(parts).unwrap()),
        rpc_timeout: Duration::from_secs(30),
        max_message_bytes: 64 * 1024 * 1024,
        send_compression: None,
    }
}

async fn run_fence(
    config: &FenceConfig,
    coords: &[[f32; 2]],
    samples: usize,
) -> Result<bytes::Bytes, Error> {
    let resolver = ConnectionResolver::new(config.allowlist.clone());
    let connection = resolver
        .resolve(config.protocol, &config.storage_root, VOLUME, "?abc")
        .unwrap();

    let client = vds_fence::scheduler::client::connect(config).await.unwrap();
    let scheduler = Scheduler::from_config(client, config);
    let query = FenceQuery::new(
        &connection,
        CoordinateSystem::Annotation,
        coords,
        CubeShape::new(samples),
    );
    scheduler.fence(&query).await
}

fn coords(n: usize) -> Vec<[f32; 2]> {
    (0..n).map(|i| [1000.0 + i as f32, 2000.0 - i as f32]).collect()
}

#[tokio::test]
async fn stitches_parts_over_grpc() {
    let addr = spawn_worker(OneseismicServer::new(FakeWorker {
        samples: 50,
        fail_part: None,
    }))
    .await;
    let coords = coords(10);

    let data = run_fence(&config(addr, 4), &coords, 50).await.unwrap();

    assert_eq!(data.len(), 2000);
    assert_eq!(&data[..], traces(&coords, 50).as_slice());
}

#[tokio::test]
async fn worker_status_fails_the_fence() {
    let addr = spawn_worker(OneseismicServer::new(FakeWorker {
        samples: 8,
        fail_part: Some(2),
    }))
    .await;

    let err = run_fence(&config(addr, 4), &coords(16), 8)
        .await
        .unwrap_err();

    match err {
        Error::WorkerFault { part, reason } => {
            assert_eq!(part, 2);
            assert!(reason.contains("blob not found"), "{reason}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn large_parts_exceed_default_message_limit() {
    let addr = spawn_worker(OneseismicServer::new(FakeWorker {
        samples: 2000,
        fail_part: None,
    }))
    .await;
    // One 6.4 MB part, above tonic's 4 MB default decoding limit.
    let coords = coords(800);

    let data = run_fence(&config(addr, 1), &coords, 2000).await.unwrap();

    assert_eq!(data.len(), 800 * 2000 * 4);
    assert_eq!(&data[..], traces(&coords, 2000).as_slice());
}

#[tokio::test]
async fn compressed_requests_reach_workers_that_accept_them() {
    let server = OneseismicServer::new(FakeWorker {
        samples: 16,
        fail_part: None,
    })
    .accept_compressed(CompressionEncoding::Zstd)
    .send_compressed(CompressionEncoding::Zstd);
    let addr = spawn_worker(server).await;

    let mut config = config(addr, 3);
    config.send_compression = Some(CompressionEncoding::Zstd);
    let coords = coords(31);

    let data = run_fence(&config, &coords, 16).await.unwrap();

    assert_eq!(&data[..], traces(&coords, 16).as_slice());
}

#[tokio::test]
async fn unreachable_workers_are_a_transport_error() {
    // Bind and immediately drop to get a port nobody listens on.
    let addr = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap()
        .local_addr()
        .unwrap();
    let config = config(addr, 2);

    assert!(vds_fence::scheduler::client::connect(&config).await.is_err());
}
