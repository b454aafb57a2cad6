//! Fan-out/fan-in scheduling of fence requests.
//!
//! The scheduler splits one fence into parts, sends each part to the worker
//! pool as an independent `GetFence` call and stitches the answers back into
//! a single buffer. How the request was distributed is invisible to the
//! caller: it gets either the complete buffer or exactly one error.
//!
//! ## Life of a fence
//!
//! 1. A fresh request id (`pid`) is generated for log correlation.
//! 2. The coordinates are split by the configured [`PartitionPolicy`].
//! 3. Every part is spawned as its own task ([`dispatch::dispatch_part`]),
//!    bounded by the per-call timeout.
//! 4. Outcomes are collected in completion order. Each payload is copied to
//!    `part * per_part * trace_bytes`; parts never overlap because only the
//!    last part can be shorter than `per_part`.
//! 5. The first failure ends the fence. Remaining parts are cancelled and
//!    their results are never looked at.
//!
//! ## Structure
//!
//! - [`client`] - the [`FenceClient`] seam and the tonic implementation.
//! - [`dispatch`] - the per-part dispatch task.

pub mod client;
pub mod dispatch;


use crate::{
    config::FenceConfig,
    connection::Connection,
    partition::{Chunk, PartitionPolicy},
    telemetry::{
        increment_fence_errors, increment_fences, increment_parts_dispatched,
        record_fence_duration, record_traces_per_fence,
    },
};
use bytes::{Bytes, BytesMut};
use client::FenceClient;
use core::{fmt, time::Duration};
use dispatch::dispatch_part;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use vds_fence_core::{
    Error, Result,
    proto::{self, Coordinate, FenceRequest, FenceResponse, Info},
    types::{CoordinateSystem, CubeShape, Interpolation},
};

/// Per-call timeout used when none is configured.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Generates the id shared by all parts of one logical request.
pub fn make_pid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// A single logical fence request.
#[derive(Clone)]
pub struct FenceQuery<'a> {
    /// Canonical volume url, see [`Connection::url`].
    pub url: String,
    /// Sanitized storage credential.
    pub credential: String,
    pub interpolation: Interpolation,
    pub coordinate_system: CoordinateSystem,
    /// Ordered `(x, y)` points in `coordinate_system`.
    pub coordinates: &'a [[f32; 2]],
    pub shape: CubeShape,
}

impl<'a> FenceQuery<'a> {
    pub fn new(
        connection: &Connection,
        coordinate_system: CoordinateSystem,
        coordinates: &'a [[f32; 2]],
        shape: CubeShape,
    ) -> Self {
        Self {
            url: connection.url(),
            credential: connection.credential().to_string(),
            interpolation: Interpolation::default(),
            coordinate_system,
            coordinates,
            shape,
        }
    }

    #[must_use]
    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }
}

impl fmt::Debug for FenceQuery<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FenceQuery")
            .field("url", &self.url)
            .field("credential", &"<redacted>")
            .field("interpolation", &self.interpolation)
            .field("coordinate_system", &self.coordinate_system)
            .field("coordinates", &self.coordinates.len())
            .field("shape", &self.shape)
            .finish()
    }
}

/// Fan-out/fan-in coordinator for fence requests.
///
/// Holds only the client handle and immutable settings, so one instance (or
/// cheap clones of it) can serve any number of concurrent fences.
#[derive(Clone, Debug)]
pub struct Scheduler<C> {
    client: C,
    policy: PartitionPolicy,
    timeout: Duration,
}

impl<C: FenceClient> Scheduler<C> {
    pub const fn new(client: C, policy: PartitionPolicy) -> Self {
        Self {
            client,
            policy,
            timeout: DEFAULT_RPC_TIMEOUT,
        }
    }

    pub fn from_config(client: C, config: &FenceConfig) -> Self {
        Self::new(client, config.policy).with_timeout(config.rpc_timeout)
    }

    /// Overrides the per-part RPC timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub const fn policy(&self) -> PartitionPolicy {
        self.policy
    }

    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Extracts the traces along `query.coordinates`.
    ///
    /// Returns `coordinates * samples * 4` bytes, trace by trace in the order
    /// of the input coordinates.
    ///
    /// # Errors
    ///
    /// The first [`Error::Transport`], [`Error::Timeout`] or
    /// [`Error::WorkerFault`] reported by any part, unchanged. No partial
    /// buffer is ever returned.
    /// [`Error::InvalidRequest`] if the output buffer size overflows `usize`;
    /// nothing is dispatched in that case.
    pub async fn fence(&self, query: &FenceQuery<'_>) -> Result<Bytes> {
        let pid = make_pid();
        let start = std::time::Instant::now();

        increment_fences();
        record_traces_per_fence(query.coordinates.len() as f64);

        let result = self.fence_with_pid(&pid, query).await;
        match &result {
            Ok(_) => record_fence_duration(start.elapsed().as_secs_f64() * 1000.0),
            Err(e) => {
                increment_fence_errors(e);
                #[cfg(feature = "tracing")]
                tracing::warn!(%pid, kind = e.kind(), error = %e, "fence failed");
            }
        }
        result
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "fence",
            skip_all,
            fields(pid = %pid, traces = query.coordinates.len())
        )
    )]
    async fn fence_with_pid(&self, pid: &str, query: &FenceQuery<'_>) -> Result<Bytes> {
        let too_large = || Error::InvalidRequest {
            reason: format!(
                "{} traces of {} samples do not fit in memory",
                query.coordinates.len(),
                query.shape.samples
            ),
        };
        let trace_bytes = query.shape.trace_bytes().ok_or_else(too_large)?;
        let total = query
            .coordinates
            .len()
            .checked_mul(trace_bytes)
            .ok_or_else(too_large)?;

        let partition = self.policy.split(query.coordinates);
        let Some(max_index) = partition.max_index() else {
            return Ok(Bytes::new());
        };
        let declared_parts = i32::try_from(max_index).map_err(|_| Error::InvalidRequest {
            reason: format!("{} parts exceed the wire limit", partition.len()),
        })?;
        let parts = partition.len();

        // Fired when this function returns for any reason, including being
        // dropped mid-collection. Parts still in flight then stop.
        let cancel = CancellationToken::new();
        let _cancel_remaining = cancel.clone().drop_guard();

        let (outcome_tx, mut outcome_rx) = mpsc::channel(parts);
        let mut expected_len = Vec::with_capacity(parts);

        for chunk in partition.chunks() {
            expected_len.push(chunk.len() * trace_bytes);
            let request = part_request(pid, chunk, declared_parts, query);
            tokio::spawn(dispatch_part(
                self.client.clone(),
                chunk.index,
                request,
                self.timeout,
                cancel.clone(),
                outcome_tx.clone(),
            ));
        }
        drop(outcome_tx);
        increment_parts_dispatched(parts as u64);

        let mut out = BytesMut::zeroed(total);
        for _ in 0..parts {
            let outcome = outcome_rx.recv().await.ok_or_else(|| Error::ChannelError {
                context: "dispatch task exited without reporting".to_string(),
            })?;
            let part = outcome.part;
            let payload = check_response(pid, part, expected_len[part], outcome.result?)?;

            #[cfg(feature = "tracing")]
            tracing::debug!(pid, part, parts = declared_parts, "collecting response from worker");

            let offset = partition.byte_offset(part, trace_bytes);
            out[offset..offset + payload.len()].copy_from_slice(&payload);
        }

        Ok(out.freeze())
    }
}

fn part_request(
    pid: &str,
    chunk: &Chunk<'_, [f32; 2]>,
    declared_parts: i32,
    query: &FenceQuery<'_>,
) -> FenceRequest {
    FenceRequest {
        info: Some(Info {
            pid: pid.to_string(),
            // Bounded by `declared_parts`, which fits in an i32.
            part: chunk.index as i32,
            parts: declared_parts,
        }),
        connection: Some(proto::Connection {
            url: query.url.clone(),
            credential: query.credential.clone(),
        }),
        coordinate_system: query.coordinate_system.code(),
        interpolation: query.interpolation.code(),
        coordinates: chunk
            .items
            .iter()
            .map(|&[x, y]| Coordinate { x, y })
            .collect(),
    }
}

/// Verifies that `response` answers `part` of `pid` and carries exactly the
/// expected number of bytes, so it cannot spill into a neighbouring part.
fn check_response(
    pid: &str,
    part: usize,
    expected_len: usize,
    response: FenceResponse,
) -> Result<Bytes> {
    let info = response.info.ok_or_else(|| Error::WorkerFault {
        part,
        reason: "response carries no part info".to_string(),
    })?;

    if info.pid != pid || usize::try_from(info.part).ok() != Some(part) {
        return Err(Error::WorkerFault {
            part,
            reason: format!(
                "response for {}/{} does not match request {pid}/{part}",
                info.pid, info.part
            ),
        });
    }

    if response.fence.len() != expected_len {
        return Err(Error::WorkerFault {
            part,
            reason: format!(
                "expected {expected_len} bytes, got {}",
                response.fence.len()
            ),
        });
    }

    Ok(response.fence)
}
