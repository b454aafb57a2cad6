use super::client::FenceClient;
use core::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tonic::Request;
use vds_fence_core::{
    Error,
    proto::{FenceRequest, FenceResponse},
};

/// Result of one dispatched part, as seen by the collecting loop.
#[derive(Debug)]
pub struct PartOutcome {
    pub part: usize,
    pub result: Result<FenceResponse, Error>,
}

/// Dispatch unit for a single part of a fence.
///
/// Sends `request` through `client`, bounded by `timeout`, and reports exactly
/// one [`PartOutcome`] on `outcomes`. If `cancel` fires first the in-flight
/// call is dropped and nothing is reported.
///
/// This function is designed to be spawned as a Tokio task, one per part.
///
/// # Arguments
///
/// - `client`: Handle used to reach the worker pool.
/// - `part`: Zero-based part index, echoed in the outcome.
/// - `request`: Fully built sub-request for this part.
/// - `timeout`: Deadline for this call alone. Siblings are unaffected.
/// - `cancel`: Fired by the coordinator once the fence has failed.
/// - `outcomes`: Collection point shared by all parts of the fence.
pub async fn dispatch_part<C: FenceClient>(
    client: C,
    part: usize,
    request: FenceRequest,
    timeout: Duration,
    cancel: CancellationToken,
    outcomes: mpsc::Sender<PartOutcome>,
) {
    #[cfg(feature = "tracing")]
    {
        if let Some(info) = &request.info {
            tracing::debug!(
                pid = %info.pid,
                part = info.part,
                parts = info.parts,
                coordinates = request.coordinates.len(),
                "sent request to worker"
            );
        }
    }

    let mut request = Request::new(request);
    // Let the worker know how long we are willing to wait.
    request.set_timeout(timeout);

    let call = tokio::time::timeout(timeout, client.fetch_part(request));

    let result = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            #[cfg(feature = "tracing")]
            tracing::debug!(part, "part cancelled, dropping in-flight call");
            return;
        }
        res = call => match res {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(status)) => Err(Error::from_status(part, &status)),
            Err(_elapsed) => Err(Error::Timeout { part, after: timeout }),
        },
    };

    // The channel holds one slot per part, so this never waits. It only fails
    // if the coordinator has already returned.
    if let Err(_e) = outcomes.send(PartOutcome { part, result }).await {
        #[cfg(feature = "tracing")]
        tracing::trace!(part, "coordinator gone, discarding outcome");
    }
}
