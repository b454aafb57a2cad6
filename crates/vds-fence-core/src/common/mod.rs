//! Shared wire contract, error taxonomy and types used by the scheduler and
//! by worker implementations.
//!
//! ## Submodules
//!
//! - [`error`] - Unified error type for connection resolution and fan-out.
//! - [`types`] - Cube geometry, coordinate systems and interpolation codes.
//! - [`proto`] - Generated `oneseismic` messages and gRPC client/server.

pub mod error;
pub mod types;

pub use error::{Error, Result};

/// Generated from `proto/oneseismic.proto`.
///
/// ## Service
///
/// - `GetFence` - extract the traces along one part of a fence.
///
/// ## Invariants
///
/// - `FenceResponse.fence.len() == coordinates.len() * samples * SAMPLE_SIZE`
/// - `FenceResponse.info` echoes the `FenceRequest.info` it answers
pub mod proto {
    tonic::include_proto!("oneseismic");
}
