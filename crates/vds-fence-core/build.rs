/// Builds the gRPC client and server code for `oneseismic.proto` using
/// `tonic-prost-build`.
///
/// # Byte Field Optimization
///
/// The `fence` field in the `FenceResponse` message is explicitly marked with
/// `.bytes(...)` so it is decoded as `Bytes` (from the `bytes` crate) instead
/// of `Vec<u8>`. Part payloads can be tens of megabytes and are copied exactly
/// once, into the scheduler's output buffer.
///
/// # Files and Paths
///
/// - Proto file: `proto/oneseismic.proto`
/// - Includes: `proto/`
///
/// # Output
///
/// ```rust,ignore
/// pub mod proto {
///     tonic::include_proto!("oneseismic");
/// }
/// ```
fn main() {
    let mut config = tonic_prost_build::Config::new();

    // Decode part payloads as `Bytes`, not `Vec<u8>`
    config.bytes([".oneseismic.FenceResponse.fence"]);

    tonic_prost_build::configure()
        .compile_with_config(config, &["proto/oneseismic.proto"], &["proto"])
        .unwrap();
}
