//! JSON fence request accepted by the `vds-fence` binary.
//!
//! ```json
//! {
//!   "vds": "https://account.blob.core.windows.net/container/survey.vds",
//!   "sas": "?sv=...",
//!   "coordinate_system": "ilxl",
//!   "interpolation": "linear",
//!   "coordinates": [[1961.0, 11.0], [1962.0, 12.0]],
//!   "samples": 850
//! }
//! ```
//!
//! `interpolation` is optional and defaults to `nearest`. `samples` stands in
//! for the cube shape normally supplied by the metadata service.

use serde::Deserialize;
use vds_fence_core::{
    Error, Result,
    types::{CoordinateSystem, CubeShape, Interpolation},
};

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FenceRequestBody {
    pub vds: String,
    pub sas: String,
    pub coordinate_system: String,
    #[serde(default)]
    pub interpolation: Option<String>,
    pub coordinates: Vec<[f32; 2]>,
    pub samples: usize,
}

impl FenceRequestBody {
    /// # Errors
    ///
    /// [`Error::InvalidRequest`] if `bytes` is not a valid request body.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::InvalidRequest {
            reason: e.to_string(),
        })
    }

    pub fn coordinate_system(&self) -> Result<CoordinateSystem> {
        self.coordinate_system.parse()
    }

    pub fn interpolation(&self) -> Result<Interpolation> {
        self.interpolation
            .as_deref()
            .map_or(Ok(Interpolation::default()), str::parse)
    }

    pub const fn shape(&self) -> CubeShape {
        CubeShape::new(self.samples)
    }
}
