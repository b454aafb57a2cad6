//! # Shared Fence Types and Constants
//!
//! Types shared by the scheduler and by worker implementations so that both
//! sides agree on payload sizing and on the integer codes sent over the wire.
//!
//! ## Overview
//!
//! - [`SAMPLE_SIZE`] - Size (in bytes) of one serialized sample
//! - [`CubeShape`] - Per-volume geometry used to size payloads
//! - [`CoordinateSystem`] - How fence coordinates are interpreted
//! - [`Interpolation`] - How samples between grid nodes are computed
//!
//! The integer codes of [`CoordinateSystem`] and [`Interpolation`] are part of
//! the wire contract. Reordering the variants breaks running workers.

use crate::Error;
use core::{fmt, str::FromStr};

/// The number of bytes used to serialize a single sample (`f32`).
pub const SAMPLE_SIZE: usize = core::mem::size_of::<f32>();

/// Volume geometry as reported by the metadata collaborator.
///
/// The scheduler only needs the number of samples per trace.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CubeShape {
    pub samples: usize,
}

impl CubeShape {
    pub const fn new(samples: usize) -> Self {
        Self { samples }
    }

    /// Bytes needed to hold one full trace, or `None` if that does not fit
    /// in a `usize`.
    pub const fn trace_bytes(&self) -> Option<usize> {
        self.samples.checked_mul(SAMPLE_SIZE)
    }
}

/// Coordinate system of the points in a fence.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CoordinateSystem {
    /// Zero-based grid indices (`ij`).
    Index,
    /// Inline/crossline annotation (`ilxl`).
    #[default]
    Annotation,
    /// World coordinates (`cdp`).
    Cdp,
}

impl CoordinateSystem {
    /// Wire code sent in `FenceRequest.coordinate_system`.
    pub const fn code(self) -> i32 {
        match self {
            Self::Index => 0,
            Self::Annotation => 1,
            Self::Cdp => 2,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Index => "ij",
            Self::Annotation => "ilxl",
            Self::Cdp => "cdp",
        }
    }
}

impl fmt::Display for CoordinateSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CoordinateSystem {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ij" => Ok(Self::Index),
            "ilxl" => Ok(Self::Annotation),
            "cdp" => Ok(Self::Cdp),
            other => Err(Error::InvalidRequest {
                reason: format!(
                    "coordinate system not recognized: '{other}', valid options are: ij, ilxl, cdp"
                ),
            }),
        }
    }
}

impl TryFrom<i32> for CoordinateSystem {
    type Error = Error;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Index),
            1 => Ok(Self::Annotation),
            2 => Ok(Self::Cdp),
            other => Err(Error::InvalidRequest {
                reason: format!("unknown coordinate system code {other}"),
            }),
        }
    }
}

/// Interpolation method used when a fence point falls between grid nodes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Interpolation {
    #[default]
    Nearest,
    Linear,
    Cubic,
    Angular,
    Triangular,
}

impl Interpolation {
    /// Wire code sent in `FenceRequest.interpolation`.
    pub const fn code(self) -> i32 {
        match self {
            Self::Nearest => 0,
            Self::Linear => 1,
            Self::Cubic => 2,
            Self::Angular => 3,
            Self::Triangular => 4,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Nearest => "nearest",
            Self::Linear => "linear",
            Self::Cubic => "cubic",
            Self::Angular => "angular",
            Self::Triangular => "triangular",
        }
    }
}

impl fmt::Display for Interpolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interpolation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nearest" => Ok(Self::Nearest),
            "linear" => Ok(Self::Linear),
            "cubic" => Ok(Self::Cubic),
            "angular" => Ok(Self::Angular),
            "triangular" => Ok(Self::Triangular),
            other => Err(Error::InvalidRequest {
                reason: format!(
                    "interpolation method not recognized: '{other}', valid options are: \
                     nearest, linear, cubic, angular, triangular"
                ),
            }),
        }
    }
}

impl TryFrom<i32> for Interpolation {
    type Error = Error;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Nearest),
            1 => Ok(Self::Linear),
            2 => Ok(Self::Cubic),
            3 => Ok(Self::Angular),
            4 => Ok(Self::Triangular),
            other => Err(Error::InvalidRequest {
                reason: format!("unknown interpolation code {other}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_bytes_uses_four_byte_samples() {
        assert_eq!(CubeShape::new(50).trace_bytes(), Some(200));
        assert_eq!(CubeShape::new(0).trace_bytes(), Some(0));
        assert_eq!(CubeShape::new(usize::MAX / 2).trace_bytes(), None);
        assert_eq!(CubeShape::new(1 << (usize::BITS - 2)).trace_bytes(), None);
    }

    #[test]
    fn coordinate_system_parses_case_insensitively() {
        assert_eq!("ILXL".parse::<CoordinateSystem>().unwrap(), CoordinateSystem::Annotation);
        assert_eq!("ij".parse::<CoordinateSystem>().unwrap(), CoordinateSystem::Index);
        assert_eq!("Cdp".parse::<CoordinateSystem>().unwrap(), CoordinateSystem::Cdp);
        assert!(matches!(
            "utm".parse::<CoordinateSystem>(),
            Err(Error::InvalidRequest { .. })
        ));
    }

    #[test]
    fn wire_codes_are_stable() {
        for sys in [
            CoordinateSystem::Index,
            CoordinateSystem::Annotation,
            CoordinateSystem::Cdp,
        ] {
            assert_eq!(CoordinateSystem::try_from(sys.code()).unwrap(), sys);
        }
        for method in [
            Interpolation::Nearest,
            Interpolation::Linear,
            Interpolation::Cubic,
            Interpolation::Angular,
            Interpolation::Triangular,
        ] {
            assert_eq!(Interpolation::try_from(method.code()).unwrap(), method);
            assert_eq!(method.as_str().parse::<Interpolation>().unwrap(), method);
        }
        assert!(Interpolation::try_from(5).is_err());
    }
}
