//! Raw face landmark types and the face mesh topology

use serde::{Deserialize, Serialize};

use crate::error::DetectorError;

/// A normalized image-space point.
///
/// `x` and `y` are relative to the frame (0.0 to 1.0); `z` is relative depth
/// in the detector's own scale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point3D {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point3D {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Componentwise mean of two points
    pub fn midpoint(a: Point3D, b: Point3D) -> Point3D {
        Point3D {
            x: (a.x + b.x) / 2.0,
            y: (a.y + b.y) / 2.0,
            z: (a.z + b.z) / 2.0,
        }
    }
}

impl From<[f32; 3]> for Point3D {
    fn from([x, y, z]: [f32; 3]) -> Self {
        Self { x, y, z }
    }
}

/// Landmark indices of the face mesh topology used for jewelry placement.
pub mod topology {
    pub const LEFT_EAR_TOP: usize = 234;
    pub const LEFT_EAR_BOTTOM: usize = 454;
    pub const RIGHT_EAR_TOP: usize = 127;
    pub const RIGHT_EAR_BOTTOM: usize = 356;

    pub const NOSE_TIP: usize = 4;
    pub const CHIN: usize = 152;
    pub const FOREHEAD: usize = 10;
    pub const LEFT_EYE: usize = 33;
    pub const RIGHT_EYE: usize = 263;

    /// Points in a full mesh with refined iris landmarks
    pub const MESH_SIZE: usize = 478;

    /// Smallest set that covers every index above
    pub const REQUIRED_POINTS: usize = LEFT_EAR_BOTTOM + 1;
}

/// Ordered landmark points for one detected face in one frame.
///
/// Construction checks the set covers every [`topology`] index, so
/// positional access by those constants cannot go out of bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct RawLandmarkSet {
    points: Vec<Point3D>,
}

impl RawLandmarkSet {
    pub fn new(points: Vec<Point3D>) -> Result<Self, DetectorError> {
        if points.len() < topology::REQUIRED_POINTS {
            return Err(DetectorError::TooFewLandmarks {
                expected: topology::REQUIRED_POINTS,
                actual: points.len(),
            });
        }
        Ok(Self { points })
    }

    /// Point at a topology index
    pub fn point(&self, index: usize) -> Point3D {
        self.points[index]
    }

    pub fn points(&self) -> &[Point3D] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
