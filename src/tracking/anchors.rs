//! Anchor resolution
//!
//! Turns a raw landmark set into the placement anchors the client needs:
//! ear positions averaged over a top/bottom pair, the nose tip, and a head
//! rotation estimate. Everything here is pure; the same input always yields
//! bit-identical output.

use serde::{Deserialize, Serialize};

use super::landmarks::{topology, Point3D, RawLandmarkSet};

/// Head rotation in radians
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HeadRotation {
    /// Positive when the head tilts back
    pub pitch: f32,
    /// Linear proxy, not an angle; see [`resolve_rotation`]
    pub yaw: f32,
    /// Positive when the head tilts toward the right eye
    pub roll: f32,
}

/// Resolved anchors for one camera frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnchorFrame {
    pub left_ear: Point3D,
    pub right_ear: Point3D,
    pub nose_tip: Point3D,
    #[serde(rename = "face_rotation")]
    pub rotation: HeadRotation,
    #[serde(skip)]
    pub face_detected: bool,
}

/// Sensitivity applied to the nose offset from the eye center.
pub const YAW_SCALE: f32 = 2.0;

/// Componentwise mean of the landmarks at `top` and `bottom`.
pub fn resolve_ear(points: &RawLandmarkSet, top: usize, bottom: usize) -> Point3D {
    Point3D::midpoint(points.point(top), points.point(bottom))
}

/// Estimate head rotation from five named landmarks.
///
/// Yaw is the horizontal nose offset from the eye center scaled by
/// [`YAW_SCALE`]. Clients are calibrated against this value, so it must stay
/// a linear proxy.
pub fn resolve_rotation(
    points: &RawLandmarkSet,
    nose: usize,
    chin: usize,
    forehead: usize,
    left_eye: usize,
    right_eye: usize,
) -> HeadRotation {
    let nose = points.point(nose);
    let chin = points.point(chin);
    let forehead = points.point(forehead);
    let left_eye = points.point(left_eye);
    let right_eye = points.point(right_eye);

    let pitch = (forehead.y - chin.y).atan2(forehead.z - chin.z);

    let eye_center_x = (left_eye.x + right_eye.x) / 2.0;
    let yaw = (nose.x - eye_center_x) * YAW_SCALE;

    let roll = (right_eye.y - left_eye.y).atan2(right_eye.x - left_eye.x);

    HeadRotation { pitch, yaw, roll }
}

/// Resolve every anchor using the face mesh topology.
pub fn resolve(points: &RawLandmarkSet) -> AnchorFrame {
    AnchorFrame {
        left_ear: resolve_ear(points, topology::LEFT_EAR_TOP, topology::LEFT_EAR_BOTTOM),
        right_ear: resolve_ear(points, topology::RIGHT_EAR_TOP, topology::RIGHT_EAR_BOTTOM),
        nose_tip: points.point(topology::NOSE_TIP),
        rotation: resolve_rotation(
            points,
            topology::NOSE_TIP,
            topology::CHIN,
            topology::FOREHEAD,
            topology::LEFT_EYE,
            topology::RIGHT_EYE,
        ),
        face_detected: true,
    }
}
