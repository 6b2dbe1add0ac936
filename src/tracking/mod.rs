//! Tracking module
//!
//! From raw face landmarks to placement anchors:
//! - `landmarks`: point types and the face mesh topology
//! - `anchors`: ear, nose and head rotation resolution
//! - `detector`: the landmark model contract
//! - `subprocess`: face mesh helper process implementing that contract

pub mod anchors;
pub mod detector;
pub mod landmarks;
pub mod subprocess;

pub use anchors::{AnchorFrame, HeadRotation};
pub use detector::{DetectorSettings, LandmarkDetector};
pub use landmarks::{topology, Point3D, RawLandmarkSet};
pub use subprocess::FaceMeshProcess;
