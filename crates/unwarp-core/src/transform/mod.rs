//! Spatial transforms mapping physical points between volumes.

pub mod affine;
pub mod rigid;
pub mod trait_;

pub use affine::AffineTransform;
pub use rigid::RigidTransform;
pub use trait_::Transform;
