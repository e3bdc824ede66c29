//! Core data model and resampling machinery for B0 distortion correction.
//!
//! Volumes are `[Z, Y, X]` tensors with physical geometry (origin, spacing,
//! direction); displacement fields carry one 3-vector per voxel. Filters in
//! this crate never mutate their inputs: every transformation produces a new
//! volume or field.

pub mod error;
pub mod filter;
pub mod interpolation;
pub mod spatial;
pub mod transform;
pub mod volume;

pub use error::GeometryError;
pub use spatial::{Direction, Direction3, Point, Point3, Spacing, Spacing3, Vector, Vector3};
pub use volume::{DisplacementField, FieldUnit, Volume};
