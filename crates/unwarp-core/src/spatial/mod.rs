//! Spatial types: points, vectors, spacing and direction matrices.
//!
//! Thin wrappers around nalgebra types, fixed to `f64` and dimension `D`.
//! Index vectors throughout the crate are ordered `(x, y, z)`, i.e. fastest
//! varying tensor axis first, so `spacing[0]` is the physical step along the
//! last tensor axis.

pub mod direction;
pub mod point;
pub mod spacing;
pub mod vector;

pub use direction::Direction;
pub use point::Point;
pub use spacing::Spacing;
pub use vector::Vector;

pub type Point3 = Point<3>;
pub type Vector3 = Vector<3>;
pub type Spacing3 = Spacing<3>;
pub type Direction3 = Direction<3>;
