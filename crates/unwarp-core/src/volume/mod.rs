//! Volume and displacement-field containers.

pub mod field;
pub mod volume;

pub use field::{DisplacementField, FieldUnit};
pub use volume::Volume;
