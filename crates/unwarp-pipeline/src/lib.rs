//! The distortion-correction pipeline.
//!
//! Sequences the correction stages over in-memory volumes: convert the field
//! map to physical displacements, optionally register it onto the anatomical
//! volume, upsample everything to a common target grid, assemble the
//! displacement field on the designated distortion axis, warp, and optionally
//! compose a second externally measured field. Every knob lives in
//! [`CorrectionConfig`]; file loading and saving stay outside this crate.

pub mod cache;
pub mod config;
pub mod error;
pub mod fieldmap;
pub mod pipeline;

pub use cache::TransformCache;
pub use config::{CorrectionConfig, RegistrationSettings};
pub use error::{PipelineError, Stage};
pub use fieldmap::FieldMapConverter;
pub use pipeline::{CorrectionOutput, CorrectionPipeline};
