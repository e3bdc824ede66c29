//! Volume filters: smoothing, resolution changes, warping, composition.

pub mod compose;
pub mod downsample;
pub mod gaussian;
pub mod pyramid;
pub mod resample;
pub mod warp;
pub mod zoom;

pub use compose::{CompositionStrategy, FieldComposer};
pub use downsample::DownsampleFilter;
pub use gaussian::GaussianFilter;
pub use pyramid::VolumePyramid;
pub use resample::ResampleFilter;
pub use warp::Warper;
pub use zoom::GridResampler;
