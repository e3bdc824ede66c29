//! Similarity metrics between fixed and moving volumes.

pub mod mutual_information;
pub mod trait_;

pub use mutual_information::MutualInformation;
pub use trait_::Metric;
