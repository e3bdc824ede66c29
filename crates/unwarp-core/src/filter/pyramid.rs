//! Multi-resolution volume pyramid for coarse-to-fine registration.

use super::downsample::DownsampleFilter;
use super::gaussian::GaussianFilter;
use crate::volume::Volume;
use burn::tensor::backend::Backend;

/// Multi-resolution pyramid.
///
/// One smoothed and shrunk volume per level, ordered coarsest to finest.
/// Smoothing sigmas are given in physical units and passed to
/// [`GaussianFilter`] unchanged.
pub struct VolumePyramid<B: Backend> {
    levels: Vec<Volume<B>>,
}

impl<B: Backend> VolumePyramid<B> {
    /// Build a pyramid from per-level shrink factors and smoothing sigmas.
    ///
    /// # Panics
    /// If the two schedules have different lengths.
    pub fn new(input: &Volume<B>, shrink_factors: &[usize], smoothing_sigmas: &[f64]) -> Self {
        assert_eq!(
            shrink_factors.len(),
            smoothing_sigmas.len(),
            "schedule lengths must match"
        );

        let mut levels = Vec::with_capacity(shrink_factors.len());
        for (&factor, &sigma) in shrink_factors.iter().zip(smoothing_sigmas.iter()) {
            if factor == 1 && sigma <= 1e-6 {
                levels.push(input.clone());
                continue;
            }

            let smoothed = if sigma > 1e-6 {
                GaussianFilter::new([sigma; 3]).apply(input)
            } else {
                input.clone()
            };

            let level = if factor > 1 {
                DownsampleFilter::uniform(factor).apply(&smoothed)
            } else {
                smoothed
            };
            levels.push(level);
        }

        Self { levels }
    }

    /// Volume at `level` (0 is the coarsest).
    pub fn level(&self, level: usize) -> &Volume<B> {
        &self.levels[level]
    }

    /// Number of levels.
    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }
}
