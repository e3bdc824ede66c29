//! Grid resampling to a new extent (zoom).

use crate::error::GeometryError;
use crate::interpolation::{Boundary, GridSampler, Interpolation};
use crate::volume::{DisplacementField, Volume};
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use rayon::prelude::*;

/// Grid resampler.
///
/// Changes the voxel extent of a volume with separable convolution (cubic by
/// default), scaling the spacing so physical extent is preserved:
/// `new_spacing = old * n_in / n_out` per axis. Input and output endpoints
/// are aligned, so the source index for output index `i` is
/// `i * (n_in - 1) / (n_out - 1)`. Origin and direction are unchanged.
/// Requesting the current extent returns the input as is.
pub struct GridResampler {
    boundary: Boundary,
    interpolation: Interpolation,
}

impl GridResampler {
    /// Create a cubic resampler with the given boundary policy.
    pub fn new(boundary: Boundary) -> Self {
        Self {
            boundary,
            interpolation: Interpolation::Cubic,
        }
    }

    /// Select another interpolation kernel.
    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    /// Resample `volume` to `target_extent`, given in `(x, y, z)` order.
    ///
    /// # Errors
    /// [`GeometryError::ZeroExtent`] if any target axis is 0.
    pub fn resample<B: Backend>(
        &self,
        volume: &Volume<B>,
        target_extent: [usize; 3],
    ) -> Result<Volume<B>, GeometryError> {
        if target_extent.iter().any(|&e| e == 0) {
            return Err(GeometryError::ZeroExtent([
                target_extent[2],
                target_extent[1],
                target_extent[0],
            ]));
        }
        let source_extent = volume.extent();
        if target_extent == source_extent {
            return Ok(volume.clone());
        }

        let [nx_in, ny_in, nz_in] = source_extent;
        let [nx_out, ny_out, nz_out] = target_extent;
        let device = volume.device();

        let source: Vec<f32> = volume
            .data()
            .clone()
            .into_data()
            .to_vec()
            .expect("volume data is f32");
        let sampler =
            GridSampler::new(&source, [nz_in, ny_in, nx_in], self.boundary, self.interpolation);

        let step = |n_in: usize, n_out: usize| -> f64 {
            if n_out > 1 {
                (n_in as f64 - 1.0) / (n_out as f64 - 1.0)
            } else {
                0.0
            }
        };
        let sx = step(nx_in, nx_out);
        let sy = step(ny_in, ny_out);
        let sz = step(nz_in, nz_out);

        let mut out = vec![0.0f32; nz_out * ny_out * nx_out];
        out.par_chunks_mut(ny_out * nx_out)
            .enumerate()
            .for_each(|(z, plane)| {
                let z_in = z as f64 * sz;
                for y in 0..ny_out {
                    let y_in = y as f64 * sy;
                    for x in 0..nx_out {
                        plane[y * nx_out + x] = sampler.sample(x as f64 * sx, y_in, z_in);
                    }
                }
            });

        let data = Tensor::<B, 3>::from_data(
            TensorData::new(out, burn::tensor::Shape::new([nz_out, ny_out, nx_out])),
            &device,
        );

        let spacing = volume.spacing();
        let mut new_spacing = *spacing;
        new_spacing[0] = spacing[0] * nx_in as f64 / nx_out as f64;
        new_spacing[1] = spacing[1] * ny_in as f64 / ny_out as f64;
        new_spacing[2] = spacing[2] * nz_in as f64 / nz_out as f64;

        Ok(Volume::from_parts(
            data,
            *volume.origin(),
            new_spacing,
            *volume.direction(),
        ))
    }

    /// Resample each component of `field` onto the grid of `reference`.
    ///
    /// The unit of the field is preserved; the result carries the reference
    /// geometry.
    pub fn resample_field<B: Backend>(
        &self,
        field: &DisplacementField<B>,
        reference: &Volume<B>,
    ) -> Result<DisplacementField<B>, GeometryError> {
        let target = reference.extent();
        let mut components = Vec::with_capacity(3);
        for axis in 0..3 {
            let component = field.component(axis)?;
            let resampled = self.resample(&component, target)?;
            components.push(resampled.into_data().unsqueeze_dim::<4>(3));
        }
        let data = Tensor::cat(components, 3);
        DisplacementField::new(
            data,
            *reference.origin(),
            *reference.spacing(),
            *reference.direction(),
            field.unit(),
        )
    }
}
