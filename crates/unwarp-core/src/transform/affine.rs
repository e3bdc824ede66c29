//! Affine transform: full linear map plus translation about a fixed center.

use super::trait_::Transform;
use burn::module::{Module, Param};
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};

/// Affine transform (9 matrix offsets + 3 translations).
///
/// `T(x) = A(x - c) + c + t` with `A = I + M`, where `M` is the row-major
/// reshape of the first nine scaled parameters. Zero parameters give the
/// identity, matching [`super::RigidTransform`], so both transforms start
/// optimization from the same point.
#[derive(Module, Debug)]
pub struct AffineTransform<B: Backend> {
    /// Optimizer-space parameters: matrix offsets `[0..9]`, translation `[9..12]`.
    params: Param<Tensor<B, 1>>,
    /// Fixed center, `[3]`.
    center: Tensor<B, 1>,
    /// Per-parameter scales mapping optimizer space to physical space, `[12]`.
    scales: Tensor<B, 1>,
}

impl<B: Backend> AffineTransform<B> {
    /// Identity transform centered at `center`, with unit scales.
    pub fn identity(center: Tensor<B, 1>, device: &B::Device) -> Self {
        Self {
            params: Param::from_tensor(Tensor::zeros([12], device)),
            center,
            scales: Tensor::ones([12], device),
        }
    }

    /// Replace the parameter scales.
    pub fn with_scales(mut self, scales: Tensor<B, 1>) -> Self {
        self.scales = scales;
        self
    }

    /// Rebuild a transform from physical parameters (matrix offsets from the
    /// identity, then translations), as stored by a cache.
    pub fn from_physical_parameters(
        parameters: [f64; 12],
        center: [f64; 3],
        device: &B::Device,
    ) -> Self {
        let params: Vec<f32> = parameters.iter().map(|&p| p as f32).collect();
        let center: Vec<f32> = center.iter().map(|&c| c as f32).collect();
        Self {
            params: Param::from_tensor(Tensor::from_data(
                TensorData::new(params, burn::tensor::Shape::new([12])),
                device,
            )),
            center: Tensor::from_data(TensorData::new(center, burn::tensor::Shape::new([3])), device),
            scales: Tensor::ones([12], device),
        }
    }

    /// Physical parameters: matrix offsets `[0..9]`, translations `[9..12]`.
    pub fn physical_parameters(&self) -> [f64; 12] {
        let scaled = self.params.val() * self.scales.clone();
        let values: Vec<f32> = scaled
            .into_data()
            .to_vec()
            .expect("parameter tensor is f32");
        let mut out = [0.0; 12];
        for (o, v) in out.iter_mut().zip(values) {
            *o = v as f64;
        }
        out
    }

    /// Center as a plain array.
    pub fn center_array(&self) -> [f64; 3] {
        let values: Vec<f32> = self
            .center
            .clone()
            .into_data()
            .to_vec()
            .expect("center tensor is f32");
        let mut out = [0.0; 3];
        for (o, v) in out.iter_mut().zip(values) {
            *o = v as f64;
        }
        out
    }

    /// `A = I + M` from the scaled matrix offsets.
    fn build_matrix(&self) -> Tensor<B, 2> {
        let physical = self.params.val() * self.scales.clone();
        let offsets = physical.slice([0..9]).reshape([3, 3]);
        let eye = Tensor::eye(3, &offsets.device());
        eye + offsets
    }

    fn translation(&self) -> Tensor<B, 1> {
        (self.params.val() * self.scales.clone()).slice([9..12])
    }
}

impl<B: Backend> Transform<B> for AffineTransform<B> {
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        // y = (x - c) @ A^T + c + t
        let a = self.build_matrix();
        let t = self.translation().reshape([1, 3]);
        let c = self.center.clone().reshape([1, 3]);

        let centered = points - c.clone();
        centered.matmul(a.transpose()) + c + t
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_identity_leaves_points_unchanged() {
        let device = Default::default();
        let center = Tensor::<TestBackend, 1>::from_floats([5.0, 5.0, 5.0], &device);
        let transform = AffineTransform::identity(center, &device);

        let points = Tensor::<TestBackend, 2>::from_floats([[1.0, 2.0, 3.0]], &device);
        let out = transform.transform_points(points).into_data();
        assert_eq!(out.as_slice::<f32>().unwrap(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_uniform_scaling_about_center() {
        let device = Default::default();
        // A = 2I (offsets put 1.0 on the diagonal), centered at origin.
        let transform = AffineTransform::<TestBackend>::from_physical_parameters(
            [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0],
            [0.0, 0.0, 0.0],
            &device,
        );

        let points = Tensor::<TestBackend, 2>::from_floats([[1.0, 2.0, 3.0]], &device);
        let out = transform.transform_points(points).into_data();
        assert_eq!(out.as_slice::<f32>().unwrap(), &[2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_translation_component() {
        let device = Default::default();
        let transform = AffineTransform::<TestBackend>::from_physical_parameters(
            [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, -1.0, 0.5, 2.0],
            [0.0, 0.0, 0.0],
            &device,
        );

        let points = Tensor::<TestBackend, 2>::from_floats([[0.0, 0.0, 0.0]], &device);
        let out = transform.transform_points(points).into_data();
        assert_eq!(out.as_slice::<f32>().unwrap(), &[-1.0, 0.5, 2.0]);
    }
}
