//! Rigid transform: rotation plus translation about a fixed center.

use super::trait_::Transform;
use burn::module::{Module, Param};
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};

// WGPU has a dispatch limit of 65535; chunk point batches to stay below it.
const CHUNK_SIZE: usize = 32768;

/// Rigid transform (3 Euler angles + 3 translations).
///
/// `T(x) = R(x - c) + c + t` with `R = R_z * R_y * R_x`. The six optimizable
/// parameters are stored in optimizer space and multiplied by per-parameter
/// scales before use, so a unit step on any parameter produces a comparable
/// physical shift. Zero parameters give the identity.
#[derive(Module, Debug)]
pub struct RigidTransform<B: Backend> {
    /// Optimizer-space parameters `[rx, ry, rz, tx, ty, tz]`.
    params: Param<Tensor<B, 1>>,
    /// Fixed center of rotation, `[3]`.
    center: Tensor<B, 1>,
    /// Per-parameter scales mapping optimizer space to physical space, `[6]`.
    scales: Tensor<B, 1>,
}

impl<B: Backend> RigidTransform<B> {
    /// Identity transform centered at `center`, with unit scales.
    pub fn identity(center: Tensor<B, 1>, device: &B::Device) -> Self {
        Self {
            params: Param::from_tensor(Tensor::zeros([6], device)),
            center,
            scales: Tensor::ones([6], device),
        }
    }

    /// Replace the parameter scales.
    ///
    /// `scales[i]` multiplies optimizer parameter `i` to obtain the physical
    /// angle or translation.
    pub fn with_scales(mut self, scales: Tensor<B, 1>) -> Self {
        self.scales = scales;
        self
    }

    /// Rebuild a transform from physical parameters, as stored by a cache.
    ///
    /// The resulting transform carries unit scales.
    pub fn from_physical_parameters(
        parameters: [f64; 6],
        center: [f64; 3],
        device: &B::Device,
    ) -> Self {
        let params: Vec<f32> = parameters.iter().map(|&p| p as f32).collect();
        let center: Vec<f32> = center.iter().map(|&c| c as f32).collect();
        Self {
            params: Param::from_tensor(Tensor::from_data(
                TensorData::new(params, burn::tensor::Shape::new([6])),
                device,
            )),
            center: Tensor::from_data(TensorData::new(center, burn::tensor::Shape::new([3])), device),
            scales: Tensor::ones([6], device),
        }
    }

    /// Physical parameters `[rx, ry, rz, tx, ty, tz]` (angles in radians).
    pub fn physical_parameters(&self) -> [f64; 6] {
        let scaled = self.params.val() * self.scales.clone();
        let values: Vec<f32> = scaled
            .into_data()
            .to_vec()
            .expect("parameter tensor is f32");
        let mut out = [0.0; 6];
        for (o, v) in out.iter_mut().zip(values) {
            *o = v as f64;
        }
        out
    }

    /// Center of rotation, `[3]`.
    pub fn center(&self) -> Tensor<B, 1> {
        self.center.clone()
    }

    /// Center of rotation as a plain array.
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

    /// Rotation matrix from the scaled Euler angles, `R = R_z * R_y * R_x`.
    fn build_rotation_matrix(&self) -> Tensor<B, 2> {
        let physical = self.params.val() * self.scales.clone();
        let alpha = physical.clone().slice([0..1]);
        let beta = physical.clone().slice([1..2]);
        let gamma = physical.slice([2..3]);

        let cx = alpha.clone().cos();
        let sx = alpha.sin();
        let cy = beta.clone().cos();
        let sy = beta.sin();
        let cz = gamma.clone().cos();
        let sz = gamma.sin();

        let r11 = cz.clone().mul(cy.clone());
        let r12 = cz
            .clone()
            .mul(sy.clone())
            .mul(sx.clone())
            .sub(sz.clone().mul(cx.clone()));
        let r13 = cz
            .clone()
            .mul(sy.clone())
            .mul(cx.clone())
            .add(sz.clone().mul(sx.clone()));

        let r21 = sz.clone().mul(cy.clone());
        let r22 = sz
            .clone()
            .mul(sy.clone())
            .mul(sx.clone())
            .add(cz.clone().mul(cx.clone()));
        let r23 = sz
            .clone()
            .mul(sy.clone())
            .mul(cx.clone())
            .sub(cz.clone().mul(sx.clone()));

        let r31 = sy.clone().neg();
        let r32 = cy.clone().mul(sx);
        let r33 = cy.mul(cx);

        let row1 = Tensor::cat(vec![r11, r12, r13], 0).reshape([1, 3]);
        let row2 = Tensor::cat(vec![r21, r22, r23], 0).reshape([1, 3]);
        let row3 = Tensor::cat(vec![r31, r32, r33], 0).reshape([1, 3]);

        Tensor::cat(vec![row1, row2, row3], 0)
    }

    fn translation(&self) -> Tensor<B, 1> {
        (self.params.val() * self.scales.clone()).slice([3..6])
    }
}

impl<B: Backend> Transform<B> for RigidTransform<B> {
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        // y = (x - c) @ R^T + c + t
        let [n_points, _] = points.dims();
        let r = self.build_rotation_matrix();
        let t = self.translation().reshape([1, 3]);
        let c = self.center.clone().reshape([1, 3]);

        if n_points <= CHUNK_SIZE {
            let centered = points - c.clone();
            centered.matmul(r.transpose()) + c + t
        } else {
            let mut chunks = Vec::new();
            let num_chunks = n_points.div_ceil(CHUNK_SIZE);
            for i in 0..num_chunks {
                let start = i * CHUNK_SIZE;
                let end = std::cmp::min(start + CHUNK_SIZE, n_points);
                let chunk = points.clone().slice([start..end]);
                let centered = chunk - c.clone();
                chunks.push(centered.matmul(r.clone().transpose()) + c.clone() + t.clone());
            }
            Tensor::cat(chunks, 0)
        }
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
        let center = Tensor::<TestBackend, 1>::zeros([3], &device);
        let transform = RigidTransform::identity(center, &device);

        let points = Tensor::<TestBackend, 2>::from_floats([[1.0, 2.0, 3.0]], &device);
        let out = transform.transform_points(points).into_data();
        let slice = out.as_slice::<f32>().unwrap();
        assert_eq!(slice, &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_pure_translation() {
        let device = Default::default();
        let transform = RigidTransform::<TestBackend>::from_physical_parameters(
            [0.0, 0.0, 0.0, 1.0, 2.0, 3.0],
            [0.0, 0.0, 0.0],
            &device,
        );

        let points =
            Tensor::<TestBackend, 2>::from_floats([[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]], &device);
        let out = transform.transform_points(points).into_data();
        let slice = out.as_slice::<f32>().unwrap();
        assert_eq!(&slice[..3], &[1.0, 2.0, 3.0]);
        assert_eq!(&slice[3..], &[2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_rotation_about_z() {
        let device = Default::default();
        // 90 degrees around z: (1, 0, 0) -> (0, 1, 0)
        let transform = RigidTransform::<TestBackend>::from_physical_parameters(
            [0.0, 0.0, std::f64::consts::FRAC_PI_2, 0.0, 0.0, 0.0],
            [0.0, 0.0, 0.0],
            &device,
        );

        let points = Tensor::<TestBackend, 2>::from_floats([[1.0, 0.0, 0.0]], &device);
        let out = transform.transform_points(points).into_data();
        let slice = out.as_slice::<f32>().unwrap();
        assert!((slice[0]).abs() < 1e-6);
        assert!((slice[1] - 1.0).abs() < 1e-6);
        assert!((slice[2]).abs() < 1e-6);
    }

    #[test]
    fn test_rotation_about_offset_center() {
        let device = Default::default();
        // 180 degrees around z centered at (1, 0, 0): origin -> (2, 0, 0)
        let transform = RigidTransform::<TestBackend>::from_physical_parameters(
            [0.0, 0.0, std::f64::consts::PI, 0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            &device,
        );

        let points = Tensor::<TestBackend, 2>::from_floats([[0.0, 0.0, 0.0]], &device);
        let out = transform.transform_points(points).into_data();
        let slice = out.as_slice::<f32>().unwrap();
        assert!((slice[0] - 2.0).abs() < 1e-5);
        assert!((slice[1]).abs() < 1e-5);
    }

    #[test]
    fn test_scales_map_optimizer_to_physical() {
        let device = Default::default();
        let center = Tensor::<TestBackend, 1>::zeros([3], &device);
        let scales =
            Tensor::<TestBackend, 1>::from_floats([0.5, 0.5, 0.5, 1.0, 1.0, 1.0], &device);
        let transform = RigidTransform::identity(center, &device).with_scales(scales);
        let physical = transform.physical_parameters();
        assert_eq!(physical, [0.0; 6]);
    }
}
