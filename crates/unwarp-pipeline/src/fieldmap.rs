//! Field-map intensity to physical displacement.

use crate::error::{PipelineError, Result};
use burn::tensor::backend::Backend;
use unwarp_core::{DisplacementField, FieldUnit, GeometryError, Volume};

/// Converts raw field-map samples into millimetre displacements.
///
/// The conversion is `value / (G * K)` with `G` the scanner gradient factor
/// (a percentage expressed as a fraction) and `K` the gradient calibration
/// constant. Both are scanner and sequence specific, so they are always
/// supplied by the caller. The operation is elementwise and linear.
#[derive(Debug, Clone, Copy)]
pub struct FieldMapConverter {
    scale: f64,
}

impl FieldMapConverter {
    /// Create a converter from the two calibration constants.
    ///
    /// # Errors
    /// [`PipelineError::InvalidConfiguration`] when `G * K` is zero or not
    /// finite; a zero denominator is a configuration mistake, never a value
    /// to divide by.
    pub fn new(gradient_percent: f64, gradient_calibration: f64) -> Result<Self> {
        let denominator = gradient_percent * gradient_calibration;
        if denominator == 0.0 || !denominator.is_finite() {
            return Err(PipelineError::invalid_configuration(format!(
                "gradient calibration product must be finite and nonzero, got {gradient_percent} * {gradient_calibration}"
            )));
        }
        Ok(Self {
            scale: 1.0 / denominator,
        })
    }

    /// Convert a single sample to millimetres.
    pub fn convert_value(&self, value: f64) -> f64 {
        value * self.scale
    }

    /// Convert every sample of a field-map volume, preserving its geometry.
    pub fn convert<B: Backend>(&self, field_map: &Volume<B>) -> Volume<B> {
        let scaled = field_map.data().clone().mul_scalar(self.scale as f32);
        field_map
            .with_data(scaled)
            .expect("elementwise scaling preserves shape")
    }

    /// Convert a field map and place the result on one distortion axis of a
    /// millimetre displacement field; the other two components are zero.
    ///
    /// # Errors
    /// [`GeometryError::AxisOutOfRange`] if `axis >= 3`.
    pub fn convert_to_field<B: Backend>(
        &self,
        field_map: &Volume<B>,
        axis: usize,
    ) -> std::result::Result<DisplacementField<B>, GeometryError> {
        let shift = self.convert(field_map);
        DisplacementField::from_scalar_axis(&shift, axis, FieldUnit::Millimeters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::{Shape, Tensor, TensorData};
    use burn_ndarray::NdArray;
    use proptest::prelude::*;
    use unwarp_core::spatial::{Direction3, Point3, Spacing3};

    type TestBackend = NdArray<f32>;

    const GRADIENT_PERCENT: f64 = 5.563298 / 100.0;
    const GRADIENT_CALIBRATION: f64 = 42797.5;

    fn converter() -> FieldMapConverter {
        FieldMapConverter::new(GRADIENT_PERCENT, GRADIENT_CALIBRATION).unwrap()
    }

    #[test]
    fn test_zero_calibration_rejected() {
        assert!(matches!(
            FieldMapConverter::new(0.0, GRADIENT_CALIBRATION),
            Err(PipelineError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            FieldMapConverter::new(GRADIENT_PERCENT, f64::NAN),
            Err(PipelineError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_convert_value_divides_by_product() {
        let c = converter();
        let expected = 100.0 / (GRADIENT_PERCENT * GRADIENT_CALIBRATION);
        assert!((c.convert_value(100.0) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_convert_volume_is_elementwise() {
        let device = Default::default();
        let values = vec![0.0f32, 1.0, -2.0, 4.0, 0.5, 3.0, -1.0, 2.0];
        let volume = Volume::<TestBackend>::new(
            Tensor::from_data(TensorData::new(values.clone(), Shape::new([2, 2, 2])), &device),
            Point3::origin(),
            Spacing3::uniform(1.0),
            Direction3::identity(),
        )
        .unwrap();

        let c = converter();
        let converted = c.convert(&volume);
        assert_eq!(converted.shape(), volume.shape());
        let out: Vec<f32> = converted.data().clone().into_data().to_vec().unwrap();
        for (input, output) in values.iter().zip(out.iter()) {
            let expected = c.convert_value(*input as f64) as f32;
            assert!((output - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn test_convert_to_field_places_designated_axis() {
        let device = Default::default();
        let volume = Volume::<TestBackend>::new(
            Tensor::full([3, 3, 3], 10.0, &device),
            Point3::origin(),
            Spacing3::uniform(1.0),
            Direction3::identity(),
        )
        .unwrap();

        let c = converter();
        let field = c.convert_to_field(&volume, 2).unwrap();
        assert_eq!(field.unit(), FieldUnit::Millimeters);
        let expected = c.convert_value(10.0) as f32;
        let z: Vec<f32> = field
            .component(2)
            .unwrap()
            .data()
            .clone()
            .into_data()
            .to_vec()
            .unwrap();
        let x: Vec<f32> = field
            .component(0)
            .unwrap()
            .data()
            .clone()
            .into_data()
            .to_vec()
            .unwrap();
        assert!(z.iter().all(|&v| (v - expected).abs() < 1e-6));
        assert!(x.iter().all(|&v| v == 0.0));
    }

    proptest! {
        // convert(a * x) == a * convert(x)
        #[test]
        fn prop_conversion_is_linear(value in -1e5f64..1e5, factor in -100.0f64..100.0) {
            let c = converter();
            let lhs = c.convert_value(factor * value);
            let rhs = factor * c.convert_value(value);
            prop_assert!((lhs - rhs).abs() <= 1e-9 * (1.0 + lhs.abs().max(rhs.abs())));
        }
    }
}
