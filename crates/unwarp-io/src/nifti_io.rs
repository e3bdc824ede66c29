//! Reading and writing NIfTI-1 volumes and displacement fields.
//!
//! NIfTI stores voxel data as `[X, Y, Z]` with x fastest and the geometry
//! packed into the sform/qform affine. That buffer order is exactly the
//! row-major `[Z, Y, X]` tensor convention, so reading reinterprets the
//! column-major buffer under reversed axes; writing hands the tensor buffer
//! back as a column-major ndarray and emits the geometry as an sform.

use anyhow::{Context, Result};
use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};
use nalgebra::SMatrix;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use std::path::Path;
use unwarp_core::spatial::{Direction3, Point3, Spacing3};
use unwarp_core::{DisplacementField, FieldUnit, Volume};

/// Read a 3-D scalar volume from a NIfTI file.
pub fn read_volume<B: Backend, P: AsRef<Path>>(path: P, device: &B::Device) -> Result<Volume<B>> {
    let path = path.as_ref();
    let obj = ReaderOptions::new()
        .read_file(path)
        .with_context(|| format!("Failed to read NIfTI file {}", path.display()))?;
    let (origin, spacing, direction) = decode_geometry(obj.header());

    let array = obj
        .into_volume()
        .into_ndarray::<f32>()
        .context("Failed to convert NIfTI data to ndarray")?;
    let shape = array.shape();
    if shape.len() != 3 {
        anyhow::bail!(
            "Expected a 3-D NIfTI volume, found {} dimensions",
            shape.len()
        );
    }
    let [nx, ny, nz] = [shape[0], shape[1], shape[2]];

    // `into_ndarray` is column-major, x fastest; the same buffer read
    // row-major is [Z, Y, X].
    let data = TensorData::new(array.into_raw_vec(), Shape::new([nz, ny, nx]));
    let tensor = Tensor::<B, 3>::from_data(data, device);

    Volume::new(tensor, origin, spacing, direction)
        .with_context(|| format!("Invalid geometry in {}", path.display()))
}

/// Write a 3-D scalar volume to a NIfTI file, including its geometry.
pub fn write_volume<B: Backend, P: AsRef<Path>>(path: P, volume: &Volume<B>) -> Result<()> {
    use ndarray::{Array3, ShapeBuilder};
    use nifti::writer::WriterOptions;

    let data = volume.data().clone().to_data();
    let slice = data
        .as_slice::<f32>()
        .map_err(|e| anyhow::anyhow!("Failed to get tensor data: {:?}", e))?;

    // The row-major [Z, Y, X] buffer is a column-major [X, Y, Z] buffer.
    let [nz, ny, nx] = volume.shape();
    let array = Array3::from_shape_vec((nx, ny, nz).f(), slice.to_vec())
        .map_err(|e| anyhow::anyhow!("Failed to create ndarray: {}", e))?;

    let header = encode_geometry(volume.origin(), volume.spacing(), volume.direction());
    WriterOptions::new(path.as_ref())
        .reference_header(&header)
        .write_nifti(&array)
        .map_err(|e| anyhow::anyhow!("Failed to write NIfTI file: {}", e))?;
    Ok(())
}

/// Read a displacement field from a NIfTI file.
///
/// Accepts a 4-D `[X, Y, Z, 3]` layout or the 5-D `[X, Y, Z, 1, 3]` vector
/// layout some tools emit. The file does not record the displacement unit,
/// so the caller states it.
pub fn read_displacement_field<B: Backend, P: AsRef<Path>>(
    path: P,
    unit: FieldUnit,
    device: &B::Device,
) -> Result<DisplacementField<B>> {
    let path = path.as_ref();
    let obj = ReaderOptions::new()
        .read_file(path)
        .with_context(|| format!("Failed to read NIfTI file {}", path.display()))?;
    let (origin, spacing, direction) = decode_geometry(obj.header());

    let array = obj
        .into_volume()
        .into_ndarray::<f32>()
        .context("Failed to convert NIfTI data to ndarray")?;
    let shape = array.shape().to_vec();
    let [nx, ny, nz, components] = match shape.as_slice() {
        [nx, ny, nz, c] => [*nx, *ny, *nz, *c],
        // [X, Y, Z, 1, C]: a unit fourth dimension collapses in place.
        [nx, ny, nz, 1, c] => [*nx, *ny, *nz, *c],
        _ => anyhow::bail!(
            "Expected a 4-D or 5-D NIfTI displacement field, found {} dimensions",
            shape.len()
        ),
    };
    if components != 3 {
        anyhow::bail!("Expected 3 displacement components, found {components}");
    }

    // Column-major with x fastest and the component slowest: the buffer read
    // row-major is [C, Z, Y, X], so only the component axis moves.
    let data = TensorData::new(array.into_raw_vec(), Shape::new([3, nz, ny, nx]));
    let tensor = Tensor::<B, 4>::from_data(data, device).permute([1, 2, 3, 0]);

    DisplacementField::new(tensor, origin, spacing, direction, unit)
        .with_context(|| format!("Invalid geometry in {}", path.display()))
}

/// Write a displacement field to a NIfTI file as `[X, Y, Z, 3]`.
///
/// The displacement unit is not representable in the header; record it
/// alongside the file.
pub fn write_displacement_field<B: Backend, P: AsRef<Path>>(
    path: P,
    field: &DisplacementField<B>,
) -> Result<()> {
    use ndarray::{Array4, ShapeBuilder};
    use nifti::writer::WriterOptions;

    // [C, Z, Y, X] row-major is [X, Y, Z, C] column-major.
    let tensor = field.data().clone().permute([3, 0, 1, 2]);
    let data = tensor.to_data();
    let slice = data
        .as_slice::<f32>()
        .map_err(|e| anyhow::anyhow!("Failed to get tensor data: {:?}", e))?;

    let [nz, ny, nx] = field.shape();
    let array = Array4::from_shape_vec((nx, ny, nz, 3).f(), slice.to_vec())
        .map_err(|e| anyhow::anyhow!("Failed to create ndarray: {}", e))?;

    let header = encode_geometry(field.origin(), field.spacing(), field.direction());
    WriterOptions::new(path.as_ref())
        .reference_header(&header)
        .write_nifti(&array)
        .map_err(|e| anyhow::anyhow!("Failed to write NIfTI file: {}", e))?;
    Ok(())
}

/// Decode origin, spacing and direction from a NIfTI header.
///
/// Prefers the sform affine, falls back to the qform quaternion, then to bare
/// pixdim scaling, as the standard prescribes.
fn decode_geometry(header: &NiftiHeader) -> (Point3, Spacing3, Direction3) {
    let affine: [[f32; 4]; 4] = if header.sform_code > 0 {
        [
            header.srow_x,
            header.srow_y,
            header.srow_z,
            [0.0, 0.0, 0.0, 1.0],
        ]
    } else if header.qform_code > 0 {
        let b = header.quatern_b;
        let c = header.quatern_c;
        let d = header.quatern_d;
        let a = (1.0 - (b * b + c * c + d * d).min(1.0)).sqrt();
        let qfac = if header.pixdim[0] == 0.0 {
            1.0
        } else {
            header.pixdim[0]
        };

        let r11 = a * a + b * b - c * c - d * d;
        let r12 = 2.0 * b * c - 2.0 * a * d;
        let r13 = 2.0 * b * d + 2.0 * a * c;
        let r21 = 2.0 * b * c + 2.0 * a * d;
        let r22 = a * a + c * c - b * b - d * d;
        let r23 = 2.0 * c * d - 2.0 * a * b;
        let r31 = 2.0 * b * d - 2.0 * a * c;
        let r32 = 2.0 * c * d + 2.0 * a * b;
        let r33 = a * a + d * d - c * c - b * b;

        let dx = header.pixdim[1];
        let dy = header.pixdim[2];
        let dz = header.pixdim[3] * qfac;

        [
            [r11 * dx, r12 * dy, r13 * dz, header.quatern_x],
            [r21 * dx, r22 * dy, r23 * dz, header.quatern_y],
            [r31 * dx, r32 * dy, r33 * dz, header.quatern_z],
            [0.0, 0.0, 0.0, 1.0],
        ]
    } else {
        let dx = header.pixdim[1];
        let dy = header.pixdim[2];
        let dz = header.pixdim[3];
        [
            [dx, 0.0, 0.0, 0.0],
            [0.0, dy, 0.0, 0.0],
            [0.0, 0.0, dz, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]
    };

    let origin = Point3::new([
        affine[0][3] as f64,
        affine[1][3] as f64,
        affine[2][3] as f64,
    ]);

    // Columns of the 3x3 block are the spacing-scaled axis directions.
    let columns: Vec<nalgebra::Vector3<f64>> = (0..3)
        .map(|j| {
            nalgebra::Vector3::new(
                affine[0][j] as f64,
                affine[1][j] as f64,
                affine[2][j] as f64,
            )
        })
        .collect();
    let norms: Vec<f64> = columns.iter().map(|c| c.norm()).collect();
    let spacing = Spacing3::new([norms[0], norms[1], norms[2]]);

    let fallback = [
        nalgebra::Vector3::x_axis().into_inner(),
        nalgebra::Vector3::y_axis().into_inner(),
        nalgebra::Vector3::z_axis().into_inner(),
    ];
    let normalized: Vec<nalgebra::Vector3<f64>> = columns
        .iter()
        .zip(norms.iter())
        .zip(fallback.iter())
        .map(|((col, &n), axis)| if n > 1e-9 { col / n } else { *axis })
        .collect();
    let direction = Direction3::from_matrix(SMatrix::<f64, 3, 3>::from_columns(&normalized));

    (origin, spacing, direction)
}

/// Encode origin, spacing and direction as an sform header.
fn encode_geometry(origin: &Point3, spacing: &Spacing3, direction: &Direction3) -> NiftiHeader {
    let mut rows = [[0.0f32; 4]; 3];
    for r in 0..3 {
        for c in 0..3 {
            rows[r][c] = (direction[(r, c)] * spacing[c]) as f32;
        }
        rows[r][3] = origin[r] as f32;
    }

    let mut header = NiftiHeader::default();
    header.pixdim[1] = spacing[0] as f32;
    header.pixdim[2] = spacing[1] as f32;
    header.pixdim[3] = spacing[2] as f32;
    header.sform_code = 1;
    header.srow_x = rows[0];
    header.srow_y = rows[1];
    header.srow_z = rows[2];
    header
}
