//! NIfTI I/O for volumes and displacement fields.

pub mod nifti_io;

pub use nifti_io::{
    read_displacement_field, read_volume, write_displacement_field, write_volume,
};
