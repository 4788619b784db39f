//! `NIfTI` file format support.
//!
//! `NIfTI` is the standard volumetric format for neuroimaging data: a 3-D or 4-D
//! voxel array plus a header carrying the voxel-to-world affine. This module
//! reads and writes single-file `NIfTI-1` images (`.nii` and `.nii.gz`).

pub(crate) mod header;
pub(crate) mod image;
pub mod io;

pub use header::{DataType, NiftiHeader};
pub use image::{ArrayData, NiftiElement, NiftiImage};
pub use io::{load, load_header, save};
