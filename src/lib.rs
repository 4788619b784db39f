//! # tractcrop
//!
//! Dataset preparation for white-matter tract segmentation.
//!
//! - [`nifti`]: `NIfTI-1` reading and writing with lossless storage types
//! - [`transforms`]: nonzero bounding-box cropping shared across co-registered volumes
//! - [`preprocess`]: per-subject crop protocol run over a fixed worker pool
//! - [`experiment`]: mapping of experiment flags to a pretrained configuration
//! - [`config`]: directory layout from `~/.tractseg/config.txt` and the environment
//!
//! ## Quick start
//!
//! ```ignore
//! use tractcrop::{nifti, transforms};
//!
//! let peaks = nifti::load("subject/peaks.nii.gz")?;
//! let mask = nifti::load("subject/nodif_brain_mask.nii.gz")?;
//! let cropped = transforms::crop_to_nonzero(&peaks, &[mask])?;
//! println!("kept {}", cropped.bbox);
//! nifti::save(&cropped.reference, "out/peaks.nii.gz")?;
//! ```

#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod error;
pub mod experiment;
pub mod nifti;
pub mod preprocess;
pub mod transforms;

pub use error::{Error, Result};
pub use nifti::{load, save, NiftiImage};
pub use transforms::BoundingBox;
