//! Image transforms.
//!
//! Every transform takes an image by reference and returns a new one.

pub mod crop;

pub use crop::{
    apply_bbox, compute_bbox, crop_to_nonzero, ensure_same_grid, restore_padding,
    sanitize_non_finite, BoundingBox, CroppedSet,
};
