//! Nonzero bounding-box cropping.
//!
//! Brain volumes carry a wide margin of background. [`compute_bbox`] finds the
//! smallest box holding every nonzero voxel of a reference volume and
//! [`apply_bbox`] cuts any co-registered volume down to that box, so all
//! channels of a subject keep the same grid after cropping.
//!
//! Boxes are half-open (`start..end`) on the three spatial axes. Trailing axes
//! (peak directions, bundle channels, time) are never cropped.
//!
//! Cropping moves the affine origin by the crop offset, so each kept voxel
//! keeps its world coordinate. [`restore_padding`] undoes a crop.

use std::fmt;

use ndarray::{ArrayD, Axis, IxDyn, ShapeBuilder, Slice};
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::nifti::image::{map_array, with_array};
use crate::nifti::{NiftiElement, NiftiImage};

/// Half-open voxel ranges on the three spatial axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundingBox {
    /// First voxel index kept on each axis.
    pub start: [usize; 3],
    /// One past the last voxel index kept on each axis.
    pub end: [usize; 3],
}

impl BoundingBox {
    /// Create a box; every range must be non-empty.
    pub fn new(start: [usize; 3], end: [usize; 3]) -> Result<Self> {
        for axis in 0..3 {
            if start[axis] >= end[axis] {
                return Err(Error::InvalidCropRegion(format!(
                    "empty range {}..{} on axis {axis}",
                    start[axis], end[axis]
                )));
            }
        }
        Ok(Self { start, end })
    }

    /// The box covering a whole grid.
    pub fn full(shape: [usize; 3]) -> Self {
        Self {
            start: [0; 3],
            end: shape,
        }
    }

    /// Extent of the box on each axis.
    pub fn shape(&self) -> [usize; 3] {
        [0, 1, 2].map(|axis| self.end[axis] - self.start[axis])
    }

    /// Whether a spatial index lies inside the box.
    pub fn contains(&self, index: [usize; 3]) -> bool {
        (0..3).all(|axis| (self.start[axis]..self.end[axis]).contains(&index[axis]))
    }

    /// Whether the box lies inside a grid of the given shape.
    pub fn fits(&self, shape: [usize; 3]) -> bool {
        (0..3).all(|axis| self.start[axis] < self.end[axis] && self.end[axis] <= shape[axis])
    }

    /// Whether the box covers the whole grid.
    pub fn is_full(&self, shape: [usize; 3]) -> bool {
        *self == Self::full(shape)
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}..{}, {}..{}, {}..{}]",
            self.start[0], self.end[0], self.start[1], self.end[1], self.start[2], self.end[2]
        )
    }
}

/// Fortran-ordered owned copy, matching the layout of loaded volumes.
fn to_fortran<T: NiftiElement>(view: ndarray::ArrayViewD<'_, T>) -> ArrayD<T> {
    let mut out = ArrayD::from_elem(IxDyn(view.shape()).f(), T::default());
    out.assign(&view);
    out
}

fn nonzero_bbox<T: NiftiElement>(data: &ArrayD<T>, slope: f64, inter: f64) -> Option<BoundingBox> {
    let is_nonzero = |v: &T| {
        if inter == 0.0 {
            *v != T::default()
        } else {
            v.to_f64() * slope + inter != 0.0
        }
    };

    let ranges = (0..3)
        .into_par_iter()
        .map(|axis| {
            let occupied = |i: usize| data.index_axis(Axis(axis), i).iter().any(is_nonzero);
            let len = data.len_of(Axis(axis));
            let first = (0..len).find(|&i| occupied(i))?;
            let last = (first..len).rev().find(|&i| occupied(i)).unwrap_or(first);
            Some((first, last + 1))
        })
        .collect::<Option<Vec<_>>>()?;

    let mut bbox = BoundingBox::full([0; 3]);
    for (axis, (first, end)) in ranges.into_iter().enumerate() {
        bbox.start[axis] = first;
        bbox.end[axis] = end;
    }
    Some(bbox)
}

/// Smallest box containing every nonzero voxel.
///
/// A voxel counts as nonzero when any element along the trailing axes has a
/// nonzero scaled value. An all-zero volume yields the full-extent box, never
/// an empty one. Non-finite values should be removed first with
/// [`sanitize_non_finite`]; NaN compares as nonzero.
pub fn compute_bbox(image: &NiftiImage) -> Result<BoundingBox> {
    let spatial = image.spatial_shape()?;
    let (slope, inter) = image.header().scaling();
    let found = with_array!(image.data(), a => nonzero_bbox(a, slope, inter));
    Ok(found.unwrap_or_else(|| BoundingBox::full(spatial)))
}

/// Crop the spatial axes of `image` to `bbox`.
///
/// Trailing axes, the storage type and the intensity scaling are kept. The
/// affine origin is moved to the box corner.
#[must_use = "this function returns a new image and does not modify the original"]
pub fn apply_bbox(image: &NiftiImage, bbox: &BoundingBox) -> Result<NiftiImage> {
    let spatial = image.spatial_shape()?;
    if !bbox.fits(spatial) {
        return Err(Error::InvalidCropRegion(format!(
            "bounding box {bbox} does not fit spatial shape {spatial:?}"
        )));
    }

    let data = map_array!(image.data(), a => {
        to_fortran(a.slice_each_axis(|ax| match ax.axis.index() {
            i @ 0..=2 => Slice::from(bbox.start[i]..bbox.end[i]),
            _ => Slice::from(..),
        }))
    });

    let mut header = image.header().clone();
    header.translate_origin(bbox.start, 1.0);
    Ok(NiftiImage::from_parts(header, data))
}

/// Place a cropped image back into a zero-filled grid of `original` spatial shape.
#[must_use = "this function returns a new image and does not modify the original"]
pub fn restore_padding(
    image: &NiftiImage,
    bbox: &BoundingBox,
    original: [usize; 3],
) -> Result<NiftiImage> {
    let spatial = image.spatial_shape()?;
    if !bbox.fits(original) {
        return Err(Error::InvalidCropRegion(format!(
            "bounding box {bbox} does not fit original shape {original:?}"
        )));
    }
    if spatial != bbox.shape() {
        return Err(Error::InvalidCropRegion(format!(
            "image shape {spatial:?} does not match bounding box {bbox}"
        )));
    }

    let mut full_shape = image.shape().to_vec();
    full_shape[..3].copy_from_slice(&original);

    let data = map_array!(image.data(), a => {
        let mut out = ArrayD::from_elem(IxDyn(&full_shape).f(), Default::default());
        out.slice_each_axis_mut(|ax| match ax.axis.index() {
            i @ 0..=2 => Slice::from(bbox.start[i]..bbox.end[i]),
            _ => Slice::from(..),
        })
        .assign(a);
        out
    });

    let mut header = image.header().clone();
    header.translate_origin(bbox.start, -1.0);
    Ok(NiftiImage::from_parts(header, data))
}

/// Replace NaN and infinite voxels with zero.
///
/// Returns the cleaned image and how many voxels were replaced. Integer
/// images are returned unchanged.
pub fn sanitize_non_finite(image: &NiftiImage) -> (NiftiImage, usize) {
    if !image.dtype().is_float() {
        return (image.clone(), 0);
    }

    let replaced = with_array!(image.data(), a => {
        a.iter().filter(|&&v| v.sanitize() != v).count()
    });
    if replaced == 0 {
        return (image.clone(), 0);
    }

    let data = map_array!(image.data(), a => a.mapv(NiftiElement::sanitize));
    (NiftiImage::from_parts(image.header().clone(), data), replaced)
}

/// Error unless `image` lies on a grid of the given spatial shape.
pub fn ensure_same_grid(expected: [usize; 3], image: &NiftiImage) -> Result<()> {
    let spatial = image.spatial_shape()?;
    if spatial != expected {
        return Err(Error::InvalidDimensions(format!(
            "spatial shape {spatial:?} does not match reference {expected:?}"
        )));
    }
    Ok(())
}

/// Reference and co-registered volumes cropped to one shared box.
#[derive(Debug, Clone)]
pub struct CroppedSet {
    /// Box computed from the reference.
    pub bbox: BoundingBox,
    /// Cropped reference volume.
    pub reference: NiftiImage,
    /// Remaining volumes, in input order.
    pub others: Vec<NiftiImage>,
}

/// Crop `reference` to its nonzero box and every volume of `others` to the same box.
///
/// All volumes are sanitized first. The others must share the reference's
/// spatial shape.
pub fn crop_to_nonzero(reference: &NiftiImage, others: &[NiftiImage]) -> Result<CroppedSet> {
    let (reference, _) = sanitize_non_finite(reference);
    let grid = reference.spatial_shape()?;
    let bbox = compute_bbox(&reference)?;

    let others = others
        .iter()
        .map(|image| {
            ensure_same_grid(grid, image)?;
            let (clean, _) = sanitize_non_finite(image);
            apply_bbox(&clean, &bbox)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CroppedSet {
        bbox,
        reference: apply_bbox(&reference, &bbox)?,
        others,
    })
}
