//! Bounding-box properties checked on seeded random volumes.

use ndarray::{ArrayD, IxDyn, ShapeBuilder};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use tractcrop::nifti::{ArrayData, NiftiHeader, NiftiImage};
use tractcrop::transforms::{
    apply_bbox, compute_bbox, crop_to_nonzero, restore_padding, sanitize_non_finite, BoundingBox,
};

const AFFINE: [[f32; 4]; 4] = [
    [-1.25, 0.0, 0.0, 90.0],
    [0.0, 1.25, 0.0, -126.0],
    [0.0, 0.0, 1.25, -72.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// A volume that is zero outside a random inner block, sparsely filled inside.
fn random_volume(rng: &mut ChaCha8Rng, channels: usize) -> NiftiImage {
    let shape = [rng.gen_range(4..20), rng.gen_range(4..20), rng.gen_range(4..20)];
    let lo = shape.map(|n| rng.gen_range(0..n / 2));
    let hi = [0, 1, 2].map(|a| rng.gen_range(lo[a] + 1..=shape[a]));

    let mut full = shape.to_vec();
    if channels > 1 {
        full.push(channels);
    }
    let mut data = ArrayD::<f32>::zeros(IxDyn(&full).f());
    for (index, value) in data.indexed_iter_mut() {
        let inside = (0..3).all(|a| (lo[a]..hi[a]).contains(&index[a]));
        if inside && rng.gen_bool(0.3) {
            *value = rng.gen_range(-1.0..1.0);
        }
    }
    NiftiImage::from_array(data, AFFINE)
}

fn f32_data(img: &NiftiImage) -> &ArrayD<f32> {
    match img.data() {
        ArrayData::F32(a) => a,
        other => panic!("expected f32 data, got {:?}", other.dtype()),
    }
}

fn nonzero_count(img: &NiftiImage) -> usize {
    f32_data(img).iter().filter(|&&v| v != 0.0).count()
}

fn world(affine: &[[f32; 4]; 4], index: [usize; 3]) -> [f32; 3] {
    [0, 1, 2].map(|row| {
        (0..3).map(|col| affine[row][col] * index[col] as f32).sum::<f32>() + affine[row][3]
    })
}

#[test]
fn test_crop_keeps_every_nonzero_voxel_and_never_grows() {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    for _ in 0..40 {
        let channels = rng.gen_range(1..4);
        let img = random_volume(&mut rng, channels);
        let spatial = img.spatial_shape().unwrap();
        let bbox = compute_bbox(&img).unwrap();
        assert!(bbox.fits(spatial));

        let data = f32_data(&img);
        for (index, &value) in data.indexed_iter() {
            if value != 0.0 {
                assert!(bbox.contains([index[0], index[1], index[2]]), "{bbox} misses {index:?}");
            }
        }

        let cropped = apply_bbox(&img, &bbox).unwrap();
        let cropped_spatial = cropped.spatial_shape().unwrap();
        for axis in 0..3 {
            assert!(cropped_spatial[axis] <= spatial[axis]);
        }
        assert_eq!(cropped.shape()[3..], img.shape()[3..]);
        assert_eq!(nonzero_count(&cropped), nonzero_count(&img));
    }
}

#[test]
fn test_crop_is_idempotent() {
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    for _ in 0..20 {
        let img = random_volume(&mut rng, 1);
        let bbox = compute_bbox(&img).unwrap();
        let once = apply_bbox(&img, &bbox).unwrap();
        let again_box = compute_bbox(&once).unwrap();
        let twice = apply_bbox(&once, &again_box).unwrap();

        assert_eq!(twice.shape(), once.shape());
        assert_eq!(twice.data(), once.data());
        if nonzero_count(&img) > 0 {
            assert!(again_box.is_full(once.spatial_shape().unwrap()));
        }
    }
}

#[test]
fn test_all_zero_volume_keeps_full_extent() {
    let img = NiftiImage::from_array(ArrayD::zeros(IxDyn(&[9, 7, 5]).f()), AFFINE);
    let bbox = compute_bbox(&img).unwrap();
    assert_eq!(bbox, BoundingBox::full([9, 7, 5]));

    let cropped = apply_bbox(&img, &bbox).unwrap();
    assert_eq!(cropped.shape(), img.shape());
    assert_eq!(cropped.affine(), img.affine());
}

#[test]
fn test_reference_box_aligns_all_channels() {
    let mut rng = ChaCha8Rng::seed_from_u64(23);
    let reference = random_volume(&mut rng, 1);
    let [x, y, z] = reference.spatial_shape().unwrap();

    // Co-registered volumes with their own content, including voxels outside
    // the reference box.
    let peaks = NiftiImage::from_array(ArrayD::from_elem(IxDyn(&[x, y, z, 9]).f(), 0.5), AFFINE);
    let mut labels = ArrayD::<u8>::zeros(IxDyn(&[x, y, z, 72]).f());
    labels[[0, 0, 0, 3]] = 1;
    let mut header = NiftiHeader::default();
    header.set_affine(AFFINE);
    let labels = NiftiImage::from_parts(header, ArrayData::U8(labels));

    let set = crop_to_nonzero(&reference, &[peaks, labels]).unwrap();
    let expected = set.bbox.shape();
    assert_eq!(set.reference.spatial_shape().unwrap(), expected);
    for other in &set.others {
        assert_eq!(other.spatial_shape().unwrap(), expected);
        assert_eq!(other.affine(), set.reference.affine());
    }
    assert_eq!(set.others[0].shape()[3], 9);
    assert_eq!(set.others[1].shape()[3], 72);
}

#[test]
fn test_world_coordinates_are_preserved() {
    let mut rng = ChaCha8Rng::seed_from_u64(31);
    for _ in 0..10 {
        let img = random_volume(&mut rng, 1);
        let bbox = compute_bbox(&img).unwrap();
        let cropped = apply_bbox(&img, &bbox).unwrap();

        let [dx, dy, dz] = bbox.shape();
        for index in [[0, 0, 0], [dx - 1, dy - 1, dz - 1]] {
            let original_index = [0, 1, 2].map(|a| index[a] + bbox.start[a]);
            let before = world(&img.affine(), original_index);
            let after = world(&cropped.affine(), index);
            for axis in 0..3 {
                assert!((before[axis] - after[axis]).abs() < 1e-3, "{before:?} != {after:?}");
            }
        }
    }
}

#[test]
fn test_restore_padding_recovers_volume() {
    let mut rng = ChaCha8Rng::seed_from_u64(47);
    for _ in 0..10 {
        let img = random_volume(&mut rng, 2);
        let bbox = compute_bbox(&img).unwrap();
        let cropped = apply_bbox(&img, &bbox).unwrap();
        let restored = restore_padding(&cropped, &bbox, img.spatial_shape().unwrap()).unwrap();

        assert_eq!(restored.shape(), img.shape());
        assert_eq!(restored.data(), img.data());
        let (a, b) = (restored.affine(), img.affine());
        for row in 0..3 {
            assert!((a[row][3] - b[row][3]).abs() < 1e-3);
        }
    }
}

#[test]
fn test_non_finite_voxels_do_not_widen_the_box() {
    let mut data = ArrayD::<f32>::zeros(IxDyn(&[8, 8, 8]).f());
    data[[4, 4, 4]] = 1.0;
    data[[0, 0, 0]] = f32::NAN;
    data[[7, 7, 7]] = f32::NEG_INFINITY;
    let img = NiftiImage::from_array(data, AFFINE);

    let (clean, replaced) = sanitize_non_finite(&img);
    assert_eq!(replaced, 2);
    let bbox = compute_bbox(&clean).unwrap();
    assert_eq!(bbox, BoundingBox::new([4, 4, 4], [5, 5, 5]).unwrap());

    // crop_to_nonzero sanitizes on its own.
    assert_eq!(crop_to_nonzero(&img, &[]).unwrap().bbox, bbox);
}
