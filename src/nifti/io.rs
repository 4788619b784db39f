//! `NIfTI` file reading and writing.
//!
//! - `.nii` files are memory-mapped and decoded in place
//! - `.nii.gz` files are inflated in one shot with libdeflate, falling back to
//!   a streaming decoder for multi-member or >4GB payloads
//! - large `.nii.gz` outputs are compressed in parallel with gzp

use super::header::NiftiHeader;
use super::image::{ArrayData, NiftiImage};
use crate::error::{Error, Result};
use flate2::bufread::MultiGzDecoder;
use gzp::deflate::Gzip;
use gzp::par::compress::ParCompressBuilder;
use gzp::ZWriter;
use libdeflater::{CompressionLvl, Compressor, DecompressionError, Decompressor};
use memmap2::Mmap;
use std::cell::RefCell;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

thread_local! {
    static DECOMPRESSOR: RefCell<Decompressor> = RefCell::new(Decompressor::new());
}

const GZIP_BUFFER_SIZE: usize = 256 * 1024;

/// Uncompressed payloads above this size are compressed on all cores.
const PARALLEL_THRESHOLD: usize = 1024 * 1024;

/// True when the path ends in `.gz`.
pub fn is_gzipped(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == "gz")
}

/// Load a `NIfTI` image from a `.nii` or `.nii.gz` file.
///
/// # Example
/// ```ignore
/// let img = tractcrop::nifti::load("subject/peaks.nii.gz")?;
/// println!("{:?} {}", img.shape(), img.dtype());
/// ```
#[must_use = "this function returns a loaded image that should be used"]
pub fn load<P: AsRef<Path>>(path: P) -> Result<NiftiImage> {
    let path = path.as_ref();
    if is_gzipped(path) {
        let bytes = inflate(&std::fs::read(path)?)?;
        decode_image(&bytes)
    } else {
        load_uncompressed(path)
    }
}

/// Read only the header of a `NIfTI` file.
pub fn load_header<P: AsRef<Path>>(path: P) -> Result<NiftiHeader> {
    let path = path.as_ref();
    let mut buf = vec![0u8; NiftiHeader::SIZE];
    let file = File::open(path)?;
    if is_gzipped(path) {
        MultiGzDecoder::new(BufReader::new(file))
            .read_exact(&mut buf)
            .map_err(|e| Error::Decompression(format!("reading gzip header: {e}")))?;
    } else {
        BufReader::new(file).read_exact(&mut buf)?;
    }
    NiftiHeader::from_bytes(&buf)
}

#[allow(unsafe_code)]
fn load_uncompressed(path: &Path) -> Result<NiftiImage> {
    let file = File::open(path)?;
    // SAFETY: read-only mapping of a file we just opened; the bytes are copied
    // into an owned array before the mapping is dropped.
    let mmap = unsafe { Mmap::map(&file)? };
    decode_image(&mmap)
}

fn decode_image(bytes: &[u8]) -> Result<NiftiImage> {
    let header = NiftiHeader::from_bytes(bytes)?;
    let start = header.vox_offset;
    let end = match start.checked_add(header.data_size()) {
        Some(end) if end <= bytes.len() => end,
        _ => {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!(
                    "file truncated: voxel data at offset {start} needs {} bytes, file has {}",
                    header.data_size(),
                    bytes.len()
                ),
            )))
        }
    };
    let data = ArrayData::from_bytes(
        &bytes[start..end],
        header.datatype,
        &header.shape(),
        header.is_little_endian(),
    )?;
    Ok(NiftiImage::from_parts(header, data))
}

/// Upper bound on the deflate expansion ratio.
const MAX_DEFLATE_RATIO: usize = 1032;

/// Uncompressed size from the gzip trailer (ISIZE, modulo 2^32), capped at
/// what the compressed length can actually expand to.
fn gzip_isize(compressed: &[u8]) -> usize {
    let Some(at) = compressed.len().checked_sub(4) else {
        return 0;
    };
    let declared = u32::from_le_bytes([
        compressed[at],
        compressed[at + 1],
        compressed[at + 2],
        compressed[at + 3],
    ]) as usize;
    declared.min(compressed.len().saturating_mul(MAX_DEFLATE_RATIO))
}

fn inflate_streaming(compressed: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = MultiGzDecoder::new(BufReader::with_capacity(GZIP_BUFFER_SIZE, compressed));
    let mut output = Vec::with_capacity(gzip_isize(compressed));
    decoder
        .read_to_end(&mut output)
        .map_err(|e| Error::Decompression(format!("gzip stream decode failed: {e}")))?;
    Ok(output)
}

/// Inflate a whole gzip file.
///
/// A single-member stream decodes exactly ISIZE bytes; anything else (a
/// multi-member file or a payload over 4GB) is retried with the streaming
/// decoder.
fn inflate(compressed: &[u8]) -> Result<Vec<u8>> {
    let expected = gzip_isize(compressed);
    if expected < NiftiHeader::SIZE {
        return inflate_streaming(compressed);
    }

    let mut output = vec![0u8; expected];
    let result = DECOMPRESSOR.with(|d| d.borrow_mut().gzip_decompress(compressed, &mut output));
    match result {
        Ok(written) if written == expected => Ok(output),
        Ok(_) | Err(DecompressionError::InsufficientSpace) => inflate_streaming(compressed),
        Err(e) => Err(Error::Decompression(format!("{e}"))),
    }
}

fn encode_image(image: &NiftiImage) -> Result<Vec<u8>> {
    let mut header = image.header().clone();
    header.vox_offset = NiftiHeader::DEFAULT_VOX_OFFSET;
    header.validate()?;

    let data = image.data_to_bytes();
    let mut out = Vec::with_capacity(header.vox_offset + data.len());
    out.extend_from_slice(&header.to_bytes());
    // Zeroed extension flag: no extensions follow.
    out.resize(header.vox_offset, 0u8);
    out.extend_from_slice(&data);
    Ok(out)
}

/// Save a `NIfTI` image; `.gz` paths are gzip-compressed.
///
/// Files are always written as little-endian `NIfTI-1` without extensions.
pub fn save<P: AsRef<Path>>(image: &NiftiImage, path: P) -> Result<()> {
    let path = path.as_ref();
    let bytes = encode_image(image)?;

    if !is_gzipped(path) {
        let mut writer = BufWriter::with_capacity(1024 * 1024, File::create(path)?);
        writer.write_all(&bytes)?;
        writer.flush()?;
        return Ok(());
    }

    if bytes.len() >= PARALLEL_THRESHOLD {
        let writer = BufWriter::with_capacity(1024 * 1024, File::create(path)?);
        let mut parz = ParCompressBuilder::<Gzip>::new().from_writer(writer);
        parz.write_all(&bytes)
            .map_err(|e| Error::Io(std::io::Error::other(format!("parallel compression failed: {e}"))))?;
        parz.finish().map_err(|e| {
            Error::Io(std::io::Error::other(format!(
                "parallel compression finish failed: {e}"
            )))
        })?;
    } else {
        let mut compressor = Compressor::new(CompressionLvl::fastest());
        let mut compressed = vec![0u8; compressor.gzip_compress_bound(bytes.len())];
        let written = compressor
            .gzip_compress(&bytes, &mut compressed)
            .map_err(|e| Error::Io(std::io::Error::other(format!("compression failed: {e:?}"))))?;
        compressed.truncate(written);
        std::fs::write(path, compressed)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use ndarray::{ArrayD, IxDyn, ShapeBuilder};
    use tempfile::tempdir;

    fn ramp(shape: &[usize]) -> ArrayD<f32> {
        let n: usize = shape.iter().product();
        ArrayD::from_shape_vec(IxDyn(shape).f(), (0..n).map(|i| i as f32).collect()).unwrap()
    }

    const AFFINE: [[f32; 4]; 4] = [
        [2.0, 0.0, 0.0, -10.0],
        [0.0, 2.0, 0.0, -12.0],
        [0.0, 0.0, 2.0, -14.0],
        [0.0, 0.0, 0.0, 1.0],
    ];

    #[test]
    fn test_roundtrip_uncompressed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.nii");
        let img = NiftiImage::from_array(ramp(&[10, 9, 8]), AFFINE);

        save(&img, &path).unwrap();
        let loaded = load(&path).unwrap();

        assert_eq!(loaded.shape(), &[10, 9, 8]);
        assert_eq!(loaded.affine(), AFFINE);
        assert_eq!(loaded.data(), img.data());
    }

    #[test]
    fn test_roundtrip_gzipped_small_and_parallel() {
        let dir = tempdir().unwrap();
        for shape in [[6usize, 5, 4], [80, 80, 60]] {
            let path = dir.path().join(format!("test_{}.nii.gz", shape[0]));
            let img = NiftiImage::from_array(ramp(&shape), AFFINE);

            save(&img, &path).unwrap();
            let loaded = load(&path).unwrap();

            assert_eq!(loaded.shape(), &shape);
            assert_eq!(loaded.data(), img.data());
        }
    }

    #[test]
    fn test_multimember_gzip_fallback() {
        let dir = tempdir().unwrap();
        let base_path = dir.path().join("base.nii");
        let path = dir.path().join("multi.nii.gz");

        let img = NiftiImage::from_array(ramp(&[10, 10, 10]), AFFINE);
        save(&img, &base_path).unwrap();

        let bytes = std::fs::read(&base_path).unwrap();
        let split = bytes.len() / 2;
        let mut multi_member = Vec::new();
        for part in [&bytes[..split], &bytes[split..]] {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
            encoder.write_all(part).unwrap();
            multi_member.extend(encoder.finish().unwrap());
        }
        std::fs::write(&path, multi_member).unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.data(), img.data());
    }

    #[test]
    fn test_load_header_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hdr.nii.gz");
        let img = NiftiImage::from_array(ramp(&[4, 3, 2]), AFFINE);
        save(&img, &path).unwrap();

        let header = load_header(&path).unwrap();
        assert_eq!(header.shape(), vec![4, 3, 2]);
        assert_eq!(header.vox_offset, NiftiHeader::DEFAULT_VOX_OFFSET);
    }

    #[test]
    fn test_oversized_vox_offset_is_truncation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("offset.nii");
        let img = NiftiImage::from_array(ramp(&[3, 3, 3]), AFFINE);
        save(&img, &path).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        bytes[108..112].copy_from_slice(&1.0e30f32.to_le_bytes());
        std::fs::write(&path, &bytes).unwrap();

        match load(&path) {
            Err(Error::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof),
            other => panic!("expected truncation error, got {other:?}"),
        }
    }

    #[test]
    fn test_isize_trailer_is_capped() {
        let compressed = [0u8; 16];
        let mut lying = compressed.to_vec();
        lying[12..16].copy_from_slice(&u32::MAX.to_le_bytes());
        assert_eq!(gzip_isize(&lying), 16 * MAX_DEFLATE_RATIO);
        assert_eq!(gzip_isize(&compressed[..3]), 0);
    }

    #[test]
    fn test_corrupt_isize_trailer_is_decompression_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trailer.nii.gz");
        let img = NiftiImage::from_array(ramp(&[4, 4, 4]), AFFINE);
        save(&img, &path).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        let at = bytes.len() - 4;
        bytes[at..].copy_from_slice(&u32::MAX.to_le_bytes());
        std::fs::write(&path, &bytes).unwrap();

        assert!(matches!(load(&path), Err(Error::Decompression(_))));
    }

    #[test]
    fn test_extensions_are_skipped() {
        let dir = tempdir().unwrap();
        let plain = dir.path().join("plain.nii");
        let with_ext = dir.path().join("ext.nii");
        let img = NiftiImage::from_array(ramp(&[3, 3, 3]), AFFINE);
        save(&img, &plain).unwrap();

        // Insert one 16-byte extension between the header and the data.
        let bytes = std::fs::read(&plain).unwrap();
        let mut patched = bytes[..NiftiHeader::SIZE].to_vec();
        patched[108..112].copy_from_slice(&368.0f32.to_le_bytes());
        patched.extend_from_slice(&[1, 0, 0, 0]);
        patched.extend_from_slice(&16i32.to_le_bytes());
        patched.extend_from_slice(&0i32.to_le_bytes());
        patched.extend_from_slice(&[0u8; 8]);
        patched.extend_from_slice(&bytes[NiftiHeader::DEFAULT_VOX_OFFSET..]);
        std::fs::write(&with_ext, patched).unwrap();

        let loaded = load(&with_ext).unwrap();
        assert_eq!(loaded.data(), img.data());
    }
}
