//! In-memory `NIfTI` volume: header plus typed voxel array.
//!
//! Voxels are kept in their on-disk storage type so that a crop followed by a
//! save is lossless. Arrays use Fortran (column-major) order, matching the file
//! layout where the first index changes fastest.

use crate::error::{Error, Result};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use half::{bf16, f16};
use ndarray::{ArrayD, IxDyn, ShapeBuilder};

use super::header::{DataType, NiftiHeader};

/// A scalar type that can be stored in a `NIfTI` file.
pub trait NiftiElement: Copy + Default + PartialEq + Send + Sync + 'static {
    /// Storage code written to the header.
    const DATA_TYPE: DataType;

    /// Decode one element from `buf` (exactly `byte_size` bytes).
    fn read<E: ByteOrder>(buf: &[u8]) -> Self;

    /// Encode one element little endian into `buf`.
    fn write_le(self, buf: &mut [u8]);

    /// Widen to f64.
    fn to_f64(self) -> f64;

    /// Replace NaN and infinities with zero. Identity for integers.
    fn sanitize(self) -> Self {
        self
    }
}

macro_rules! impl_int_element {
    ($t:ty, $dtype:ident, $read:ident, $write:ident) => {
        impl NiftiElement for $t {
            const DATA_TYPE: DataType = DataType::$dtype;

            fn read<E: ByteOrder>(buf: &[u8]) -> Self {
                E::$read(buf)
            }

            fn write_le(self, buf: &mut [u8]) {
                LittleEndian::$write(buf, self);
            }

            fn to_f64(self) -> f64 {
                self as f64
            }
        }
    };
}

impl_int_element!(i16, Int16, read_i16, write_i16);
impl_int_element!(u16, UInt16, read_u16, write_u16);
impl_int_element!(i32, Int32, read_i32, write_i32);
impl_int_element!(u32, UInt32, read_u32, write_u32);
impl_int_element!(i64, Int64, read_i64, write_i64);
impl_int_element!(u64, UInt64, read_u64, write_u64);

impl NiftiElement for u8 {
    const DATA_TYPE: DataType = DataType::UInt8;

    fn read<E: ByteOrder>(buf: &[u8]) -> Self {
        buf[0]
    }

    fn write_le(self, buf: &mut [u8]) {
        buf[0] = self;
    }

    fn to_f64(self) -> f64 {
        f64::from(self)
    }
}

impl NiftiElement for i8 {
    const DATA_TYPE: DataType = DataType::Int8;

    fn read<E: ByteOrder>(buf: &[u8]) -> Self {
        buf[0] as i8
    }

    fn write_le(self, buf: &mut [u8]) {
        buf[0] = self as u8;
    }

    fn to_f64(self) -> f64 {
        f64::from(self)
    }
}

macro_rules! impl_float_element {
    ($t:ty, $dtype:ident, $read:ident, $write:ident) => {
        impl NiftiElement for $t {
            const DATA_TYPE: DataType = DataType::$dtype;

            fn read<E: ByteOrder>(buf: &[u8]) -> Self {
                E::$read(buf)
            }

            fn write_le(self, buf: &mut [u8]) {
                LittleEndian::$write(buf, self);
            }

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn sanitize(self) -> Self {
                if self.is_finite() {
                    self
                } else {
                    0.0
                }
            }
        }
    };
}

impl_float_element!(f32, Float32, read_f32, write_f32);
impl_float_element!(f64, Float64, read_f64, write_f64);

macro_rules! impl_half_element {
    ($t:ty, $dtype:ident) => {
        impl NiftiElement for $t {
            const DATA_TYPE: DataType = DataType::$dtype;

            fn read<E: ByteOrder>(buf: &[u8]) -> Self {
                <$t>::from_bits(E::read_u16(buf))
            }

            fn write_le(self, buf: &mut [u8]) {
                LittleEndian::write_u16(buf, self.to_bits());
            }

            fn to_f64(self) -> f64 {
                self.to_f64()
            }

            fn sanitize(self) -> Self {
                if self.is_finite() {
                    self
                } else {
                    <$t>::ZERO
                }
            }
        }
    };
}

impl_half_element!(f16, Float16);
impl_half_element!(bf16, BFloat16);

/// Voxel array in its storage type.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    /// `u8` voxels
    U8(ArrayD<u8>),
    /// `i8` voxels
    I8(ArrayD<i8>),
    /// `i16` voxels
    I16(ArrayD<i16>),
    /// `u16` voxels
    U16(ArrayD<u16>),
    /// `i32` voxels
    I32(ArrayD<i32>),
    /// `u32` voxels
    U32(ArrayD<u32>),
    /// `i64` voxels
    I64(ArrayD<i64>),
    /// `u64` voxels
    U64(ArrayD<u64>),
    /// half precision voxels
    F16(ArrayD<f16>),
    /// bfloat16 voxels
    BF16(ArrayD<bf16>),
    /// `f32` voxels
    F32(ArrayD<f32>),
    /// `f64` voxels
    F64(ArrayD<f64>),
}

/// Run `$body` with `$arr` bound to the inner array, whatever its type.
macro_rules! with_array {
    ($data:expr, $arr:ident => $body:expr) => {
        match $data {
            $crate::nifti::ArrayData::U8($arr) => $body,
            $crate::nifti::ArrayData::I8($arr) => $body,
            $crate::nifti::ArrayData::I16($arr) => $body,
            $crate::nifti::ArrayData::U16($arr) => $body,
            $crate::nifti::ArrayData::I32($arr) => $body,
            $crate::nifti::ArrayData::U32($arr) => $body,
            $crate::nifti::ArrayData::I64($arr) => $body,
            $crate::nifti::ArrayData::U64($arr) => $body,
            $crate::nifti::ArrayData::F16($arr) => $body,
            $crate::nifti::ArrayData::BF16($arr) => $body,
            $crate::nifti::ArrayData::F32($arr) => $body,
            $crate::nifti::ArrayData::F64($arr) => $body,
        }
    };
}

/// Like `with_array!`, rewrapping the resulting array in the same variant.
macro_rules! map_array {
    ($data:expr, $arr:ident => $body:expr) => {
        match $data {
            $crate::nifti::ArrayData::U8($arr) => $crate::nifti::ArrayData::U8($body),
            $crate::nifti::ArrayData::I8($arr) => $crate::nifti::ArrayData::I8($body),
            $crate::nifti::ArrayData::I16($arr) => $crate::nifti::ArrayData::I16($body),
            $crate::nifti::ArrayData::U16($arr) => $crate::nifti::ArrayData::U16($body),
            $crate::nifti::ArrayData::I32($arr) => $crate::nifti::ArrayData::I32($body),
            $crate::nifti::ArrayData::U32($arr) => $crate::nifti::ArrayData::U32($body),
            $crate::nifti::ArrayData::I64($arr) => $crate::nifti::ArrayData::I64($body),
            $crate::nifti::ArrayData::U64($arr) => $crate::nifti::ArrayData::U64($body),
            $crate::nifti::ArrayData::F16($arr) => $crate::nifti::ArrayData::F16($body),
            $crate::nifti::ArrayData::BF16($arr) => $crate::nifti::ArrayData::BF16($body),
            $crate::nifti::ArrayData::F32($arr) => $crate::nifti::ArrayData::F32($body),
            $crate::nifti::ArrayData::F64($arr) => $crate::nifti::ArrayData::F64($body),
        }
    };
}

pub(crate) use map_array;
pub(crate) use with_array;

fn decode<T: NiftiElement>(bytes: &[u8], shape: &[usize], little_endian: bool) -> Result<ArrayD<T>> {
    let size = T::DATA_TYPE.byte_size();
    let values: Vec<T> = if little_endian {
        bytes.chunks_exact(size).map(T::read::<LittleEndian>).collect()
    } else {
        bytes.chunks_exact(size).map(T::read::<BigEndian>).collect()
    };
    ArrayD::from_shape_vec(IxDyn(shape).f(), values)
        .map_err(|e| Error::InvalidDimensions(format!("voxel data does not match shape: {e}")))
}

fn encode<T: NiftiElement>(array: &ArrayD<T>) -> Vec<u8> {
    let size = T::DATA_TYPE.byte_size();
    let mut out = vec![0u8; array.len() * size];
    // The transposed view iterates in column-major order of the original.
    for (chunk, &value) in out.chunks_exact_mut(size).zip(array.t().iter()) {
        value.write_le(chunk);
    }
    out
}

impl ArrayData {
    /// Decode raw voxel bytes of the given storage type.
    pub fn from_bytes(
        bytes: &[u8],
        dtype: DataType,
        shape: &[usize],
        little_endian: bool,
    ) -> Result<Self> {
        let expected = shape.iter().product::<usize>() * dtype.byte_size();
        if bytes.len() != expected {
            return Err(Error::InvalidDimensions(format!(
                "expected {expected} bytes of voxel data for shape {shape:?}, got {}",
                bytes.len()
            )));
        }
        Ok(match dtype {
            DataType::UInt8 => Self::U8(decode(bytes, shape, little_endian)?),
            DataType::Int8 => Self::I8(decode(bytes, shape, little_endian)?),
            DataType::Int16 => Self::I16(decode(bytes, shape, little_endian)?),
            DataType::UInt16 => Self::U16(decode(bytes, shape, little_endian)?),
            DataType::Int32 => Self::I32(decode(bytes, shape, little_endian)?),
            DataType::UInt32 => Self::U32(decode(bytes, shape, little_endian)?),
            DataType::Int64 => Self::I64(decode(bytes, shape, little_endian)?),
            DataType::UInt64 => Self::U64(decode(bytes, shape, little_endian)?),
            DataType::Float16 => Self::F16(decode(bytes, shape, little_endian)?),
            DataType::BFloat16 => Self::BF16(decode(bytes, shape, little_endian)?),
            DataType::Float32 => Self::F32(decode(bytes, shape, little_endian)?),
            DataType::Float64 => Self::F64(decode(bytes, shape, little_endian)?),
        })
    }

    /// Storage type of the array.
    pub fn dtype(&self) -> DataType {
        match self {
            Self::U8(_) => DataType::UInt8,
            Self::I8(_) => DataType::Int8,
            Self::I16(_) => DataType::Int16,
            Self::U16(_) => DataType::UInt16,
            Self::I32(_) => DataType::Int32,
            Self::U32(_) => DataType::UInt32,
            Self::I64(_) => DataType::Int64,
            Self::U64(_) => DataType::UInt64,
            Self::F16(_) => DataType::Float16,
            Self::BF16(_) => DataType::BFloat16,
            Self::F32(_) => DataType::Float32,
            Self::F64(_) => DataType::Float64,
        }
    }

    /// Array shape.
    pub fn shape(&self) -> &[usize] {
        with_array!(self, a => a.shape())
    }

    /// Little-endian bytes in file (column-major) order.
    pub fn to_bytes(&self) -> Vec<u8> {
        with_array!(self, a => encode(a))
    }
}

/// A `NIfTI` image with header metadata and voxel data.
#[derive(Debug, Clone, PartialEq)]
pub struct NiftiImage {
    header: NiftiHeader,
    data: ArrayData,
}

impl NiftiImage {
    /// Create a float32 image from an array and a 4x4 affine.
    pub fn from_array(data: ArrayD<f32>, affine: [[f32; 4]; 4]) -> Self {
        let mut header = NiftiHeader::default();
        header.set_affine(affine);
        Self::from_parts(header, ArrayData::F32(data))
    }

    /// Combine a header with voxel data.
    ///
    /// The header's `ndim`, `dim` and `datatype` are overwritten from the data.
    pub fn from_parts(mut header: NiftiHeader, data: ArrayData) -> Self {
        let shape = data.shape();
        header.ndim = shape.len().clamp(1, 7) as u8;
        header.dim = [1; 7];
        for (slot, &extent) in header.dim.iter_mut().zip(shape) {
            *slot = extent;
        }
        header.datatype = data.dtype();
        Self { header, data }
    }

    /// Image header.
    pub fn header(&self) -> &NiftiHeader {
        &self.header
    }

    /// Voxel data in storage type.
    pub fn data(&self) -> &ArrayData {
        &self.data
    }

    /// Array shape.
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// The first three extents; errors for images with fewer than 3 axes.
    pub fn spatial_shape(&self) -> Result<[usize; 3]> {
        match self.shape() {
            [x, y, z, ..] => Ok([*x, *y, *z]),
            other => Err(Error::InvalidDimensions(format!(
                "expected at least 3 spatial dimensions, got shape {other:?}"
            ))),
        }
    }

    /// Storage type.
    pub fn dtype(&self) -> DataType {
        self.data.dtype()
    }

    /// Voxel spacing.
    pub fn spacing(&self) -> Vec<f32> {
        self.header.spacing()
    }

    /// 4x4 voxel-to-world affine.
    pub fn affine(&self) -> [[f32; 4]; 4] {
        self.header.affine()
    }

    /// Scaled voxel values as f32, in Fortran order.
    pub fn to_f32(&self) -> Result<ArrayD<f32>> {
        let (slope, inter) = self.header.scaling();
        Ok(with_array!(&self.data, a => {
            let mut out = ArrayD::from_elem(IxDyn(a.shape()).f(), 0.0f32);
            out.zip_mut_with(a, |dst, &src| *dst = (src.to_f64() * slope + inter) as f32);
            out
        }))
    }

    /// Raw voxel bytes as written to disk.
    pub fn data_to_bytes(&self) -> Vec<u8> {
        self.data.to_bytes()
    }
}
