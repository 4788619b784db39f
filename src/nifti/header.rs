//! `NIfTI-1` header parsing and representation.
//!
//! Headers are read in either byte order and always written little endian.
//! Every field of the 348-byte header is carried, so a load/save cycle only
//! changes what a transform deliberately changes.

use crate::error::{Error, Result};
use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Byte offsets of the `NIfTI-1` header fields.
mod offsets {
    pub const SIZEOF_HDR: usize = 0;
    pub const DIM_INFO: usize = 39;
    pub const DIM: usize = 40;
    pub const INTENT_P1: usize = 56;
    pub const INTENT_CODE: usize = 68;
    pub const DATATYPE: usize = 70;
    pub const BITPIX: usize = 72;
    pub const SLICE_START: usize = 74;
    pub const PIXDIM: usize = 76;
    pub const VOX_OFFSET: usize = 108;
    pub const SCL_SLOPE: usize = 112;
    pub const SCL_INTER: usize = 116;
    pub const SLICE_END: usize = 120;
    pub const SLICE_CODE: usize = 122;
    pub const XYZT_UNITS: usize = 123;
    pub const CAL_MAX: usize = 124;
    pub const CAL_MIN: usize = 128;
    pub const SLICE_DURATION: usize = 132;
    pub const TOFFSET: usize = 136;
    pub const DESCRIP: usize = 148;
    pub const AUX_FILE: usize = 228;
    pub const QFORM_CODE: usize = 252;
    pub const SFORM_CODE: usize = 254;
    pub const QUATERN_B: usize = 256;
    pub const QOFFSET_X: usize = 268;
    pub const SROW_X: usize = 280;
    pub const INTENT_NAME: usize = 328;
    pub const MAGIC: usize = 344;
}

/// `NIfTI` data type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum DataType {
    /// Unsigned 8-bit integer
    UInt8 = 2,
    /// Signed 16-bit integer
    Int16 = 4,
    /// Signed 32-bit integer
    Int32 = 8,
    /// 32-bit floating point
    Float32 = 16,
    /// 64-bit floating point
    Float64 = 64,
    /// Signed 8-bit integer
    Int8 = 256,
    /// Unsigned 16-bit integer
    UInt16 = 512,
    /// Unsigned 32-bit integer
    UInt32 = 768,
    /// Signed 64-bit integer
    Int64 = 1024,
    /// Unsigned 64-bit integer
    UInt64 = 1280,
    /// IEEE 754 half precision
    Float16 = 16384,
    /// Brain floating point 16-bit
    BFloat16 = 16385,
}

impl DataType {
    /// Parse from a `NIfTI` datatype code.
    pub fn from_code(code: i16) -> Result<Self> {
        Ok(match code {
            2 => Self::UInt8,
            4 => Self::Int16,
            8 => Self::Int32,
            16 => Self::Float32,
            64 => Self::Float64,
            256 => Self::Int8,
            512 => Self::UInt16,
            768 => Self::UInt32,
            1024 => Self::Int64,
            1280 => Self::UInt64,
            16384 => Self::Float16,
            16385 => Self::BFloat16,
            _ => return Err(Error::UnsupportedDataType(code)),
        })
    }

    /// Size of each element in bytes.
    pub const fn byte_size(self) -> usize {
        match self {
            Self::UInt8 | Self::Int8 => 1,
            Self::Int16 | Self::UInt16 | Self::Float16 | Self::BFloat16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
            Self::Int64 | Self::UInt64 | Self::Float64 => 8,
        }
    }

    /// True for the floating point storage types, the only ones that can hold NaN.
    pub const fn is_float(self) -> bool {
        matches!(
            self,
            Self::Float16 | Self::BFloat16 | Self::Float32 | Self::Float64
        )
    }

    /// Short Rust-style name (`u8`, `f32`, ...).
    pub const fn type_name(self) -> &'static str {
        match self {
            Self::UInt8 => "u8",
            Self::Int8 => "i8",
            Self::Int16 => "i16",
            Self::UInt16 => "u16",
            Self::Int32 => "i32",
            Self::UInt32 => "u32",
            Self::Int64 => "i64",
            Self::UInt64 => "u64",
            Self::Float16 => "f16",
            Self::BFloat16 => "bf16",
            Self::Float32 => "f32",
            Self::Float64 => "f64",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.type_name())
    }
}

/// `NIfTI-1` header.
///
/// Dimensions are kept as `usize`; `dim[i]` for `i >= ndim` is 1.
#[derive(Debug, Clone, PartialEq)]
pub struct NiftiHeader {
    /// Number of dimensions (1-7).
    pub ndim: u8,
    /// Size along each dimension.
    pub dim: [usize; 7],
    /// Storage data type.
    pub datatype: DataType,
    /// qfac at index 0, voxel sizes at `1..=ndim`.
    pub pixdim: [f32; 8],
    /// Byte offset of the voxel data.
    pub vox_offset: usize,
    /// Data scaling slope (0 means unscaled).
    pub scl_slope: f32,
    /// Data scaling intercept.
    pub scl_inter: f32,
    /// Packed spatial and temporal unit codes.
    pub xyzt_units: u8,
    /// Packed frequency/phase/slice dimension indices.
    pub dim_info: u8,
    /// Intent code.
    pub intent_code: i16,
    /// Intent parameters.
    pub intent_p: [f32; 3],
    /// Intent name (at most 15 bytes).
    pub intent_name: String,
    /// Slice timing code.
    pub slice_code: u8,
    /// First slice index.
    pub slice_start: i16,
    /// Last slice index.
    pub slice_end: i16,
    /// Time for one slice.
    pub slice_duration: f32,
    /// Time axis shift.
    pub toffset: f32,
    /// Display range maximum.
    pub cal_max: f32,
    /// Display range minimum.
    pub cal_min: f32,
    /// Description string (at most 79 bytes).
    pub descrip: String,
    /// Auxiliary filename (at most 23 bytes).
    pub aux_file: String,
    /// qform transform code.
    pub qform_code: i16,
    /// sform transform code.
    pub sform_code: i16,
    /// Quaternion parameters b, c, d of the qform.
    pub quatern: [f32; 3],
    /// Translation of the qform.
    pub qoffset: [f32; 3],
    /// Rows of the sform affine.
    pub srow: [[f32; 4]; 3],
    /// Byte order the header was read in.
    pub(crate) little_endian: bool,
}

impl Default for NiftiHeader {
    fn default() -> Self {
        Self {
            ndim: 3,
            dim: [1; 7],
            datatype: DataType::Float32,
            pixdim: [1.0; 8],
            vox_offset: Self::DEFAULT_VOX_OFFSET,
            scl_slope: 1.0,
            scl_inter: 0.0,
            // millimetres, unknown time unit
            xyzt_units: 2,
            dim_info: 0,
            intent_code: 0,
            intent_p: [0.0; 3],
            intent_name: String::new(),
            slice_code: 0,
            slice_start: 0,
            slice_end: 0,
            slice_duration: 0.0,
            toffset: 0.0,
            cal_max: 0.0,
            cal_min: 0.0,
            descrip: String::new(),
            aux_file: String::new(),
            qform_code: 0,
            sform_code: 1,
            quatern: [0.0; 3],
            qoffset: [0.0; 3],
            srow: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
            ],
            little_endian: true,
        }
    }
}

fn read_string(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches('\0')
        .to_string()
}

fn write_string(buf: &mut [u8], value: &str) {
    let src = value.as_bytes();
    let len = src.len().min(buf.len() - 1);
    buf[..len].copy_from_slice(&src[..len]);
}

impl NiftiHeader {
    /// Size of the `NIfTI-1` header in bytes.
    pub const SIZE: usize = 348;

    /// Data offset used when writing: header plus the 4-byte extension flag.
    pub const DEFAULT_VOX_OFFSET: usize = 352;

    /// Read a header, detecting the byte order from `sizeof_hdr`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 4 {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "header too short to detect byte order",
            )));
        }

        let little_endian = match (
            LittleEndian::read_i32(&bytes[0..4]),
            BigEndian::read_i32(&bytes[0..4]),
        ) {
            (348, _) => true,
            (_, 348) => false,
            (540, _) | (_, 540) => {
                return Err(Error::InvalidFileFormat(
                    "NIfTI-2 headers are not supported".to_string(),
                ))
            }
            _ => return Err(Error::InvalidMagic([bytes[0], bytes[1], bytes[2], bytes[3]])),
        };

        if bytes.len() < Self::SIZE {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("header too short: got {} bytes, need {}", bytes.len(), Self::SIZE),
            )));
        }

        if little_endian {
            Self::parse::<LittleEndian>(bytes, true)
        } else {
            Self::parse::<BigEndian>(bytes, false)
        }
    }

    #[allow(clippy::wildcard_imports)]
    fn parse<E: ByteOrder>(bytes: &[u8], little_endian: bool) -> Result<Self> {
        use offsets::*;

        let magic = &bytes[MAGIC..MAGIC + 4];
        if magic != b"n+1\0" {
            if magic == b"ni1\0" {
                return Err(Error::InvalidFileFormat(
                    "split .hdr/.img pairs are not supported".to_string(),
                ));
            }
            return Err(Error::InvalidMagic([magic[0], magic[1], magic[2], magic[3]]));
        }

        let f32_at = |offset: usize| E::read_f32(&bytes[offset..offset + 4]);
        let i16_at = |offset: usize| E::read_i16(&bytes[offset..offset + 2]);

        let ndim_raw = i16_at(DIM);
        if !(1..=7).contains(&ndim_raw) {
            return Err(Error::InvalidDimensions(format!(
                "ndim must be 1..=7, got {ndim_raw}"
            )));
        }
        let ndim = ndim_raw as u8;

        let mut dim = [1usize; 7];
        for (i, slot) in dim.iter_mut().enumerate().take(ndim as usize) {
            let raw = i16_at(DIM + 2 + i * 2);
            if raw <= 0 {
                return Err(Error::InvalidDimensions(format!(
                    "dimension {i} must be positive, got {raw}"
                )));
            }
            *slot = raw as usize;
        }

        let datatype = DataType::from_code(i16_at(DATATYPE))?;
        let bitpix = i16_at(BITPIX);
        let expected_bitpix = (datatype.byte_size() * 8) as i16;
        if bitpix != expected_bitpix {
            return Err(Error::InvalidDimensions(format!(
                "bitpix {bitpix} does not match datatype {datatype} (expected {expected_bitpix})"
            )));
        }

        let mut pixdim = [0.0f32; 8];
        for (i, value) in pixdim.iter_mut().enumerate() {
            *value = f32_at(PIXDIM + i * 4);
        }

        let vox_offset_raw = f32_at(VOX_OFFSET);
        if !vox_offset_raw.is_finite() || vox_offset_raw.fract() != 0.0 || vox_offset_raw < 0.0 {
            return Err(Error::InvalidDimensions(format!(
                "vox_offset must be a non-negative integer, got {vox_offset_raw}"
            )));
        }

        let mut srow = [[0.0f32; 4]; 3];
        for (r, row) in srow.iter_mut().enumerate() {
            for (c, value) in row.iter_mut().enumerate() {
                *value = f32_at(SROW_X + r * 16 + c * 4);
            }
        }

        let header = Self {
            ndim,
            dim,
            datatype,
            pixdim,
            vox_offset: vox_offset_raw as usize,
            scl_slope: f32_at(SCL_SLOPE),
            scl_inter: f32_at(SCL_INTER),
            xyzt_units: bytes[XYZT_UNITS],
            dim_info: bytes[DIM_INFO],
            intent_code: i16_at(INTENT_CODE),
            intent_p: [
                f32_at(INTENT_P1),
                f32_at(INTENT_P1 + 4),
                f32_at(INTENT_P1 + 8),
            ],
            intent_name: read_string(&bytes[INTENT_NAME..MAGIC]),
            slice_code: bytes[SLICE_CODE],
            slice_start: i16_at(SLICE_START),
            slice_end: i16_at(SLICE_END),
            slice_duration: f32_at(SLICE_DURATION),
            toffset: f32_at(TOFFSET),
            cal_max: f32_at(CAL_MAX),
            cal_min: f32_at(CAL_MIN),
            descrip: read_string(&bytes[DESCRIP..AUX_FILE]),
            aux_file: read_string(&bytes[AUX_FILE..QFORM_CODE]),
            qform_code: i16_at(QFORM_CODE),
            sform_code: i16_at(SFORM_CODE),
            quatern: [
                f32_at(QUATERN_B),
                f32_at(QUATERN_B + 4),
                f32_at(QUATERN_B + 8),
            ],
            qoffset: [
                f32_at(QOFFSET_X),
                f32_at(QOFFSET_X + 4),
                f32_at(QOFFSET_X + 8),
            ],
            srow,
            little_endian,
        };

        header.validate()?;
        Ok(header)
    }

    /// Serialize to a little-endian 348-byte header.
    #[allow(clippy::wildcard_imports)]
    pub fn to_bytes(&self) -> Vec<u8> {
        use offsets::*;
        type E = LittleEndian;

        let mut buf = vec![0u8; Self::SIZE];

        E::write_i32(&mut buf[SIZEOF_HDR..SIZEOF_HDR + 4], Self::SIZE as i32);
        buf[DIM_INFO] = self.dim_info;

        E::write_i16(&mut buf[DIM..DIM + 2], i16::from(self.ndim));
        for (i, &d) in self.dim.iter().enumerate() {
            let offset = DIM + 2 + i * 2;
            E::write_i16(&mut buf[offset..offset + 2], d.min(i16::MAX as usize) as i16);
        }

        for (i, &p) in self.intent_p.iter().enumerate() {
            let offset = INTENT_P1 + i * 4;
            E::write_f32(&mut buf[offset..offset + 4], p);
        }
        E::write_i16(&mut buf[INTENT_CODE..INTENT_CODE + 2], self.intent_code);
        E::write_i16(&mut buf[DATATYPE..DATATYPE + 2], self.datatype as i16);
        E::write_i16(
            &mut buf[BITPIX..BITPIX + 2],
            (self.datatype.byte_size() * 8) as i16,
        );
        E::write_i16(&mut buf[SLICE_START..SLICE_START + 2], self.slice_start);

        for (i, &p) in self.pixdim.iter().enumerate() {
            let offset = PIXDIM + i * 4;
            E::write_f32(&mut buf[offset..offset + 4], p);
        }

        E::write_f32(&mut buf[VOX_OFFSET..VOX_OFFSET + 4], self.vox_offset as f32);
        E::write_f32(&mut buf[SCL_SLOPE..SCL_SLOPE + 4], self.scl_slope);
        E::write_f32(&mut buf[SCL_INTER..SCL_INTER + 4], self.scl_inter);
        E::write_i16(&mut buf[SLICE_END..SLICE_END + 2], self.slice_end);
        buf[SLICE_CODE] = self.slice_code;
        buf[XYZT_UNITS] = self.xyzt_units;
        E::write_f32(&mut buf[CAL_MAX..CAL_MAX + 4], self.cal_max);
        E::write_f32(&mut buf[CAL_MIN..CAL_MIN + 4], self.cal_min);
        E::write_f32(
            &mut buf[SLICE_DURATION..SLICE_DURATION + 4],
            self.slice_duration,
        );
        E::write_f32(&mut buf[TOFFSET..TOFFSET + 4], self.toffset);

        write_string(&mut buf[DESCRIP..AUX_FILE], &self.descrip);
        write_string(&mut buf[AUX_FILE..QFORM_CODE], &self.aux_file);

        E::write_i16(&mut buf[QFORM_CODE..QFORM_CODE + 2], self.qform_code);
        E::write_i16(&mut buf[SFORM_CODE..SFORM_CODE + 2], self.sform_code);
        for (i, &q) in self.quatern.iter().enumerate() {
            let offset = QUATERN_B + i * 4;
            E::write_f32(&mut buf[offset..offset + 4], q);
        }
        for (i, &q) in self.qoffset.iter().enumerate() {
            let offset = QOFFSET_X + i * 4;
            E::write_f32(&mut buf[offset..offset + 4], q);
        }
        for (r, row) in self.srow.iter().enumerate() {
            for (c, &v) in row.iter().enumerate() {
                let offset = SROW_X + r * 16 + c * 4;
                E::write_f32(&mut buf[offset..offset + 4], v);
            }
        }

        write_string(&mut buf[INTENT_NAME..MAGIC], &self.intent_name);
        buf[MAGIC..MAGIC + 4].copy_from_slice(b"n+1\0");

        buf
    }

    /// The 4x4 voxel-to-world affine: sform if set, else qform, else pixdim scaling.
    pub fn affine(&self) -> [[f32; 4]; 4] {
        let a = self.affine_f64();
        a.map(|row| row.map(|v| v as f32))
    }

    /// [`affine`](Self::affine) with f64 precision.
    pub fn affine_f64(&self) -> [[f64; 4]; 4] {
        if self.sform_code > 0 {
            let r = self.srow.map(|row| row.map(f64::from));
            [r[0], r[1], r[2], [0.0, 0.0, 0.0, 1.0]]
        } else if self.qform_code > 0 {
            self.qform_to_affine()
        } else {
            [
                [f64::from(self.pixdim[1]), 0.0, 0.0, 0.0],
                [0.0, f64::from(self.pixdim[2]), 0.0, 0.0],
                [0.0, 0.0, f64::from(self.pixdim[3]), 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ]
        }
    }

    /// Set the sform from a 4x4 matrix and update pixdim from its column norms.
    pub fn set_affine(&mut self, affine: [[f32; 4]; 4]) {
        self.srow = [affine[0], affine[1], affine[2]];
        if self.sform_code <= 0 {
            self.sform_code = 1;
        }
        for axis in 0..3 {
            let norm = (0..3)
                .map(|row| affine[row][axis] * affine[row][axis])
                .sum::<f32>()
                .sqrt();
            if norm > 0.0 {
                self.pixdim[axis + 1] = norm;
            }
        }
    }

    /// Move the world origin so that voxel `offset` of the current grid
    /// becomes voxel 0 (`sign = 1.0`) or the reverse (`sign = -1.0`).
    ///
    /// Both encodings are shifted with their own linear part. A header with
    /// neither gains an sform so that the shift is not lost.
    pub fn translate_origin(&mut self, offset: [usize; 3], sign: f64) {
        let shift = |linear: &[[f64; 4]; 4]| -> [f64; 3] {
            let mut out = [0.0; 3];
            for (row, value) in out.iter_mut().enumerate() {
                *value = sign
                    * (0..3)
                        .map(|col| linear[row][col] * offset[col] as f64)
                        .sum::<f64>();
            }
            out
        };

        if self.sform_code <= 0 && self.qform_code <= 0 {
            let mut affine = self.affine_f64();
            let delta = shift(&affine);
            for row in 0..3 {
                affine[row][3] += delta[row];
            }
            self.set_affine(affine.map(|row| row.map(|v| v as f32)));
            return;
        }

        if self.sform_code > 0 {
            let sform = self.affine_f64();
            let delta = shift(&sform);
            for row in 0..3 {
                self.srow[row][3] = (f64::from(self.srow[row][3]) + delta[row]) as f32;
            }
        }
        if self.qform_code > 0 {
            let qform = self.qform_to_affine();
            let delta = shift(&qform);
            for row in 0..3 {
                self.qoffset[row] = (f64::from(self.qoffset[row]) + delta[row]) as f32;
            }
        }
    }

    #[allow(clippy::many_single_char_names)]
    fn qform_to_affine(&self) -> [[f64; 4]; 4] {
        let [b, c, d] = self.quatern.map(f64::from);
        let a = (1.0 - b * b - c * c - d * d).max(0.0).sqrt();

        let qfac = if self.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
        let i = f64::from(self.pixdim[1]).abs();
        let j = f64::from(self.pixdim[2]);
        let k = f64::from(self.pixdim[3]) * qfac;
        let [ox, oy, oz] = self.qoffset.map(f64::from);

        [
            [
                (a * a + b * b - c * c - d * d) * i,
                2.0 * (b * c - a * d) * j,
                2.0 * (b * d + a * c) * k,
                ox,
            ],
            [
                2.0 * (b * c + a * d) * i,
                (a * a - b * b + c * c - d * d) * j,
                2.0 * (c * d - a * b) * k,
                oy,
            ],
            [
                2.0 * (b * d - a * c) * i,
                2.0 * (c * d + a * b) * j,
                (a * a - b * b - c * c + d * d) * k,
                oz,
            ],
            [0.0, 0.0, 0.0, 1.0],
        ]
    }

    /// Image shape (`ndim` entries).
    pub fn shape(&self) -> Vec<usize> {
        self.dim[..self.ndim as usize].to_vec()
    }

    /// Voxel spacing (`ndim` entries).
    pub fn spacing(&self) -> Vec<f32> {
        self.pixdim[1..=self.ndim as usize].to_vec()
    }

    /// Effective scaling as `(slope, intercept)`; a zero slope means unscaled.
    pub fn scaling(&self) -> (f64, f64) {
        let slope = f64::from(self.scl_slope);
        if slope == 0.0 || !slope.is_finite() {
            (1.0, 0.0)
        } else {
            (slope, f64::from(self.scl_inter))
        }
    }

    /// Total number of voxels.
    pub fn num_voxels(&self) -> usize {
        self.dim[..self.ndim as usize].iter().product()
    }

    /// Size of the voxel data in bytes.
    pub fn data_size(&self) -> usize {
        self.num_voxels() * self.datatype.byte_size()
    }

    /// Returns true if the source file was little endian.
    pub fn is_little_endian(&self) -> bool {
        self.little_endian
    }

    /// Check the invariants the codec relies on.
    pub fn validate(&self) -> Result<()> {
        if self.ndim == 0 || self.ndim > 7 {
            return Err(Error::InvalidDimensions(format!(
                "ndim must be 1..=7, got {}",
                self.ndim
            )));
        }

        let mut voxels: usize = 1;
        for i in 0..self.ndim as usize {
            if self.dim[i] == 0 {
                return Err(Error::InvalidDimensions(format!("dimension {i} is zero")));
            }
            if self.dim[i] > i16::MAX as usize {
                return Err(Error::InvalidDimensions(format!(
                    "dimension {i} ({}) exceeds the NIfTI-1 limit",
                    self.dim[i]
                )));
            }
            voxels = voxels
                .checked_mul(self.dim[i])
                .ok_or_else(|| Error::InvalidDimensions("dimension product overflow".into()))?;
        }
        voxels
            .checked_mul(self.datatype.byte_size())
            .ok_or_else(|| Error::InvalidDimensions("data size overflow".into()))?;

        if self.vox_offset < Self::SIZE {
            return Err(Error::InvalidDimensions(format!(
                "vox_offset {} before header end ({})",
                self.vox_offset,
                Self::SIZE
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_header_bytes<E: ByteOrder>() -> Vec<u8> {
        let mut bytes = vec![0u8; 348];
        E::write_i32(&mut bytes[0..4], 348);
        bytes[344..348].copy_from_slice(b"n+1\0");
        E::write_i16(&mut bytes[40..42], 3); // ndim
        E::write_i16(&mut bytes[42..44], 10);
        E::write_i16(&mut bytes[44..46], 11);
        E::write_i16(&mut bytes[46..48], 12);
        E::write_i16(&mut bytes[70..72], 4); // Int16
        E::write_i16(&mut bytes[72..74], 16);
        E::write_f32(&mut bytes[80..84], 1.25);
        E::write_f32(&mut bytes[84..88], 1.25);
        E::write_f32(&mut bytes[88..92], 1.25);
        E::write_f32(&mut bytes[108..112], 352.0);
        bytes
    }

    #[test]
    fn test_roundtrip_keeps_all_fields() {
        let mut header = NiftiHeader::default();
        header.ndim = 4;
        header.dim = [64, 64, 32, 9, 1, 1, 1];
        header.pixdim = [-1.0, 1.25, 1.25, 1.25, 1.0, 0.0, 0.0, 0.0];
        header.datatype = DataType::Int16;
        header.scl_slope = 0.5;
        header.scl_inter = 3.0;
        header.intent_code = 1007;
        header.intent_name = "peaks".to_string();
        header.descrip = "HCP subject".to_string();
        header.qform_code = 1;
        header.quatern = [0.0, 1.0, 0.0];
        header.qoffset = [90.0, -126.0, -72.0];
        header.srow = [
            [-1.25, 0.0, 0.0, 90.0],
            [0.0, 1.25, 0.0, -126.0],
            [0.0, 0.0, 1.25, -72.0],
        ];

        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), NiftiHeader::SIZE);

        let parsed = NiftiHeader::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_big_endian_header_is_read() {
        let bytes = minimal_header_bytes::<BigEndian>();
        let header = NiftiHeader::from_bytes(&bytes).unwrap();
        assert!(!header.is_little_endian());
        assert_eq!(header.shape(), vec![10, 11, 12]);
        assert_eq!(header.datatype, DataType::Int16);
        assert_eq!(header.spacing(), vec![1.25f32, 1.25, 1.25]);
    }

    #[test]
    fn test_nifti2_is_rejected() {
        let mut bytes = vec![0u8; 540];
        LittleEndian::write_i32(&mut bytes[0..4], 540);
        let err = NiftiHeader::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, Error::InvalidFileFormat(_)));
    }

    #[test]
    fn test_bitpix_mismatch() {
        let mut bytes = minimal_header_bytes::<LittleEndian>();
        LittleEndian::write_i16(&mut bytes[72..74], 32);
        assert!(matches!(
            NiftiHeader::from_bytes(&bytes),
            Err(Error::InvalidDimensions(_))
        ));
    }

    #[test]
    fn test_affine_falls_back_to_pixdim() {
        let mut header = NiftiHeader::default();
        header.sform_code = 0;
        header.pixdim = [1.0, 2.0, 3.0, 4.0, 0.0, 0.0, 0.0, 0.0];
        let affine = header.affine();
        assert_eq!(affine[0][0], 2.0);
        assert_eq!(affine[1][1], 3.0);
        assert_eq!(affine[2][2], 4.0);
        assert_eq!(affine[0][3], 0.0);
    }

    #[test]
    fn test_translate_origin_shifts_sform_and_qform() {
        let mut header = NiftiHeader::default();
        header.srow = [
            [2.0, 0.0, 0.0, -10.0],
            [0.0, 2.0, 0.0, -20.0],
            [0.0, 0.0, 2.0, -30.0],
        ];
        header.pixdim = [1.0, 2.0, 2.0, 2.0, 0.0, 0.0, 0.0, 0.0];
        header.qform_code = 1;
        header.qoffset = [-10.0, -20.0, -30.0];

        header.translate_origin([1, 2, 3], 1.0);
        assert_eq!(header.srow[0][3], -8.0);
        assert_eq!(header.srow[1][3], -16.0);
        assert_eq!(header.srow[2][3], -24.0);
        assert_eq!(header.qoffset, [-8.0, -16.0, -24.0]);

        header.translate_origin([1, 2, 3], -1.0);
        assert_eq!(header.srow[2][3], -30.0);
        assert_eq!(header.qoffset, [-10.0, -20.0, -30.0]);
    }

    #[test]
    fn test_translate_origin_without_transform_sets_sform() {
        let mut header = NiftiHeader::default();
        header.sform_code = 0;
        header.pixdim = [1.0, 1.5, 1.5, 1.5, 0.0, 0.0, 0.0, 0.0];
        header.translate_origin([2, 0, 4], 1.0);
        assert_eq!(header.sform_code, 1);
        assert_eq!(header.affine()[0][3], 3.0);
        assert_eq!(header.affine()[2][3], 6.0);
    }

    #[test]
    fn test_scaling_treats_zero_slope_as_identity() {
        let mut header = NiftiHeader::default();
        header.scl_slope = 0.0;
        header.scl_inter = 5.0;
        assert_eq!(header.scaling(), (1.0, 0.0));
        header.scl_slope = 2.0;
        assert_eq!(header.scaling(), (2.0, 5.0));
    }
}
