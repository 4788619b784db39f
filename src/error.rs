//! Error types shared by the codec, the cropper and the preprocessing driver.

use std::path::PathBuf;

use thiserror::Error;

use crate::experiment::UnsupportedCombination;

/// Errors produced by tractcrop.
#[derive(Error, Debug)]
pub enum Error {
    /// Underlying filesystem or stream failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file does not start with a NIfTI-1 header.
    #[error("invalid NIfTI magic bytes {0:?}")]
    InvalidMagic([u8; 4]),

    /// Datatype code outside the supported set.
    #[error("unsupported data type code {0}")]
    UnsupportedDataType(i16),

    /// Header dimensions or array shape are inconsistent.
    #[error("invalid dimensions: {0}")]
    InvalidDimensions(String),

    /// A bounding box does not fit the volume it is applied to.
    #[error("invalid crop region: {0}")]
    InvalidCropRegion(String),

    /// The file is a recognised but unsupported variant of the format.
    #[error("invalid file format: {0}")]
    InvalidFileFormat(String),

    /// Gzip stream could not be decoded.
    #[error("decompression failed: {0}")]
    Decompression(String),

    /// Bad settings, arguments or directory layout.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A channel file declared as required does not exist.
    #[error("required input missing: {}", path.display())]
    MissingInput {
        /// Path that was expected to exist.
        path: PathBuf,
    },

    /// A worker panicked while processing one subject.
    #[error("worker panicked: {0}")]
    Panicked(String),

    /// The experiment flags name no available configuration.
    #[error(transparent)]
    Unsupported(#[from] UnsupportedCombination),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
