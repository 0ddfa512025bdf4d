//! GIF-specific error types.
//!
//! Errors fall into three families the caller can tell apart by variant:
//! I/O failures ([`GifError::Io`]), malformed input (everything from
//! [`GifError::InvalidSignature`] through [`GifError::NoImages`]), and
//! caller mistakes ([`GifError::InvalidParameter`]).

use thiserror::Error;

/// GIF decoding errors.
#[derive(Error, Debug)]
pub enum GifError {
    /// Underlying file open, seek, or read failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file does not start with a "GIF87a" or "GIF89a" signature.
    #[error("invalid GIF signature")]
    InvalidSignature,

    /// The logical screen descriptor carries a zero dimension.
    #[error("invalid logical screen size: {width}x{height}")]
    InvalidScreenSize {
        /// Declared screen width.
        width: u16,
        /// Declared screen height.
        height: u16,
    },

    /// A read would pass the end of the file.
    #[error("unexpected end of file at offset {offset}")]
    UnexpectedEnd {
        /// Byte offset at which the read started.
        offset: u64,
    },

    /// An unknown block introducer was encountered.
    #[error("unexpected block introducer {introducer:#04x} at offset {offset}")]
    UnexpectedBlock {
        /// The introducer byte that was read.
        introducer: u8,
        /// Byte offset of the introducer.
        offset: u64,
    },

    /// A graphic control extension had a bad block size or terminator.
    #[error("malformed graphic control extension at offset {offset}")]
    InvalidGraphicControl {
        /// Byte offset of the extension body.
        offset: u64,
    },

    /// An image rectangle is empty or lies partly outside the logical screen.
    #[error("image rectangle {width}x{height} at ({left}, {top}) does not fit the screen")]
    FrameOutOfBounds {
        /// Image left edge.
        left: u16,
        /// Image top edge.
        top: u16,
        /// Image width.
        width: u16,
        /// Image height.
        height: u16,
    },

    /// An image has neither a local nor a global color table.
    #[error("image has no color table")]
    MissingColorTable,

    /// The LZW minimum code size is outside 2..=8.
    #[error("invalid LZW minimum code size {0}")]
    InvalidMinCodeSize(u8),

    /// The compressed stream did not start with a clear code.
    #[error("LZW stream does not start with a clear code")]
    MissingClearCode,

    /// A compressed code referenced a dictionary entry that does not exist yet.
    #[error("LZW code {code} exceeds dictionary size {size}")]
    InvalidLzwCode {
        /// The offending code.
        code: u16,
        /// Number of defined dictionary entries.
        size: u16,
    },

    /// The sub-block chain ended in the middle of a code.
    #[error("image data truncated at offset {offset}")]
    TruncatedImage {
        /// Byte offset at which data ran out.
        offset: u64,
    },

    /// Data remained after the end-of-information code.
    #[error("trailing data after end of image at offset {offset}")]
    TrailingData {
        /// Byte offset of the surplus data.
        offset: u64,
    },

    /// The pixel stream did not match the image dimensions.
    #[error("decoded pixel data does not cover {expected} pixels")]
    WrongPixelCount {
        /// Pixel count the image descriptor promised.
        expected: u32,
    },

    /// A color index fell outside the active palette.
    #[error("color index {index} outside palette of {size} entries")]
    InvalidColorIndex {
        /// The out-of-range index.
        index: u8,
        /// Palette length.
        size: usize,
    },

    /// The file contains no image descriptor.
    #[error("file contains no images")]
    NoImages,

    /// A caller-supplied argument was out of range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Result type for GIF operations.
pub type Result<T> = std::result::Result<T, GifError>;
