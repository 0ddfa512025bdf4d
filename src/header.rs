//! GIF file structure: signatures, block introducers, the logical screen
//! descriptor, and color tables.
//!
//! Layout of the fixed header:
//! - Signature: "GIF87a" or "GIF89a" (6 bytes)
//! - Logical screen descriptor: width, height (little-endian u16 each),
//!   packed fields, background color index, pixel aspect ratio (7 bytes)
//! - Optional global color table of `2^(N+1)` RGB triples, where `N` is the
//!   low 3 bits of the packed fields

use crate::canvas::pack_rgb;
use crate::error::{GifError, Result};
use crate::reader::PagedFile;

/// GIF87a file signature.
pub const GIF87A_SIGNATURE: &[u8; 6] = b"GIF87a";
/// GIF89a file signature.
pub const GIF89A_SIGNATURE: &[u8; 6] = b"GIF89a";

/// Image descriptor introducer byte.
pub const IMAGE_SEPARATOR: u8 = 0x2C;
/// Extension introducer byte.
pub const EXTENSION_INTRODUCER: u8 = 0x21;
/// File trailer byte.
pub const TRAILER: u8 = 0x3B;

/// Graphic control extension label.
pub const GRAPHIC_CONTROL_LABEL: u8 = 0xF9;
/// Comment extension label.
pub const COMMENT_LABEL: u8 = 0xFE;
/// Application extension label.
pub const APPLICATION_LABEL: u8 = 0xFF;
/// Plain text extension label.
pub const PLAIN_TEXT_LABEL: u8 = 0x01;

/// Application identifier that marks a looping animation.
pub const NETSCAPE_IDENTIFIER: &[u8] = b"NETSCAPE2.0";

/// GIF format version, taken from the file signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GifVersion {
    /// The original 1987 format.
    Gif87a,
    /// The 1989 revision with extensions.
    Gif89a,
}

impl GifVersion {
    /// Match a 6-byte signature against the known versions.
    pub fn from_signature(signature: &[u8]) -> Option<Self> {
        if signature == GIF87A_SIGNATURE {
            Some(GifVersion::Gif87a)
        } else if signature == GIF89A_SIGNATURE {
            Some(GifVersion::Gif89a)
        } else {
            None
        }
    }

    /// The signature string for this version.
    pub fn as_str(&self) -> &'static str {
        match self {
            GifVersion::Gif87a => "GIF87a",
            GifVersion::Gif89a => "GIF89a",
        }
    }
}

/// Parsed logical screen descriptor.
#[derive(Debug, Clone)]
pub(crate) struct ScreenDescriptor {
    /// Canvas width, nonzero.
    pub width: u16,
    /// Canvas height, nonzero.
    pub height: u16,
    /// Whether a global color table follows.
    pub has_global_table: bool,
    /// Size field of the global table (table holds `2^(field+1)` entries).
    pub table_size_field: u8,
}

impl ScreenDescriptor {
    /// Parse the 7-byte descriptor at the cursor.
    ///
    /// The background color index and pixel aspect ratio are skipped.
    pub fn parse(reader: &mut PagedFile) -> Result<Self> {
        let width = reader.read_u16()?;
        let height = reader.read_u16()?;
        let packed = reader.read_u8()?;
        reader.skip(2)?;

        if width == 0 || height == 0 {
            return Err(GifError::InvalidScreenSize { width, height });
        }

        Ok(Self {
            width,
            height,
            has_global_table: packed & 0x80 != 0,
            table_size_field: packed & 0x07,
        })
    }
}

/// Read a color table of `2^(size_field + 1)` entries at the cursor.
///
/// Entries are packed as `0xRRGGBB`, never negative.
pub(crate) fn parse_color_table(reader: &mut PagedFile, size_field: u8) -> Result<Vec<i32>> {
    let entries = 1usize << (size_field + 1);
    let raw = reader.read_bytes(entries * 3)?;
    Ok(raw
        .chunks_exact(3)
        .map(|rgb| pack_rgb(rgb[0], rgb[1], rgb[2]))
        .collect())
}
