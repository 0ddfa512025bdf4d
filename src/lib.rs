//! # gifdec
//!
//! A decoder for the GIF image format (GIF87a and GIF89a).
//!
//! The decoder reads a GIF from a file and produces each animation frame on
//! demand as a grid of `0xRRGGBB` colors, composed onto a persistent canvas
//! with the format's disposal semantics (keep, restore to background,
//! restore to previous). File reads go through a small LRU cache of 32 KiB
//! pages, so looping an animation back to its first frame does not re-read
//! the whole file.
//!
//! ## Features
//!
//! - GIF87a and GIF89a, interlaced and non-interlaced images
//! - Streaming LZW decompression over sub-block chains
//! - Frame composition with disposal methods and transparency
//! - File metadata: comment, loop flag, frame count, per-frame delay
//!
//! ## Example
//!
//! ```no_run
//! use gifdec::{GifDecoder, LoopMode};
//!
//! # fn main() -> gifdec::Result<()> {
//! let mut decoder = GifDecoder::open("animation.gif")?;
//! let (width, height) = decoder.dimensions();
//! println!("{}x{}, {} frames", width, height,
//!          decoder.file_parameters()?.image_count);
//!
//! loop {
//!     let frame = decoder.read_matrix();
//!     let params = decoder.image_parameters();
//!     println!("frame {} ({} ms): top-left pixel {:06x}",
//!              params.image_no, params.delay_ms, frame.get(0, 0));
//!     if !decoder.next_image(LoopMode::Never)? {
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod canvas;
pub mod decoder;
pub mod error;
pub mod header;
mod lzw;
pub mod reader;

pub use canvas::{Canvas, TRANSPARENT};
pub use decoder::{FileParameters, GifDecoder, ImageParameters, LoopMode};
pub use error::{GifError, Result};
pub use header::GifVersion;
