//! GIF decoder implementation.
//!
//! [`GifDecoder`] walks the block structure of a GIF87a/GIF89a file, feeds
//! image data through the LZW decompressor, and composes frames onto a
//! persistent canvas with the GIF disposal semantics. Frames are loaded one
//! at a time; looping re-seeks to the first frame through the paged reader.

use std::path::Path;

use crate::canvas::{next_row, Canvas, Rect, TRANSPARENT};
use crate::error::{GifError, Result};
use crate::header::{
    parse_color_table, GifVersion, ScreenDescriptor, APPLICATION_LABEL, COMMENT_LABEL,
    EXTENSION_INTRODUCER, GRAPHIC_CONTROL_LABEL, IMAGE_SEPARATOR, NETSCAPE_IDENTIFIER,
    PLAIN_TEXT_LABEL, TRAILER,
};
use crate::lzw::LzwDecoder;
use crate::reader::PagedFile;

/// What to do when `next_image` runs past the last frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    /// Stop at the last frame.
    #[default]
    Never,
    /// Always wrap around to the first frame.
    Always,
    /// Wrap around only when the file declares itself looped.
    Play,
}

/// File-wide metadata gathered from a full walk of the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileParameters {
    /// Concatenated text of the first comment extension, if any.
    pub comment: Option<String>,
    /// Whether a NETSCAPE2.0 application extension is present.
    pub looped: bool,
    /// Number of image descriptors in the file.
    pub image_count: u32,
}

/// Metadata of the currently loaded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageParameters {
    /// 1-based index of the loaded frame.
    pub image_no: u32,
    /// Delay before the next frame, in milliseconds.
    pub delay_ms: u32,
}

/// Disposal method for the frame that carries it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Disposal {
    /// Leave the frame in place; the next frame composes over it.
    #[default]
    Combine,
    /// Erase the frame's rectangle to transparent before the next frame.
    Erase,
    /// Restore the canvas to its state before this frame.
    Undo,
}

/// Graphic control state, consumed by the image that follows it.
#[derive(Debug, Clone, Copy)]
struct GraphicControl {
    disposal: Disposal,
    transparent_index: Option<u8>,
    delay_ms: u32,
}

impl Default for GraphicControl {
    fn default() -> Self {
        Self {
            disposal: Disposal::Combine,
            transparent_index: None,
            delay_ms: 0,
        }
    }
}

/// Whether a block walk decodes images or only gathers metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WalkMode {
    Decode,
    Scan,
}

/// What the walker found at the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockOutcome {
    Image,
    Metadata,
    Trailer,
}

/// Streaming GIF decoder over a file.
///
/// Opening eagerly loads the first frame; [`next_image`](Self::next_image)
/// advances through the animation. The grid returned by
/// [`read_matrix`](Self::read_matrix) always reflects the most recently
/// loaded frame.
///
/// The decoder owns its file handle and page cache exclusively and is not
/// meant to be shared across threads.
#[derive(Debug)]
pub struct GifDecoder {
    reader: PagedFile,
    version: GifVersion,
    width: u16,
    height: u16,
    global_palette: Option<Vec<i32>>,
    /// Offset of the first block after the header and global palette.
    first_frame_offset: u64,

    /// What `read_matrix` returns.
    current: Canvas,
    /// What the next frame composes over.
    background: Canvas,
    /// Deferred erase from the previous frame's disposal.
    pending_erase: Option<Rect>,
    /// 1-based index of the loaded frame, 0 before any load.
    loaded_frame_no: u32,
    /// Delay of the loaded frame in milliseconds.
    delay_ms: u32,
    /// Graphic control waiting for its image.
    gce: Option<GraphicControl>,

    comment: Option<String>,
    looped: bool,
    image_count: u32,
    /// Highest block offset whose metadata has been accounted for; walks
    /// that revisit earlier offsets never double-count.
    counted_up_to: u64,
    file_params: Option<FileParameters>,
}

impl GifDecoder {
    /// Open a GIF file and load its first frame.
    ///
    /// Fails when the signature or logical screen descriptor is malformed,
    /// or when the file contains no image.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut reader = PagedFile::open(path)?;

        let signature = reader.read_bytes(6)?;
        let version =
            GifVersion::from_signature(&signature).ok_or(GifError::InvalidSignature)?;
        let screen = ScreenDescriptor::parse(&mut reader)?;
        let global_palette = if screen.has_global_table {
            Some(parse_color_table(&mut reader, screen.table_size_field)?)
        } else {
            None
        };
        let first_frame_offset = reader.offset();

        tracing::debug!(
            "opened {} file, logical screen {}x{}",
            version.as_str(),
            screen.width,
            screen.height
        );

        let mut decoder = Self {
            reader,
            version,
            width: screen.width,
            height: screen.height,
            global_palette,
            first_frame_offset,
            current: Canvas::new(screen.width, screen.height),
            background: Canvas::new(screen.width, screen.height),
            pending_erase: Some(Rect {
                left: 0,
                top: 0,
                width: screen.width,
                height: screen.height,
            }),
            loaded_frame_no: 0,
            delay_ms: 0,
            gce: None,
            comment: None,
            looped: false,
            image_count: 0,
            counted_up_to: 0,
            file_params: None,
        };
        decoder.advance()?;
        Ok(decoder)
    }

    /// Logical screen dimensions as `(width, height)`.
    pub fn dimensions(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    /// The format version from the file signature.
    pub fn version(&self) -> GifVersion {
        self.version
    }

    /// File-wide metadata: comment, loop flag, and image count.
    ///
    /// The first call scans the rest of the file (the cursor is saved and
    /// restored, and in-progress decoding is unaffected); the result is
    /// cached, so later calls are O(1).
    pub fn file_parameters(&mut self) -> Result<FileParameters> {
        if let Some(params) = &self.file_params {
            return Ok(params.clone());
        }

        let saved = self.reader.offset();
        tracing::debug!("scanning file metadata from offset {saved}");
        let scan = self.scan_to_trailer();
        self.reader.jump(saved);
        scan?;
        Ok(self
            .file_params
            .clone()
            .expect("trailer populates file parameters"))
    }

    /// A copy of the full canvas for the loaded frame.
    ///
    /// Cells hold `0xRRGGBB` colors or [`TRANSPARENT`]; see [`Canvas`] for
    /// the grid layout.
    pub fn read_matrix(&self) -> Canvas {
        self.current.clone()
    }

    /// A copy of a subrectangle of the canvas, 0-based coordinates.
    ///
    /// Fails with [`GifError::InvalidParameter`] when the rectangle is
    /// empty or reaches outside the logical screen.
    pub fn read_region(&self, x: u16, y: u16, width: u16, height: u16) -> Result<Canvas> {
        if width == 0
            || height == 0
            || x as u32 + width as u32 > self.width as u32
            || y as u32 + height as u32 > self.height as u32
        {
            return Err(GifError::InvalidParameter(format!(
                "region {width}x{height} at ({x}, {y}) outside {}x{} screen",
                self.width, self.height
            )));
        }
        Ok(self.current.region(x, y, width, height))
    }

    /// Index and delay of the loaded frame.
    pub fn image_parameters(&self) -> ImageParameters {
        ImageParameters {
            image_no: self.loaded_frame_no,
            delay_ms: self.delay_ms,
        }
    }

    /// Load the next frame, returning whether one was loaded.
    ///
    /// Past the last frame the behavior depends on `mode`: `Never` returns
    /// false, `Always` wraps to the first frame, `Play` wraps only for a
    /// looped file. Wrapping resets the canvases and reloads frame 1, so a
    /// wrapped walk replays the animation exactly.
    pub fn next_image(&mut self, mode: LoopMode) -> Result<bool> {
        loop {
            match self.process_block(WalkMode::Decode)? {
                BlockOutcome::Image => return Ok(true),
                BlockOutcome::Metadata => continue,
                BlockOutcome::Trailer => break,
            }
        }

        let wrap = match mode {
            LoopMode::Never => false,
            LoopMode::Always => true,
            LoopMode::Play => self.looped,
        };
        if !wrap {
            return Ok(false);
        }
        self.rewind()?;
        Ok(true)
    }

    /// Release the canvases, page cache, and file handle.
    pub fn close(self) {}

    /// Walk blocks until an image has been decoded.
    fn advance(&mut self) -> Result<()> {
        loop {
            match self.process_block(WalkMode::Decode)? {
                BlockOutcome::Image => return Ok(()),
                BlockOutcome::Metadata => continue,
                BlockOutcome::Trailer => return Err(GifError::NoImages),
            }
        }
    }

    /// Walk blocks in scan mode until the trailer.
    fn scan_to_trailer(&mut self) -> Result<()> {
        while self.process_block(WalkMode::Scan)? != BlockOutcome::Trailer {}
        Ok(())
    }

    /// Reset composition state and reload frame 1.
    fn rewind(&mut self) -> Result<()> {
        tracing::debug!(
            "wrapping animation, seeking back to offset {}",
            self.first_frame_offset
        );
        self.current.clear();
        self.background.clear();
        self.pending_erase = Some(Rect {
            left: 0,
            top: 0,
            width: self.width,
            height: self.height,
        });
        self.loaded_frame_no = 0;
        self.delay_ms = 0;
        self.gce = None;
        self.reader.jump(self.first_frame_offset);
        self.advance()
    }

    /// Read one block at the cursor and dispatch on its introducer.
    ///
    /// Metadata effects (image count, comment, loop flag) are applied only
    /// for offsets beyond `counted_up_to`, so decode walks and metadata
    /// scans can overlap without double-counting.
    fn process_block(&mut self, mode: WalkMode) -> Result<BlockOutcome> {
        let at = self.reader.offset();
        let unseen = at > self.counted_up_to;
        let introducer = self.reader.read_u8()?;

        match introducer {
            TRAILER => {
                // Stay positioned on the trailer so further calls see it too.
                self.reader.skip(-1)?;
                if self.file_params.is_none() {
                    self.file_params = Some(FileParameters {
                        comment: self.comment.clone(),
                        looped: self.looped,
                        image_count: self.image_count,
                    });
                    tracing::debug!(
                        "reached trailer, {} images, looped: {}",
                        self.image_count,
                        self.looped
                    );
                }
                Ok(BlockOutcome::Trailer)
            }
            IMAGE_SEPARATOR => {
                match mode {
                    WalkMode::Decode => self.decode_frame()?,
                    WalkMode::Scan => self.skip_image()?,
                }
                if unseen {
                    self.image_count += 1;
                    self.counted_up_to = at;
                }
                Ok(BlockOutcome::Image)
            }
            EXTENSION_INTRODUCER => {
                let label = self.reader.read_u8()?;
                match label {
                    GRAPHIC_CONTROL_LABEL => {
                        let control = parse_graphic_control(&mut self.reader)?;
                        if mode == WalkMode::Decode {
                            self.gce = Some(control);
                        }
                    }
                    COMMENT_LABEL => {
                        let text = read_sub_blocks_string(&mut self.reader)?;
                        if unseen {
                            if self.comment.is_none() {
                                self.comment = Some(text);
                            } else {
                                tracing::debug!("ignoring extra comment extension at offset {at}");
                            }
                        }
                    }
                    APPLICATION_LABEL => {
                        let len = self.reader.read_u8()?;
                        let identifier = self.reader.read_bytes(len as usize)?;
                        if identifier == NETSCAPE_IDENTIFIER {
                            self.looped = true;
                        }
                        skip_sub_blocks(&mut self.reader)?;
                    }
                    PLAIN_TEXT_LABEL => skip_sub_blocks(&mut self.reader)?,
                    _ => skip_sub_blocks(&mut self.reader)?,
                }
                if unseen {
                    self.counted_up_to = at;
                }
                Ok(BlockOutcome::Metadata)
            }
            other => Err(GifError::UnexpectedBlock {
                introducer: other,
                offset: at,
            }),
        }
    }

    /// Decode the image at the cursor and compose it onto the canvas.
    fn decode_frame(&mut self) -> Result<()> {
        let coords = self.reader.read_u16s(4)?;
        let (left, top, frame_w, frame_h) = (coords[0], coords[1], coords[2], coords[3]);
        let packed = self.reader.read_u8()?;
        let has_local_table = packed & 0x80 != 0;
        let interlaced = packed & 0x40 != 0;
        let table_size_field = packed & 0x07;

        if frame_w == 0
            || frame_h == 0
            || left as u32 + frame_w as u32 > self.width as u32
            || top as u32 + frame_h as u32 > self.height as u32
        {
            return Err(GifError::FrameOutOfBounds {
                left,
                top,
                width: frame_w,
                height: frame_h,
            });
        }

        let palette = if has_local_table {
            parse_color_table(&mut self.reader, table_size_field)?
        } else {
            self.global_palette
                .clone()
                .ok_or(GifError::MissingColorTable)?
        };

        let control = self.gce.take().unwrap_or_default();
        let min_code_size = self.reader.read_u8()?;
        if !(2..=8).contains(&min_code_size) {
            return Err(GifError::InvalidMinCodeSize(min_code_size));
        }

        // Disposal of the previous frame, deferred until now.
        if let Some(rect) = self.pending_erase.take() {
            self.background.fill_rect(rect, TRANSPARENT);
        }
        self.current.copy_from(&self.background);

        let expected = frame_w as u32 * frame_h as u32;
        let mut lzw = LzwDecoder::new(&mut self.reader, min_code_size, expected);
        let mut y = 0u16;
        loop {
            for x in 0..frame_w {
                let index = lzw
                    .next_index()?
                    .ok_or(GifError::WrongPixelCount { expected })?;
                if Some(index) == control.transparent_index {
                    continue;
                }
                let color = *palette.get(index as usize).ok_or_else(|| {
                    GifError::InvalidColorIndex {
                        index,
                        size: palette.len(),
                    }
                })?;
                self.current.set(left + x, top + y, color);
            }
            match next_row(y, frame_h, interlaced) {
                Some(next) => y = next,
                None => break,
            }
        }
        lzw.finish()?;

        let rect = Rect {
            left,
            top,
            width: frame_w,
            height: frame_h,
        };
        match control.disposal {
            Disposal::Combine => self.background.copy_rect_from(&self.current, rect),
            Disposal::Erase => {
                self.background.copy_rect_from(&self.current, rect);
                self.pending_erase = Some(rect);
            }
            Disposal::Undo => {}
        }

        self.loaded_frame_no += 1;
        self.delay_ms = control.delay_ms;
        tracing::debug!(
            "loaded frame {}: {}x{} at ({}, {}), disposal {:?}",
            self.loaded_frame_no,
            frame_w,
            frame_h,
            left,
            top,
            control.disposal
        );
        Ok(())
    }

    /// Skip the image at the cursor without decoding it.
    fn skip_image(&mut self) -> Result<()> {
        self.reader.skip(8)?;
        let packed = self.reader.read_u8()?;
        if packed & 0x80 != 0 {
            let entries = 1i64 << ((packed & 0x07) + 1);
            self.reader.skip(entries * 3)?;
        }
        self.reader.skip(1)?;
        skip_sub_blocks(&mut self.reader)
    }
}

/// Parse a graphic control extension body at the cursor.
fn parse_graphic_control(reader: &mut PagedFile) -> Result<GraphicControl> {
    let at = reader.offset();
    let block_size = reader.read_u8()?;
    if block_size != 4 {
        return Err(GifError::InvalidGraphicControl { offset: at });
    }
    let fields = reader.read_u8()?;
    let delay_centis = reader.read_u16()?;
    let transparent = reader.read_u8()?;
    let terminator = reader.read_u8()?;
    if terminator != 0 {
        return Err(GifError::InvalidGraphicControl { offset: at });
    }

    // Values 0 ("unspecified") and 1 ("keep") both mean composing over the
    // previous frame; reserved values fall back to the same.
    let disposal = match (fields >> 2) & 0x07 {
        2 => Disposal::Erase,
        3 => Disposal::Undo,
        _ => Disposal::Combine,
    };
    let transparent_index = (fields & 0x01 != 0).then_some(transparent);

    Ok(GraphicControl {
        disposal,
        transparent_index,
        delay_ms: delay_centis as u32 * 10,
    })
}

/// Consume a sub-block chain, discarding its contents.
fn skip_sub_blocks(reader: &mut PagedFile) -> Result<()> {
    loop {
        let len = reader.read_u8()?;
        if len == 0 {
            return Ok(());
        }
        reader.skip(len as i64)?;
    }
}

/// Consume a sub-block chain and concatenate its contents as text.
fn read_sub_blocks_string(reader: &mut PagedFile) -> Result<String> {
    let mut bytes = Vec::new();
    loop {
        let len = reader.read_u8()?;
        if len == 0 {
            break;
        }
        bytes.extend_from_slice(&reader.read_bytes(len as usize)?);
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
