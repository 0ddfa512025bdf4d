//! Paged random-access file reader.
//!
//! The decoder walks a GIF mostly forward but seeks backward when an
//! animation loops and during the metadata scan. [`PagedFile`] serves both
//! patterns from a small cache of fixed-size pages so that re-reading the
//! first frame never re-reads the whole file.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::{GifError, Result};

/// Size of one cache page in bytes.
pub const PAGE_SIZE: u64 = 32 * 1024;

/// Number of pages kept in memory.
const PAGE_CAPACITY: usize = 3;

/// One cached page of the file.
#[derive(Debug)]
struct Page {
    /// Page index (`file offset / PAGE_SIZE`).
    index: u64,
    /// Page contents; shorter than `PAGE_SIZE` only for the final page.
    data: Vec<u8>,
}

/// Random-access byte reader over an opened file with an LRU page cache.
///
/// All multi-byte integers are read little-endian, as the GIF format
/// requires. The logical cursor moves freely with [`jump`](Self::jump) and
/// [`skip`](Self::skip); bounds are enforced when a read actually happens.
#[derive(Debug)]
pub struct PagedFile {
    file: File,
    size: u64,
    pos: u64,
    /// Cached pages, least recently used first.
    pages: Vec<Page>,
}

impl PagedFile {
    /// Open `path` read-only and capture its total size.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            file,
            size,
            pos: 0,
            pages: Vec::with_capacity(PAGE_CAPACITY),
        })
    }

    /// Total file size in bytes.
    pub fn len(&self) -> u64 {
        self.size
    }

    /// Whether the file is empty.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Current logical cursor position.
    pub fn offset(&self) -> u64 {
        self.pos
    }

    /// Move the cursor to an absolute offset.
    pub fn jump(&mut self, offset: u64) {
        self.pos = offset;
    }

    /// Move the cursor by a relative amount, which may be negative.
    pub fn skip(&mut self, n: i64) -> Result<()> {
        self.pos = self.pos.checked_add_signed(n).ok_or_else(|| {
            GifError::InvalidParameter(format!("skip({n}) moves cursor before start of file"))
        })?;
        Ok(())
    }

    /// Read one unsigned byte at the cursor.
    pub fn read_u8(&mut self) -> Result<u8> {
        if self.pos >= self.size {
            return Err(GifError::UnexpectedEnd { offset: self.pos });
        }
        let slot = self.load_page(self.pos / PAGE_SIZE)?;
        let byte = self.pages[slot].data[(self.pos % PAGE_SIZE) as usize];
        self.pos += 1;
        Ok(byte)
    }

    /// Read one little-endian unsigned 16-bit integer at the cursor.
    pub fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Read `n` little-endian unsigned 16-bit integers at the cursor.
    pub fn read_u16s(&mut self, n: usize) -> Result<Vec<u16>> {
        let bytes = self.read_bytes(n * 2)?;
        Ok(bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect())
    }

    /// Read `n` raw bytes at the cursor.
    ///
    /// Fails with [`GifError::UnexpectedEnd`] when the run would pass the
    /// end of the file; the cursor is left unchanged in that case.
    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        let end = self
            .pos
            .checked_add(n as u64)
            .ok_or(GifError::UnexpectedEnd { offset: self.pos })?;
        if end > self.size {
            return Err(GifError::UnexpectedEnd { offset: self.pos });
        }

        let mut out = Vec::with_capacity(n);
        while out.len() < n {
            let slot = self.load_page(self.pos / PAGE_SIZE)?;
            let page_off = (self.pos % PAGE_SIZE) as usize;
            let page = &self.pages[slot].data;
            let take = (n - out.len()).min(page.len() - page_off);
            out.extend_from_slice(&page[page_off..page_off + take]);
            self.pos += take as u64;
        }
        Ok(out)
    }

    /// Release the file handle and the page cache.
    pub fn close(self) {}

    /// Ensure the page is cached and return its slot, updating LRU order.
    ///
    /// The most recently used page sits at the end of `pages`; a hit is
    /// moved there unless it already is, a miss evicts the front slot when
    /// the cache is full.
    fn load_page(&mut self, index: u64) -> Result<usize> {
        if let Some(slot) = self.pages.iter().position(|p| p.index == index) {
            if slot + 1 != self.pages.len() {
                let page = self.pages.remove(slot);
                self.pages.push(page);
            }
            return Ok(self.pages.len() - 1);
        }

        let start = index * PAGE_SIZE;
        debug_assert!(start < self.size, "page {index} past end of file");
        let len = (self.size - start).min(PAGE_SIZE) as usize;
        let mut data = vec![0u8; len];
        self.file.seek(SeekFrom::Start(start))?;
        self.file.read_exact(&mut data)?;

        if self.pages.len() == PAGE_CAPACITY {
            self.pages.remove(0);
        }
        self.pages.push(Page { index, data });
        Ok(self.pages.len() - 1)
    }
}
