//! LZW decompression of GIF image data.
//!
//! Image data arrives as a sub-block chain whose payload is a stream of
//! variable-width codes, packed LSB-first across byte and sub-block
//! boundaries. [`LzwDecoder`] pulls bytes on demand, maintains the phrase
//! dictionary, and emits one color index at a time.
//!
//! The dictionary entry for a new phrase is added as soon as its prefix
//! code is seen, with the final pixel left unresolved until the next phrase
//! supplies it. A code referencing that still-incomplete entry is the
//! classic KwKwK case: its first and last pixels are the first pixel of the
//! previous phrase.

use crate::error::{GifError, Result};
use crate::reader::PagedFile;

/// Dictionary capacity; codes never grow past 12 bits.
const MAX_CODES: usize = 4096;
const MAX_CODE_WIDTH: u32 = 12;

/// Byte source over a sub-block chain, pulling from the paged reader.
struct SubBlockReader<'a> {
    reader: &'a mut PagedFile,
    /// Bytes left in the current sub-block.
    remaining: u8,
    /// Whether the zero-length terminator has been consumed.
    done: bool,
}

impl<'a> SubBlockReader<'a> {
    fn new(reader: &'a mut PagedFile) -> Self {
        Self {
            reader,
            remaining: 0,
            done: false,
        }
    }

    /// The next payload byte, or `None` once the terminator is reached.
    fn next_byte(&mut self) -> Result<Option<u8>> {
        if self.done {
            return Ok(None);
        }
        while self.remaining == 0 {
            let len = self.reader.read_u8()?;
            if len == 0 {
                self.done = true;
                return Ok(None);
            }
            self.remaining = len;
        }
        self.remaining -= 1;
        Ok(Some(self.reader.read_u8()?))
    }

    /// Consume the rest of the chain after the end-of-information code.
    ///
    /// Any bytes still in flight must be zero padding and the chain must
    /// terminate immediately; anything else is trailing garbage.
    fn finish(&mut self) -> Result<()> {
        while self.remaining > 0 {
            self.remaining -= 1;
            if self.reader.read_u8()? != 0 {
                return Err(GifError::TrailingData {
                    offset: self.reader.offset() - 1,
                });
            }
        }
        if !self.done {
            let len = self.reader.read_u8()?;
            if len != 0 {
                return Err(GifError::TrailingData {
                    offset: self.reader.offset() - 1,
                });
            }
            self.done = true;
        }
        Ok(())
    }

    fn offset(&self) -> u64 {
        self.reader.offset()
    }
}

/// Streaming LZW decoder for one image.
pub(crate) struct LzwDecoder<'a> {
    source: SubBlockReader<'a>,
    clear_code: u16,
    end_code: u16,
    min_width: u32,
    /// Current code width in bits.
    width: u32,
    /// First code value that does not fit the current width.
    limit: u16,
    /// Next free dictionary slot.
    next_free: u16,
    prefix: Box<[u16; MAX_CODES]>,
    pixel: Box<[u8; MAX_CODES]>,
    /// The most recently added entry still lacks its pixel.
    pending: bool,
    /// LSB-first bit accumulator.
    acc: u32,
    acc_bits: u32,
    /// Pixels of the current phrase, last pixel first; popped in order.
    phrase: Vec<u8>,
    /// Pixel count the image descriptor promised.
    expected: u32,
    started: bool,
    finished: bool,
}

impl<'a> LzwDecoder<'a> {
    /// Start decoding at the reader's cursor.
    ///
    /// `min_code_size` must already be validated to 2..=8; `expected` is the
    /// number of indices the image needs.
    pub(crate) fn new(reader: &'a mut PagedFile, min_code_size: u8, expected: u32) -> Self {
        let clear_code = 1u16 << min_code_size;
        let min_width = min_code_size as u32;
        Self {
            source: SubBlockReader::new(reader),
            clear_code,
            end_code: clear_code + 1,
            min_width,
            width: min_width + 1,
            limit: 1 << (min_width + 1),
            next_free: clear_code + 2,
            prefix: Box::new([0; MAX_CODES]),
            pixel: Box::new([0; MAX_CODES]),
            pending: false,
            acc: 0,
            acc_bits: 0,
            phrase: Vec::with_capacity(64),
            expected,
            started: false,
            finished: false,
        }
    }

    /// The next color index, or `None` after the end-of-information code.
    pub(crate) fn next_index(&mut self) -> Result<Option<u8>> {
        loop {
            if let Some(px) = self.phrase.pop() {
                return Ok(Some(px));
            }
            if self.finished {
                return Ok(None);
            }

            let code = self.read_code()?;
            if !self.started {
                if code != self.clear_code {
                    return Err(GifError::MissingClearCode);
                }
                self.started = true;
                self.reset();
                continue;
            }
            if code == self.clear_code {
                self.reset();
            } else if code == self.end_code {
                self.finish_stream()?;
                self.finished = true;
                return Ok(None);
            } else {
                self.decode_phrase(code)?;
            }
        }
    }

    /// Validate the end of the stream once all pixels are consumed.
    ///
    /// Fails when the phrase buffer still holds pixels or more data codes
    /// follow (both mean the stream carries surplus pixels), or when the
    /// chain does not terminate cleanly after the end code.
    pub(crate) fn finish(&mut self) -> Result<()> {
        if !self.phrase.is_empty() {
            return Err(GifError::WrongPixelCount {
                expected: self.expected,
            });
        }
        while !self.finished {
            let code = self.read_code()?;
            if code == self.clear_code {
                self.reset();
            } else if code == self.end_code {
                self.finish_stream()?;
                self.finished = true;
            } else {
                return Err(GifError::WrongPixelCount {
                    expected: self.expected,
                });
            }
        }
        Ok(())
    }

    /// Reset dictionary state after a clear code (or the initial one).
    fn reset(&mut self) {
        self.width = self.min_width + 1;
        self.limit = 1 << self.width;
        self.next_free = self.clear_code + 2;
        self.pending = false;
    }

    /// Pull bytes until a full code is buffered, then extract it.
    fn read_code(&mut self) -> Result<u16> {
        while self.acc_bits < self.width {
            match self.source.next_byte()? {
                Some(byte) => {
                    self.acc |= (byte as u32) << self.acc_bits;
                    self.acc_bits += 8;
                }
                None => {
                    return Err(GifError::TruncatedImage {
                        offset: self.source.offset(),
                    })
                }
            }
        }
        let code = (self.acc & ((1u32 << self.width) - 1)) as u16;
        self.acc >>= self.width;
        self.acc_bits -= self.width;
        Ok(code)
    }

    /// Expand one data code into the phrase buffer and grow the dictionary.
    fn decode_phrase(&mut self, code: u16) -> Result<()> {
        if code >= self.next_free {
            return Err(GifError::InvalidLzwCode {
                code,
                size: self.next_free,
            });
        }

        // Unroll the phrase by walking prefix links; pixels land last-first.
        let mut cur = code;
        loop {
            if cur < self.clear_code {
                self.phrase.push(cur as u8);
                break;
            }
            self.phrase.push(self.pixel[cur as usize]);
            cur = self.prefix[cur as usize];
        }
        let first = *self.phrase.last().expect("phrase is never empty");

        if self.pending {
            let pend = (self.next_free - 1) as usize;
            self.pixel[pend] = first;
            if code as usize == pend {
                // KwKwK: the phrase ends with its own first pixel.
                self.phrase[0] = first;
            }
            self.pending = false;
        }

        if (self.next_free as usize) < MAX_CODES {
            self.prefix[self.next_free as usize] = code;
            self.pending = true;
            self.next_free += 1;
            if self.next_free > self.limit && self.width < MAX_CODE_WIDTH {
                self.width += 1;
                self.limit = 1 << self.width;
            }
        }
        Ok(())
    }

    /// Check the bit buffer and chain tail after the end code.
    fn finish_stream(&mut self) -> Result<()> {
        if self.acc != 0 {
            return Err(GifError::TrailingData {
                offset: self.source.offset(),
            });
        }
        self.acc_bits = 0;
        self.source.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Pack codes LSB-first into a sub-block chain.
    fn chain_of_codes(codes: &[(u16, u32)]) -> Vec<u8> {
        let mut payload = Vec::new();
        let mut acc = 0u32;
        let mut bits = 0u32;
        for &(code, width) in codes {
            acc |= (code as u32) << bits;
            bits += width;
            while bits >= 8 {
                payload.push(acc as u8);
                acc >>= 8;
                bits -= 8;
            }
        }
        if bits > 0 {
            payload.push(acc as u8);
        }

        let mut out = Vec::new();
        for chunk in payload.chunks(255) {
            out.push(chunk.len() as u8);
            out.extend_from_slice(chunk);
        }
        out.push(0);
        out
    }

    fn decode(data: &[u8], min_code_size: u8, expected: u32) -> Result<Vec<u8>> {
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(data).unwrap();
        tmp.flush().unwrap();
        let mut reader = PagedFile::open(tmp.path()).unwrap();
        let mut lzw = LzwDecoder::new(&mut reader, min_code_size, expected);
        let mut out = Vec::new();
        for _ in 0..expected {
            match lzw.next_index()? {
                Some(px) => out.push(px),
                None => {
                    return Err(GifError::WrongPixelCount { expected });
                }
            }
        }
        lzw.finish()?;
        Ok(out)
    }

    #[test]
    fn test_literal_stream() {
        // clear, 0, 1, 2, 3, end at min code size 2. The dictionary gains an
        // entry per data code, so the width steps to 4 bits before the
        // fourth one.
        let data = chain_of_codes(&[(4, 3), (0, 3), (1, 3), (2, 3), (3, 4), (5, 4)]);
        assert_eq!(decode(&data, 2, 4).unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_kwkwk_self_reference() {
        // clear, 1, 6, end: code 6 is the entry being defined by code 1,
        // so it decodes to its prefix plus that prefix's first pixel.
        let data = chain_of_codes(&[(4, 3), (1, 3), (6, 3), (5, 3)]);
        assert_eq!(decode(&data, 2, 3).unwrap(), vec![1, 1, 1]);
    }

    #[test]
    fn test_dictionary_phrase_reuse() {
        // clear, 0, 1, 6, end: entry 6 = "0" + first of "1" = [0, 1]. The
        // entry added while expanding code 6 tips the width to 4 bits.
        let data = chain_of_codes(&[(4, 3), (0, 3), (1, 3), (6, 3), (5, 4)]);
        assert_eq!(decode(&data, 2, 4).unwrap(), vec![0, 1, 0, 1]);
    }

    #[test]
    fn test_mid_stream_clear_resets_dictionary() {
        // The second clear throws away entry 6; referencing it afterwards
        // must fail.
        let data = chain_of_codes(&[(4, 3), (0, 3), (1, 3), (4, 3), (6, 3), (5, 3)]);
        let err = decode(&data, 2, 8).unwrap_err();
        assert!(matches!(err, GifError::InvalidLzwCode { code: 6, .. }));
    }

    #[test]
    fn test_missing_initial_clear() {
        let data = chain_of_codes(&[(0, 3), (5, 3)]);
        assert!(matches!(
            decode(&data, 2, 1),
            Err(GifError::MissingClearCode)
        ));
    }

    #[test]
    fn test_code_out_of_range() {
        // Code 7 is past the one entry defined so far.
        let data = chain_of_codes(&[(4, 3), (0, 3), (7, 3), (5, 3)]);
        assert!(matches!(
            decode(&data, 2, 4),
            Err(GifError::InvalidLzwCode { code: 7, .. })
        ));
    }

    #[test]
    fn test_truncated_chain() {
        // One payload byte holds the clear code, one literal, and two spare
        // bits; the terminator arrives while the next code is incomplete.
        let data = [1, 0x04, 0];
        assert!(matches!(
            decode(&data, 2, 4),
            Err(GifError::TruncatedImage { .. })
        ));
    }

    #[test]
    fn test_surplus_pixels_rejected() {
        let data = chain_of_codes(&[(4, 3), (0, 3), (1, 3), (2, 3), (3, 4), (5, 4)]);
        assert!(matches!(
            decode(&data, 2, 3),
            Err(GifError::WrongPixelCount { expected: 3 })
        ));
    }

    #[test]
    fn test_shortfall_rejected() {
        let data = chain_of_codes(&[(4, 3), (0, 3), (5, 3)]);
        assert!(matches!(
            decode(&data, 2, 4),
            Err(GifError::WrongPixelCount { expected: 4 })
        ));
    }

    #[test]
    fn test_code_width_grows() {
        // At min code size 2 the first 4-bit code is the fourth data code.
        // 300 literal zeros force several width steps; mirror the decoder's
        // growth rule while encoding.
        let mut codes: Vec<(u16, u32)> = vec![(4, 3)];
        let mut width = 3u32;
        let mut limit = 8u16;
        let mut next_free = 6u16;
        for _ in 0..300 {
            codes.push((0, width));
            next_free += 1;
            if next_free > limit && width < 12 {
                width += 1;
                limit <<= 1;
            }
        }
        codes.push((5, width));
        let data = chain_of_codes(&codes);
        let decoded = decode(&data, 2, 300).unwrap();
        assert_eq!(decoded, vec![0u8; 300]);
    }

    #[test]
    fn test_trailing_garbage_after_end() {
        let mut data = chain_of_codes(&[(4, 3), (0, 3), (5, 3)]);
        // Replace the terminator with another data block.
        data.pop();
        data.extend_from_slice(&[1, 0xAB, 0]);
        assert!(matches!(
            decode(&data, 2, 1),
            Err(GifError::TrailingData { .. })
        ));
    }
}
