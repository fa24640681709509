use crate::error::{Error, Result};
use std::io::{self, Read};

/// Widest chunk the reader pulls from its input in one go
pub const MAX_CHUNK_BYTES: usize = 16;

/// Bit-level reader for LSB-first streams (DEFLATE, FSE headers)
///
/// Bits are read from LSB to MSB within each byte. Input is pulled in
/// fixed-width chunks of `chunk_width` bytes into a staging area, then moved
/// a byte at a time into a 64-bit accumulator.
pub struct BitReader<R: Read> {
    reader: R,
    /// Buffer holding up to 64 bits
    buffer: u64,
    /// Number of valid bits in buffer (0-64)
    bits_available: u8,
    /// Chunk staging area
    chunk: [u8; MAX_CHUNK_BYTES],
    chunk_len: usize,
    chunk_pos: usize,
    chunk_width: usize,
    /// Total bytes pulled from the underlying reader
    bytes_read: u64,
    /// Underlying reader returned EOF
    exhausted: bool,
}

impl<R: Read> BitReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_chunk_width(reader, 8)
    }

    /// Create a reader that refills `chunk_width` bytes (1-16) at a time
    pub fn with_chunk_width(reader: R, chunk_width: usize) -> Self {
        Self {
            reader,
            buffer: 0,
            bits_available: 0,
            chunk: [0u8; MAX_CHUNK_BYTES],
            chunk_len: 0,
            chunk_pos: 0,
            chunk_width: chunk_width.clamp(1, MAX_CHUNK_BYTES),
            bytes_read: 0,
            exhausted: false,
        }
    }

    /// Pull the next chunk into the staging area. Returns false at EOF.
    fn refill_chunk(&mut self) -> Result<bool> {
        if self.exhausted {
            return Ok(false);
        }

        let mut filled = 0;
        while filled < self.chunk_width {
            match self.reader.read(&mut self.chunk[filled..self.chunk_width]) {
                Ok(0) => {
                    self.exhausted = true;
                    break;
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(Error::Io(e)),
            }
        }

        self.chunk_len = filled;
        self.chunk_pos = 0;
        self.bytes_read += filled as u64;
        Ok(filled > 0)
    }

    /// Move staged bytes into the accumulator until it holds `n` bits or the
    /// input runs dry. Returns the number of bits available afterwards.
    #[inline]
    fn top_up(&mut self, n: u8) -> Result<u8> {
        while self.bits_available < n {
            if self.chunk_pos == self.chunk_len && !self.refill_chunk()? {
                break;
            }
            // Take as many staged bytes as fit
            while self.bits_available <= 56 && self.chunk_pos < self.chunk_len {
                self.buffer |= (self.chunk[self.chunk_pos] as u64) << self.bits_available;
                self.bits_available += 8;
                self.chunk_pos += 1;
            }
        }
        Ok(self.bits_available)
    }

    /// Ensure at least `n` bits are available in buffer
    fn fill_buffer(&mut self, n: u8) -> Result<()> {
        debug_assert!(n <= 57, "Cannot request more than 57 bits at once");
        if self.top_up(n)? < n {
            return Err(Error::UnexpectedEof);
        }
        Ok(())
    }

    /// Read `n` bits (1-32) in LSB-first order (standard DEFLATE order)
    pub fn read_bits(&mut self, n: u8) -> Result<u32> {
        debug_assert!(n <= 32, "Cannot read more than 32 bits at once");

        if n == 0 {
            return Ok(0);
        }

        self.fill_buffer(n)?;

        let mask = (1u64 << n) - 1;
        let result = (self.buffer & mask) as u32;
        self.buffer >>= n;
        self.bits_available -= n;

        Ok(result)
    }

    /// Peek at `n` bits without consuming them (for table-based Huffman decoding)
    #[inline]
    pub fn peek_bits(&mut self, n: u8) -> Result<u32> {
        debug_assert!(n <= 32, "Cannot peek more than 32 bits at once");

        if n == 0 {
            return Ok(0);
        }

        self.fill_buffer(n)?;

        let mask = (1u64 << n) - 1;
        Ok((self.buffer & mask) as u32)
    }

    /// Peek at up to `n` bits, zero-padding past the end of input.
    ///
    /// Returns the bits and how many of them are real. A Huffman code near the
    /// end of a stream can be shorter than the table's lookahead.
    #[inline]
    pub fn peek_bits_padded(&mut self, n: u8) -> Result<(u32, u8)> {
        debug_assert!(n <= 32, "Cannot peek more than 32 bits at once");
        let available = self.top_up(n)?.min(n);
        let mask = (1u64 << n) - 1;
        Ok(((self.buffer & mask) as u32, available))
    }

    /// Consume `n` bits that were previously peeked
    #[inline]
    pub fn consume_bits(&mut self, n: u8) {
        debug_assert!(n <= self.bits_available, "Cannot consume more bits than available");
        self.buffer >>= n;
        self.bits_available -= n;
    }

    /// Read a single bit
    #[inline]
    pub fn read_bit(&mut self) -> Result<bool> {
        Ok(self.read_bits(1)? != 0)
    }

    /// Discard remaining bits in current byte, align to next byte boundary
    pub fn align_to_byte(&mut self) {
        let discard = self.bits_available % 8;
        if discard > 0 {
            self.buffer >>= discard;
            self.bits_available -= discard;
        }
    }

    /// Read a complete byte (aligns to byte boundary first)
    pub fn read_byte(&mut self) -> Result<u8> {
        self.align_to_byte();
        self.read_bits(8).map(|v| v as u8)
    }

    /// Read a 16-bit little-endian value (aligns to byte boundary first)
    pub fn read_u16_le(&mut self) -> Result<u16> {
        self.align_to_byte();
        let lo = self.read_bits(8)? as u16;
        let hi = self.read_bits(8)? as u16;
        Ok(lo | (hi << 8))
    }

    /// Read a 32-bit little-endian value (aligns to byte boundary first)
    pub fn read_u32_le(&mut self) -> Result<u32> {
        self.align_to_byte();
        self.read_bits(32)
    }

    /// Read exactly `buf.len()` bytes (aligns to byte boundary first)
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        self.read_exact(buf).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => Error::UnexpectedEof,
            _ => Error::Io(e),
        })
    }

    /// Whether every input byte has been consumed
    pub fn is_at_end(&mut self) -> Result<bool> {
        if self.bits_available >= 8 || self.chunk_pos < self.chunk_len {
            return Ok(false);
        }
        Ok(!self.refill_chunk()?)
    }

    /// Bytes consumed so far, counting a partially read byte as consumed
    pub fn bytes_consumed(&self) -> u64 {
        let staged = (self.chunk_len - self.chunk_pos) as u64;
        self.bytes_read - staged - (self.bits_available / 8) as u64
    }

    /// Total bytes pulled from the underlying reader (includes lookahead)
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Check if we have bits available without reading more
    pub fn bits_available(&self) -> u8 {
        self.bits_available
    }
}

/// Byte-aligned reads drain the accumulator, then the staging area, then the
/// underlying reader. Container parsers use this to read headers and trailers
/// that sit between bit-packed sections.
impl<R: Read> Read for BitReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.align_to_byte();

        let mut n = 0;
        while n < buf.len() && self.bits_available >= 8 {
            buf[n] = self.buffer as u8;
            self.buffer >>= 8;
            self.bits_available -= 8;
            n += 1;
        }

        let staged = (self.chunk_len - self.chunk_pos).min(buf.len() - n);
        buf[n..n + staged].copy_from_slice(&self.chunk[self.chunk_pos..self.chunk_pos + staged]);
        self.chunk_pos += staged;
        n += staged;

        if n == 0 && !buf.is_empty() && !self.exhausted {
            let read = self.reader.read(buf)?;
            if read == 0 {
                self.exhausted = true;
            }
            self.bytes_read += read as u64;
            n = read;
        }

        Ok(n)
    }
}
