use crate::error::{Error, Result};

/// Reader for backward bitstreams (Zstd FSE and Huffman streams).
///
/// The stream is written forward LSB-first and closed with a single `1`
/// marker bit, then read from the marker back towards the first byte. Reading
/// past the start yields zero bits and marks the reader as overflowed, which
/// callers check once a stream should be exhausted.
#[derive(Debug, Clone)]
pub struct ReverseBitReader<'a> {
    data: &'a [u8],
    /// Bit position just above the next unread bit; negative after overflow
    position: isize,
}

impl<'a> ReverseBitReader<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let last = *data.last().ok_or(Error::CorruptBlock("empty bitstream"))?;
        if last == 0 {
            return Err(Error::CorruptBlock("bitstream end marker missing"));
        }
        let marker = 7 - last.leading_zeros() as isize;
        let position = (data.len() as isize - 1) * 8 + marker;
        Ok(Self { data, position })
    }

    /// Read `n` bits (0-32), most recently written first
    #[inline]
    pub fn read_bits(&mut self, n: u8) -> u32 {
        if n == 0 {
            return 0;
        }
        self.position -= n as isize;
        self.extract(self.position, n)
    }

    /// Peek at the next `n` bits (0-32) without consuming them
    #[inline]
    pub fn peek_bits(&self, n: u8) -> u32 {
        if n == 0 {
            return 0;
        }
        self.extract(self.position - n as isize, n)
    }

    #[inline]
    pub fn consume_bits(&mut self, n: u8) {
        self.position -= n as isize;
    }

    fn extract(&self, start: isize, n: u8) -> u32 {
        debug_assert!(n <= 32);
        if start < 0 {
            let real = start + n as isize;
            if real <= 0 {
                return 0;
            }
            // Bits below the start of the stream read as zero
            return self.extract(0, real as u8) << (-start) as u32;
        }

        let byte = start as usize / 8;
        let shift = start as usize % 8;
        let mut word = 0u64;
        for (i, &b) in self.data[byte.min(self.data.len())..].iter().take(8).enumerate() {
            word |= (b as u64) << (8 * i);
        }
        ((word >> shift) & ((1u64 << n) - 1)) as u32
    }

    /// Bits left before the start of the stream (negative once overflowed)
    pub fn bits_remaining(&self) -> isize {
        self.position
    }

    /// Whether every bit has been consumed exactly
    pub fn is_finished(&self) -> bool {
        self.position == 0
    }

    /// Whether more bits were read than the stream holds
    pub fn overflowed(&self) -> bool {
        self.position < 0
    }
}
