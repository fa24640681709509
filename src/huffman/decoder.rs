use super::tables::canonical_codes;
use crate::bits::BitReader;
use crate::error::{Error, Result};
use std::io::Read;

/// Longest code DEFLATE allows
pub const MAX_CODE_LENGTH: u8 = 15;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum Entry {
    /// No code maps here
    #[default]
    Invalid,
    Symbol { symbol: u16, length: u8 },
    /// Codes longer than the root width continue in a sub-table
    SubTable { offset: u32, bits: u8 },
}

/// Table-driven canonical Huffman decoder.
///
/// The root table is indexed by the next `root_bits` stream bits. Codes longer
/// than that share a root slot per prefix, which points at a sub-table indexed
/// by the remaining bits.
pub struct HuffmanDecoder {
    root: Vec<Entry>,
    sub: Vec<Entry>,
    root_bits: u8,
    max_bits: u8,
}

impl HuffmanDecoder {
    /// Build from code lengths (for dynamic Huffman blocks)
    pub fn from_code_lengths(lengths: &[u8]) -> Result<Self> {
        Self::with_root_bits(lengths, 9)
    }

    pub fn with_root_bits(lengths: &[u8], root_bits: u8) -> Result<Self> {
        if lengths.is_empty() {
            return Err(Error::HuffmanIncomplete);
        }

        let max_bits = lengths.iter().copied().max().unwrap_or(0);
        if max_bits > MAX_CODE_LENGTH {
            return Err(Error::InvalidCodeLength(max_bits));
        }

        // Count codes of each length and reject oversubscribed sets
        let mut bl_count = [0u32; 16];
        for &len in lengths {
            bl_count[len as usize] += 1;
        }
        let mut left = 1i32;
        for &count in &bl_count[1..] {
            left = (left << 1) - count as i32;
            if left < 0 {
                return Err(Error::HuffmanOversubscribed);
            }
        }

        if max_bits == 0 {
            // All zero-length codes = empty table
            return Ok(Self { root: Vec::new(), sub: Vec::new(), root_bits: 0, max_bits: 0 });
        }
        // A lone one-bit code is the only incomplete set RFC 1951 permits
        let single_one_bit = bl_count[1] == 1 && bl_count[2..].iter().all(|&c| c == 0);
        if left > 0 && !single_one_bit {
            return Err(Error::HuffmanIncomplete);
        }

        let root_bits = root_bits.clamp(1, max_bits);
        let root_mask = (1usize << root_bits) - 1;
        let codes = canonical_codes(lengths);

        // Longest code sharing each root prefix decides its sub-table width
        let mut longest = vec![0u8; 1 << root_bits];
        for &(code, len) in &codes {
            if len > root_bits {
                let prefix = reverse(code, len) as usize & root_mask;
                longest[prefix] = longest[prefix].max(len);
            }
        }

        let mut root = vec![Entry::Invalid; 1 << root_bits];
        let mut sub = Vec::new();
        for (prefix, &len) in longest.iter().enumerate() {
            if len > 0 {
                let bits = len - root_bits;
                root[prefix] = Entry::SubTable { offset: sub.len() as u32, bits };
                sub.resize(sub.len() + (1 << bits), Entry::Invalid);
            }
        }

        for (symbol, &(code, len)) in codes.iter().enumerate() {
            if len == 0 {
                continue;
            }
            let reversed = reverse(code, len) as usize;
            let entry = Entry::Symbol { symbol: symbol as u16, length: len };
            if len <= root_bits {
                let mut index = reversed;
                while index < root.len() {
                    root[index] = entry;
                    index += 1 << len;
                }
            } else if let Entry::SubTable { offset, bits } = root[reversed & root_mask] {
                let step = 1usize << (len - root_bits);
                let mut index = reversed >> root_bits;
                while index < 1 << bits {
                    sub[offset as usize + index] = entry;
                    index += step;
                }
            }
        }

        Ok(Self { root, sub, root_bits, max_bits })
    }

    /// Build fixed Huffman table for literal/length codes (RFC 1951 section 3.2.6)
    pub fn fixed_literal_length() -> Result<Self> {
        Self::from_code_lengths(&super::tables::fixed_literal_lengths())
    }

    /// Build fixed Huffman table for distance codes
    pub fn fixed_distance() -> Result<Self> {
        Self::with_root_bits(&super::tables::fixed_distance_lengths(), 5)
    }

    /// Decode next symbol from bitstream
    #[inline]
    pub fn decode<R: Read>(&self, bits: &mut BitReader<R>) -> Result<u16> {
        if self.max_bits == 0 {
            return Err(Error::HuffmanIncomplete);
        }

        let (peeked, available) = bits.peek_bits_padded(self.max_bits)?;
        let mut entry = self.root[peeked as usize & ((1 << self.root_bits) - 1)];
        if let Entry::SubTable { offset, bits: sub_bits } = entry {
            let index = (peeked >> self.root_bits) as usize & ((1 << sub_bits) - 1);
            entry = self.sub[offset as usize + index];
        }

        match entry {
            Entry::Symbol { symbol, length } if length <= available => {
                bits.consume_bits(length);
                Ok(symbol)
            }
            Entry::Symbol { .. } => Err(Error::UnexpectedEof),
            _ if available < self.max_bits => Err(Error::UnexpectedEof),
            _ => Err(Error::InvalidHuffmanCode),
        }
    }

    pub fn max_bits(&self) -> u8 {
        self.max_bits
    }
}

/// Reverse the bottom `n` bits of `value`
#[inline]
fn reverse(value: u32, n: u8) -> u32 {
    value.reverse_bits() >> (32 - n as u32)
}
