//! Huffman trees for Zstd literals.
//!
//! A tree is transmitted as a list of weights, either FSE compressed or as
//! packed 4-bit values. The weight of the last symbol is implied: it is the
//! one that brings `sum(2^(weight-1))` up to the next power of two.

use crate::bits::ReverseBitReader;
use crate::error::{Error, Result};
use crate::fse::{FseState, FseTable};

/// Longest code a literals tree may use
pub const MAX_TABLE_LOG: u8 = 11;
/// Accuracy log limit for FSE-compressed weights
const WEIGHTS_MAX_LOG: u8 = 6;
const MAX_WEIGHT: u8 = 12;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Entry {
    symbol: u8,
    num_bits: u8,
}

/// Decoding table indexed by the next `max_bits` bits of a backward stream
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HuffmanTable {
    entries: Vec<Entry>,
    max_bits: u8,
}

impl HuffmanTable {
    /// Read a tree description from the start of `data`.
    ///
    /// Returns the table and the bytes the description used.
    pub fn read(data: &[u8]) -> Result<(Self, usize)> {
        let (weights, used) = read_weights(data)?;
        Ok((Self::from_weights(&weights)?, used))
    }

    /// Build from transmitted weights, deriving the final symbol's weight
    pub fn from_weights(weights: &[u8]) -> Result<Self> {
        if weights.is_empty() || weights.len() > 255 {
            return Err(Error::InvalidWeights("weight count out of range"));
        }
        let mut total = 0u32;
        for &w in weights {
            if w > MAX_WEIGHT {
                return Err(Error::InvalidWeights("weight too large"));
            }
            if w > 0 {
                total += 1 << (w - 1);
            }
        }
        if total == 0 {
            return Err(Error::InvalidWeights("all weights zero"));
        }

        let max_bits = (32 - total.leading_zeros()) as u8;
        if max_bits > MAX_TABLE_LOG {
            return Err(Error::InvalidWeights("tree deeper than 11 bits"));
        }
        let left = (1u32 << max_bits) - total;
        if !left.is_power_of_two() {
            return Err(Error::InvalidWeights("implied weight is not a power of two"));
        }
        let last_weight = left.trailing_zeros() as u8 + 1;

        let mut num_bits: Vec<u8> = weights
            .iter()
            .map(|&w| if w > 0 { max_bits + 1 - w } else { 0 })
            .collect();
        num_bits.push(max_bits + 1 - last_weight);

        // Longest codes take the lowest table indices, symbols in order
        let mut rank_count = [0u32; MAX_TABLE_LOG as usize + 2];
        for &n in &num_bits {
            rank_count[n as usize] += 1;
        }
        let mut rank_start = [0u32; MAX_TABLE_LOG as usize + 2];
        let mut next = 0u32;
        for n in (1..=max_bits as usize).rev() {
            rank_start[n] = next;
            next += rank_count[n] << (max_bits as usize - n);
        }

        let mut entries = vec![Entry::default(); 1 << max_bits];
        for (symbol, &n) in num_bits.iter().enumerate() {
            if n == 0 {
                continue;
            }
            let start = rank_start[n as usize] as usize;
            let len = 1usize << (max_bits - n);
            for entry in &mut entries[start..start + len] {
                *entry = Entry { symbol: symbol as u8, num_bits: n };
            }
            rank_start[n as usize] += len as u32;
        }

        Ok(Self { entries, max_bits })
    }

    pub fn max_bits(&self) -> u8 {
        self.max_bits
    }

    /// Decode exactly `count` symbols from one backward stream
    pub fn decode_stream(&self, stream: &[u8], count: usize, out: &mut Vec<u8>) -> Result<()> {
        let mut bits = ReverseBitReader::new(stream)?;
        out.reserve(count);
        for _ in 0..count {
            let entry = self.entries[bits.peek_bits(self.max_bits) as usize];
            bits.consume_bits(entry.num_bits);
            out.push(entry.symbol);
        }
        if !bits.is_finished() {
            return Err(Error::CorruptBlock("Huffman stream size mismatch"));
        }
        Ok(())
    }

    /// Decode the four streams of a 4-stream literals section
    pub fn decode_four_streams(&self, data: &[u8], regenerated: usize, out: &mut Vec<u8>) -> Result<()> {
        if data.len() < 6 {
            return Err(Error::UnexpectedEof);
        }
        let mut sizes = [0usize; 4];
        for (i, size) in sizes.iter_mut().take(3).enumerate() {
            *size = u16::from_le_bytes([data[2 * i], data[2 * i + 1]]) as usize;
        }
        let streams = &data[6..];
        let first_three: usize = sizes[..3].iter().sum();
        sizes[3] = streams
            .len()
            .checked_sub(first_three)
            .ok_or(Error::CorruptBlock("Huffman jump table exceeds literals"))?;

        let segment = regenerated.div_ceil(4);
        let last = regenerated
            .checked_sub(3 * segment)
            .ok_or(Error::CorruptBlock("too few literals for four streams"))?;

        let mut start = 0;
        for (i, &size) in sizes.iter().enumerate() {
            let count = if i == 3 { last } else { segment };
            self.decode_stream(&streams[start..start + size], count, out)?;
            start += size;
        }
        Ok(())
    }
}

/// Read the weight list of a tree description
fn read_weights(data: &[u8]) -> Result<(Vec<u8>, usize)> {
    let header = *data.first().ok_or(Error::UnexpectedEof)? as usize;

    if header >= 128 {
        let count = header - 127;
        let bytes = count.div_ceil(2);
        let packed = data.get(1..1 + bytes).ok_or(Error::UnexpectedEof)?;
        let weights = packed.iter().flat_map(|&b| [b >> 4, b & 0x0F]).take(count).collect();
        return Ok((weights, 1 + bytes));
    }

    let compressed = data.get(1..1 + header).ok_or(Error::UnexpectedEof)?;
    let (table, table_len) = FseTable::read(compressed, 255, WEIGHTS_MAX_LOG)?;
    let stream = compressed
        .get(table_len..)
        .filter(|s| !s.is_empty())
        .ok_or(Error::InvalidWeights("missing weight bitstream"))?;

    let mut bits = ReverseBitReader::new(stream)?;
    let mut first = FseState::new(&table, &mut bits);
    let mut second = FseState::new(&table, &mut bits);
    let mut weights = Vec::with_capacity(255);

    // Two interleaved states; once the stream is overdrawn the other state's
    // pending symbol is the last weight.
    loop {
        weights.push(first.decode(&mut bits));
        if bits.overflowed() {
            weights.push(second.symbol());
            break;
        }
        weights.push(second.decode(&mut bits));
        if bits.overflowed() {
            weights.push(first.symbol());
            break;
        }
        if weights.len() > 255 {
            return Err(Error::InvalidWeights("too many weights"));
        }
    }
    if weights.len() > 255 {
        return Err(Error::InvalidWeights("too many weights"));
    }
    Ok((weights, 1 + header))
}
