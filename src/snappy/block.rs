use crate::error::{Error, Result};
use crate::token::{Token, TokenBlock};

/// Element tag types, low two bits of the tag byte
const TAG_LITERAL: u8 = 0b00;
const TAG_COPY1: u8 = 0b01;
const TAG_COPY2: u8 = 0b10;

/// Largest uncompressed length a preamble may announce
pub const MAX_BLOCK_SIZE: u64 = u32::MAX as u64;

/// Read the little-endian base-128 varint holding the uncompressed length.
///
/// Returns the length and the number of bytes used (at most 5).
pub fn read_preamble(data: &[u8]) -> Result<(u64, usize)> {
    let mut value = 0u64;
    for (i, &byte) in data.iter().take(5).enumerate() {
        value |= ((byte & 0x7F) as u64) << (7 * i);
        if byte & 0x80 == 0 {
            if value > MAX_BLOCK_SIZE {
                return Err(Error::CorruptBlock("Snappy preamble exceeds 32 bits"));
            }
            return Ok((value, i + 1));
        }
    }
    if data.len() < 5 {
        Err(Error::UnexpectedEof)
    } else {
        Err(Error::CorruptBlock("Snappy preamble longer than 5 bytes"))
    }
}

#[inline]
fn read_le(data: &[u8], pos: &mut usize, n: usize) -> Result<u32> {
    let bytes = data.get(*pos..*pos + n).ok_or(Error::UnexpectedEof)?;
    *pos += n;
    Ok(bytes.iter().rev().fold(0u32, |acc, &b| (acc << 8) | b as u32))
}

/// Consecutive literal elements merge into one token's literal length
#[inline]
fn extend_literal_run(pending: u32, length: u32) -> Result<u32> {
    pending.checked_add(length).ok_or(Error::CorruptBlock("Snappy literal length overflow"))
}

/// Parse a raw Snappy block (preamble plus elements) into tokens.
///
/// The total the tokens produce must equal the preamble.
pub fn decode_block(data: &[u8]) -> Result<TokenBlock> {
    let (expected, mut pos) = read_preamble(data)?;
    let mut block = TokenBlock::with_capacity(data.len() / 3 + 1, data.len());
    let mut produced = 0u64;
    let mut pending_literals = 0u32;

    while pos < data.len() {
        let tag = data[pos];
        pos += 1;

        let (length, offset) = match tag & 0x03 {
            TAG_LITERAL => {
                let field = (tag >> 2) as u32;
                let length = if field < 60 {
                    field + 1
                } else {
                    let extra = (field - 59) as usize;
                    read_le(data, &mut pos, extra)?
                        .checked_add(1)
                        .ok_or(Error::CorruptBlock("Snappy literal length overflow"))?
                };
                let end = pos.checked_add(length as usize).ok_or(Error::UnexpectedEof)?;
                let literals = data.get(pos..end).ok_or(Error::UnexpectedEof)?;
                block.literals.extend_from_slice(literals);
                pos = end;
                pending_literals = extend_literal_run(pending_literals, length)?;
                produced += length as u64;
                continue;
            }
            TAG_COPY1 => {
                let length = 4 + ((tag >> 2) & 0x07) as u32;
                let low = *data.get(pos).ok_or(Error::UnexpectedEof)? as u32;
                pos += 1;
                (length, ((tag as u32 >> 5) << 8) | low)
            }
            TAG_COPY2 => (1 + (tag >> 2) as u32, read_le(data, &mut pos, 2)?),
            // copy with 4-byte offset
            _ => (1 + (tag >> 2) as u32, read_le(data, &mut pos, 4)?),
        };

        if offset == 0 {
            return Err(Error::ZeroMatchOffset);
        }
        block.tokens.push(Token::new(pending_literals, length, offset));
        pending_literals = 0;
        produced += length as u64;
    }

    if pending_literals > 0 {
        block.tokens.push(Token::literals(pending_literals));
    }
    if produced != expected {
        return Err(Error::SizeMismatch { expected, found: produced });
    }
    Ok(block)
}
