use crate::error::{Error, Result};
use crate::token::{Token, TokenBlock};

/// Shortest match an LZ4 sequence can encode
pub const MIN_MATCH: u32 = 4;

/// Read a length continued by 0xFF bytes; `base` is the 15 from the token nibble
#[inline]
fn read_extended_length(data: &[u8], pos: &mut usize, base: u32) -> Result<u32> {
    let mut length = base;
    loop {
        let byte = *data.get(*pos).ok_or(Error::UnexpectedEof)?;
        *pos += 1;
        length = length.checked_add(byte as u32).ok_or(Error::CorruptBlock("LZ4 length overflow"))?;
        if byte != 255 {
            return Ok(length);
        }
    }
}

/// Parse one LZ4 block into tokens.
///
/// Each sequence is a token byte (literal length nibble, match length
/// nibble), optional literal length bytes, the literals, a 2-byte offset and
/// optional match length bytes. The block may end after any sequence's
/// literals.
pub fn decode_block(data: &[u8]) -> Result<TokenBlock> {
    let mut block = TokenBlock::with_capacity(data.len() / 4 + 1, data.len());
    let mut pos = 0usize;

    while pos < data.len() {
        let token = data[pos];
        pos += 1;

        let mut literal_length = (token >> 4) as u32;
        if literal_length == 15 {
            literal_length = read_extended_length(data, &mut pos, literal_length)?;
        }

        let end = pos.checked_add(literal_length as usize).ok_or(Error::UnexpectedEof)?;
        let literals = data.get(pos..end).ok_or(Error::UnexpectedEof)?;
        block.literals.extend_from_slice(literals);
        pos = end;

        if pos == data.len() {
            if literal_length > 0 {
                block.tokens.push(Token::literals(literal_length));
            }
            break;
        }

        let offset_bytes = data.get(pos..pos + 2).ok_or(Error::UnexpectedEof)?;
        let offset = u16::from_le_bytes([offset_bytes[0], offset_bytes[1]]) as u32;
        pos += 2;

        let mut match_length = (token & 0x0F) as u32;
        if match_length == 15 {
            match_length = read_extended_length(data, &mut pos, match_length)?;
        }

        block.tokens.push(Token::new(literal_length, match_length + MIN_MATCH, offset));
    }

    Ok(block)
}
