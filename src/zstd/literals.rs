use super::huffman::HuffmanTable;
use crate::error::{Error, Result};

/// Largest literals section a block may regenerate
pub const MAX_LITERALS: usize = 128 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LiteralsType {
    Raw,
    Rle,
    /// Huffman coded with a tree described in this block
    Compressed,
    /// Huffman coded with the previous block's tree
    Treeless,
}

/// Literals_Section_Header
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LiteralsHeader {
    pub literals_type: LiteralsType,
    pub regenerated_size: usize,
    /// Size of the Huffman payload, tree description included
    pub compressed_size: Option<usize>,
    pub four_streams: bool,
    /// Bytes the header itself used
    pub header_size: usize,
}

impl LiteralsHeader {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let b0 = *data.first().ok_or(Error::UnexpectedEof)?;
        let literals_type = match b0 & 0x03 {
            0 => LiteralsType::Raw,
            1 => LiteralsType::Rle,
            2 => LiteralsType::Compressed,
            _ => LiteralsType::Treeless,
        };
        let size_format = (b0 >> 2) & 0x03;
        let byte = |i: usize| data.get(i).map(|&b| b as u64).ok_or(Error::UnexpectedEof);

        let header = match literals_type {
            LiteralsType::Raw | LiteralsType::Rle => {
                let (regenerated_size, header_size) = match size_format {
                    0 | 2 => ((b0 >> 3) as usize, 1),
                    1 => (((b0 >> 4) as u64 | (byte(1)? << 4)) as usize, 2),
                    _ => (((b0 >> 4) as u64 | (byte(1)? << 4) | (byte(2)? << 12)) as usize, 3),
                };
                Self {
                    literals_type,
                    regenerated_size,
                    compressed_size: None,
                    four_streams: false,
                    header_size,
                }
            }
            LiteralsType::Compressed | LiteralsType::Treeless => {
                let (header_size, size_bits) = match size_format {
                    0 | 1 => (3, 10),
                    2 => (4, 14),
                    _ => (5, 18),
                };
                let mut value = 0u64;
                for i in 0..header_size {
                    value |= byte(i)? << (8 * i);
                }
                let mask = (1u64 << size_bits) - 1;
                Self {
                    literals_type,
                    regenerated_size: ((value >> 4) & mask) as usize,
                    compressed_size: Some(((value >> (4 + size_bits)) & mask) as usize),
                    four_streams: size_format != 0,
                    header_size,
                }
            }
        };

        if header.regenerated_size > MAX_LITERALS {
            return Err(Error::BlockTooLarge { size: header.regenerated_size, max: MAX_LITERALS });
        }
        Ok(header)
    }
}

/// Decode a literals section.
///
/// `tree` holds the Huffman table of the previous compressed literals in
/// this frame and is replaced when the section carries a new one. Returns
/// the literals and the bytes of `data` the section used.
pub fn decode_literals(data: &[u8], tree: &mut Option<HuffmanTable>) -> Result<(Vec<u8>, usize)> {
    let header = LiteralsHeader::parse(data)?;
    let body = &data[header.header_size..];
    let regenerated = header.regenerated_size;

    match header.literals_type {
        LiteralsType::Raw => {
            let literals = body.get(..regenerated).ok_or(Error::UnexpectedEof)?;
            Ok((literals.to_vec(), header.header_size + regenerated))
        }
        LiteralsType::Rle => {
            let byte = *body.first().ok_or(Error::UnexpectedEof)?;
            Ok((vec![byte; regenerated], header.header_size + 1))
        }
        LiteralsType::Compressed | LiteralsType::Treeless => {
            let compressed_size = header.compressed_size.unwrap_or(0);
            let mut payload = body.get(..compressed_size).ok_or(Error::UnexpectedEof)?;

            if header.literals_type == LiteralsType::Compressed {
                let (table, used) = HuffmanTable::read(payload)?;
                tracing::trace!(max_bits = table.max_bits(), used, "literals tree");
                *tree = Some(table);
                payload = &payload[used..];
            }
            let table = tree.as_ref().ok_or(Error::CorruptBlock("treeless literals without a tree"))?;

            let mut literals = Vec::with_capacity(regenerated);
            if header.four_streams {
                table.decode_four_streams(payload, regenerated, &mut literals)?;
            } else {
                table.decode_stream(payload, regenerated, &mut literals)?;
            }
            Ok((literals, header.header_size + compressed_size))
        }
    }
}
