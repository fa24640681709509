use super::tables::{CODE_LENGTH_ORDER, DISTANCE_TABLE, LENGTH_TABLE};
use crate::bits::BitReader;
use crate::checksum::ChecksumKind;
use crate::error::{Error, Result};
use crate::gzip::{zlib, GzipHeader, GzipTrailer, ZlibHeader};
use crate::huffman::HuffmanDecoder;
use crate::source::{ContentSize, MemberInfo, StreamEvent, TokenSource, Trailer};
use crate::token::{TokenBlock, TokenBuilder};
use std::io::Read;

/// DEFLATE window (32 KiB)
pub const WINDOW_SIZE: usize = 32 * 1024;

/// Tokens plus literal bytes gathered before a batch is handed on
const BATCH_WEIGHT: usize = 16 * 1024;

/// Wrapper around the DEFLATE stream
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Container {
    /// Bare RFC 1951 stream
    Raw,
    /// RFC 1952, possibly several members back to back
    Gzip,
    /// RFC 1950
    Zlib,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    MemberHeader,
    Blocks,
    Trailer,
    Finished,
    Done,
}

/// The block currently being decoded
enum ActiveBlock {
    Stored { remaining: usize },
    Fixed,
    Dynamic { literals: HuffmanDecoder, distances: Option<HuffmanDecoder> },
}

/// Streams DEFLATE blocks as token batches.
///
/// DEFLATE block boundaries fall mid-byte, so there is no separate frame
/// stage: header parsing, Huffman decoding and token assembly all run over
/// the same bit reader.
pub struct DeflateSource<R: Read> {
    bits: BitReader<R>,
    container: Container,
    phase: Phase,
    block: Option<ActiveBlock>,
    /// The final block of the current member has been started
    final_seen: bool,
    fixed: Option<(HuffmanDecoder, HuffmanDecoder)>,
    builder: TokenBuilder,
    members: u64,
    blocks: u64,
}

impl<R: Read> DeflateSource<R> {
    pub fn new(bits: BitReader<R>, container: Container) -> Self {
        Self {
            bits,
            container,
            phase: Phase::MemberHeader,
            block: None,
            final_seen: false,
            fixed: None,
            builder: TokenBuilder::new(),
            members: 0,
            blocks: 0,
        }
    }

    fn read_member_header(&mut self) -> Result<Option<MemberInfo>> {
        if self.members > 0 && self.bits.is_at_end()? {
            return Ok(None);
        }
        self.members += 1;

        let checksum = match self.container {
            Container::Raw => None,
            Container::Gzip => {
                let header = GzipHeader::parse(&mut self.bits)?;
                tracing::debug!(
                    member = self.members,
                    filename = ?header.filename,
                    mtime = header.mtime,
                    "gzip header"
                );
                Some(ChecksumKind::Crc32)
            }
            Container::Zlib => {
                let header = ZlibHeader::parse(&mut self.bits)?;
                tracing::debug!(window = header.window_size, level = header.level, "zlib header");
                Some(ChecksumKind::Adler32)
            }
        };
        Ok(Some(MemberInfo { window_size: WINDOW_SIZE, checksum }))
    }

    fn read_trailer(&mut self) -> Result<Trailer> {
        self.bits.align_to_byte();
        Ok(match self.container {
            Container::Raw => Trailer::default(),
            Container::Gzip => {
                let trailer = GzipTrailer::parse(&mut self.bits)?;
                Trailer {
                    checksum: Some(trailer.crc32),
                    content_size: Some(ContentSize::Modulo32(trailer.isize)),
                }
            }
            Container::Zlib => {
                Trailer { checksum: Some(zlib::read_adler32(&mut self.bits)?), content_size: None }
            }
        })
    }

    /// Read a block header and prepare its tables
    fn start_block(&mut self) -> Result<ActiveBlock> {
        let is_final = self.bits.read_bit()?;
        let block_type = self.bits.read_bits(2)? as u8;
        self.final_seen = is_final;
        self.blocks += 1;
        tracing::trace!(block = self.blocks, is_final, block_type, "deflate block");

        match block_type {
            0 => {
                // Align to byte boundary, then LEN and its complement
                self.bits.align_to_byte();
                let len = self.bits.read_u16_le()?;
                let nlen = self.bits.read_u16_le()?;
                if len != !nlen {
                    return Err(Error::StoredBlockLengthMismatch { len, nlen });
                }
                Ok(ActiveBlock::Stored { remaining: len as usize })
            }
            1 => {
                if self.fixed.is_none() {
                    self.fixed =
                        Some((HuffmanDecoder::fixed_literal_length()?, HuffmanDecoder::fixed_distance()?));
                }
                Ok(ActiveBlock::Fixed)
            }
            2 => self.read_dynamic_tables(),
            _ => Err(Error::InvalidBlockType(block_type)),
        }
    }

    fn read_dynamic_tables(&mut self) -> Result<ActiveBlock> {
        let hlit = self.bits.read_bits(5)? as usize + 257; // # of literal/length codes
        let hdist = self.bits.read_bits(5)? as usize + 1; // # of distance codes
        let hclen = self.bits.read_bits(4)? as usize + 4; // # of code length codes
        if hlit > 286 || hdist > 30 {
            return Err(Error::CorruptBlock("too many length or distance codes"));
        }

        let mut code_length_lengths = [0u8; 19];
        for &index in &CODE_LENGTH_ORDER[..hclen] {
            code_length_lengths[index] = self.bits.read_bits(3)? as u8;
        }
        let code_length_decoder = HuffmanDecoder::with_root_bits(&code_length_lengths, 7)?;

        let total_codes = hlit + hdist;
        let mut all_lengths = Vec::with_capacity(total_codes + 138);
        while all_lengths.len() < total_codes {
            let sym = code_length_decoder.decode(&mut self.bits)?;
            match sym {
                0..=15 => all_lengths.push(sym as u8),
                16 => {
                    // Copy previous code length 3-6 times
                    let prev =
                        *all_lengths.last().ok_or(Error::CorruptBlock("repeat with no previous length"))?;
                    let repeat = self.bits.read_bits(2)? as usize + 3;
                    all_lengths.resize(all_lengths.len() + repeat, prev);
                }
                17 => {
                    // Repeat zero 3-10 times
                    let repeat = self.bits.read_bits(3)? as usize + 3;
                    all_lengths.resize(all_lengths.len() + repeat, 0);
                }
                18 => {
                    // Repeat zero 11-138 times
                    let repeat = self.bits.read_bits(7)? as usize + 11;
                    all_lengths.resize(all_lengths.len() + repeat, 0);
                }
                _ => return Err(Error::InvalidHuffmanSymbol(sym)),
            }
        }
        if all_lengths.len() > total_codes {
            return Err(Error::CorruptBlock("code length repeat overruns table"));
        }

        let (literal_lengths, distance_lengths) = all_lengths.split_at(hlit);
        if literal_lengths[256] == 0 {
            return Err(Error::CorruptBlock("missing end-of-block code"));
        }

        let literals = HuffmanDecoder::from_code_lengths(literal_lengths)?;
        let distances = if distance_lengths.iter().all(|&l| l == 0) {
            // No distance codes - valid for blocks with only literals
            None
        } else {
            Some(HuffmanDecoder::with_root_bits(distance_lengths, 7)?)
        };
        Ok(ActiveBlock::Dynamic { literals, distances })
    }

    /// Decode from the active block until it ends or the batch is full.
    /// Returns true when the block ended.
    fn fill_from_block(&mut self, block: &mut ActiveBlock) -> Result<bool> {
        match block {
            ActiveBlock::Stored { remaining } => {
                let room = BATCH_WEIGHT.saturating_sub(self.builder.weight()).max(1);
                let n = (*remaining).min(room);
                let mut buf = vec![0u8; n];
                self.bits.read_bytes(&mut buf)?;
                self.builder.literal_slice(&buf);
                *remaining -= n;
                Ok(*remaining == 0)
            }
            ActiveBlock::Fixed => {
                let (literals, distances) = self
                    .fixed
                    .as_ref()
                    .ok_or_else(|| Error::Internal("fixed tables not built".into()))?;
                decode_symbols(&mut self.bits, &mut self.builder, literals, Some(distances))
            }
            ActiveBlock::Dynamic { literals, distances } => {
                decode_symbols(&mut self.bits, &mut self.builder, literals, distances.as_ref())
            }
        }
    }

    fn take_batch(&mut self) -> StreamEvent {
        StreamEvent::Tokens(self.builder.take())
    }
}

/// Decode literal/length and distance symbols into `builder` until the end
/// of block or a full batch. Returns true at end of block.
fn decode_symbols<R: Read>(
    bits: &mut BitReader<R>,
    builder: &mut TokenBuilder,
    literals: &HuffmanDecoder,
    distances: Option<&HuffmanDecoder>,
) -> Result<bool> {
    while builder.weight() < BATCH_WEIGHT {
        let sym = literals.decode(bits)?;
        match sym {
            0..=255 => builder.literal(sym as u8),
            256 => return Ok(true),
            257..=285 => {
                let (base_len, extra_bits) = LENGTH_TABLE[(sym - 257) as usize];
                let length = base_len as u32 + bits.read_bits(extra_bits)?;

                let distances = distances.ok_or(Error::InvalidDistanceCode(0))?;
                let dist_sym = distances.decode(bits)?;
                if dist_sym > 29 {
                    return Err(Error::InvalidDistanceCode(dist_sym));
                }
                let (base_dist, dist_extra_bits) = DISTANCE_TABLE[dist_sym as usize];
                let distance = base_dist as u32 + bits.read_bits(dist_extra_bits)?;

                builder.copy(length, distance);
            }
            _ => return Err(Error::InvalidLengthCode(sym)),
        }
    }
    Ok(false)
}

impl<R: Read> TokenSource for DeflateSource<R> {
    fn next_event(&mut self) -> Result<Option<StreamEvent>> {
        loop {
            match self.phase {
                Phase::MemberHeader => match self.read_member_header()? {
                    Some(info) => {
                        self.phase = Phase::Blocks;
                        self.final_seen = false;
                        return Ok(Some(StreamEvent::MemberStart(info)));
                    }
                    None => self.phase = Phase::Finished,
                },
                Phase::Blocks => {
                    let mut block = match self.block.take() {
                        Some(block) => block,
                        None if self.final_seen => {
                            self.phase = Phase::Trailer;
                            if !self.builder.is_empty() {
                                return Ok(Some(self.take_batch()));
                            }
                            continue;
                        }
                        None => self.start_block()?,
                    };
                    if !self.fill_from_block(&mut block)? {
                        self.block = Some(block);
                    }
                    if self.builder.weight() >= BATCH_WEIGHT {
                        return Ok(Some(self.take_batch()));
                    }
                }
                Phase::Trailer => {
                    let trailer = self.read_trailer()?;
                    self.phase = match self.container {
                        Container::Gzip => Phase::MemberHeader,
                        _ => Phase::Finished,
                    };
                    return Ok(Some(StreamEvent::MemberEnd(trailer)));
                }
                Phase::Finished => {
                    self.phase = Phase::Done;
                    return Ok(Some(StreamEvent::Tokens(TokenBlock::end_of_stream())));
                }
                Phase::Done => return Ok(None),
            }
        }
    }

    fn bytes_consumed(&self) -> u64 {
        self.bits.bytes_consumed()
    }
}
