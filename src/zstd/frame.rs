use crate::bits::BitReader;
use crate::checksum::ChecksumKind;
use crate::error::{Error, Result};
use crate::source::{
    BlockInfo, BlockType, ContentSize, FrameEvent, FrameParser, MemberInfo, RawBlock, Trailer,
};
use std::io::Read;

pub const FRAME_MAGIC: u32 = 0xFD2F_B528;
pub const SKIPPABLE_MAGIC: u32 = 0x184D_2A50;
pub const SKIPPABLE_MASK: u32 = 0xFFFF_FFF0;

/// Largest block a frame may carry, before capping by the window
pub const MAX_BLOCK_SIZE: usize = 128 * 1024;
/// Smallest window a window descriptor can encode
const MIN_WINDOW_LOG: u32 = 10;

/// Parsed Frame_Header
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub window_size: u64,
    pub content_size: Option<u64>,
    pub single_segment: bool,
    pub content_checksum: bool,
    pub dictionary_id: Option<u32>,
}

impl FrameHeader {
    /// Parse the header that follows the magic number
    pub fn parse<R: Read>(bits: &mut BitReader<R>) -> Result<Self> {
        let descriptor = bits.read_byte()?;
        let fcs_flag = descriptor >> 6;
        let single_segment = descriptor & 0x20 != 0;
        if descriptor & 0x08 != 0 {
            return Err(Error::ReservedBitSet("Zstd frame header descriptor"));
        }
        let content_checksum = descriptor & 0x04 != 0;
        let dict_flag = descriptor & 0x03;

        let window_from_descriptor = if single_segment {
            None
        } else {
            let wd = bits.read_byte()?;
            let window_log = MIN_WINDOW_LOG + (wd >> 3) as u32;
            let base = 1u64 << window_log;
            Some(base + (base / 8) * (wd & 0x07) as u64)
        };

        let dictionary_id = match dict_flag {
            0 => None,
            1 => Some(bits.read_byte()? as u32),
            2 => Some(bits.read_u16_le()? as u32),
            _ => Some(bits.read_u32_le()?),
        };

        let content_size = match (fcs_flag, single_segment) {
            (0, false) => None,
            (0, true) => Some(bits.read_byte()? as u64),
            (1, _) => Some(bits.read_u16_le()? as u64 + 256),
            (2, _) => Some(bits.read_u32_le()? as u64),
            _ => {
                let low = bits.read_u32_le()? as u64;
                let high = bits.read_u32_le()? as u64;
                Some(low | (high << 32))
            }
        };

        let window_size = match window_from_descriptor {
            Some(window) => window,
            None => content_size.unwrap_or(0),
        };

        Ok(Self { window_size, content_size, single_segment, content_checksum, dictionary_id })
    }

    /// Largest block size allowed in this frame
    pub fn block_max_size(&self) -> usize {
        (self.window_size.min(MAX_BLOCK_SIZE as u64) as usize).max(1)
    }
}

/// Decode a 3-byte Block_Header
pub fn block_info(raw: u32, block_max_size: usize) -> Result<BlockInfo> {
    let last = raw & 1 != 0;
    let size = (raw >> 3) as usize;
    let (block_type, compressed_size, regenerated_size) = match (raw >> 1) & 0x03 {
        0 => (BlockType::Raw, size, Some(size)),
        1 => (BlockType::Rle, 1, Some(size)),
        2 => (BlockType::Compressed, size, None),
        other => return Err(Error::InvalidBlockType(other as u8)),
    };
    if size > block_max_size {
        return Err(Error::BlockTooLarge { size, max: block_max_size });
    }
    Ok(BlockInfo { block_type, compressed_size, regenerated_size, last })
}

#[derive(Clone, Copy, Debug)]
enum Phase {
    FrameStart,
    Blocks(FrameHeader),
    Checksum(FrameHeader),
    Done,
}

/// Splits a sequence of Zstd frames into blocks
pub struct ZstdFrameParser<R: Read> {
    bits: BitReader<R>,
    max_window_size: usize,
    phase: Phase,
    frames: u64,
}

impl<R: Read> ZstdFrameParser<R> {
    pub fn new(bits: BitReader<R>, max_window_size: usize) -> Self {
        Self { bits, max_window_size, phase: Phase::FrameStart, frames: 0 }
    }

    fn start_frame(&mut self) -> Result<Option<FrameEvent>> {
        loop {
            if self.frames > 0 && self.bits.is_at_end()? {
                self.phase = Phase::Done;
                return Ok(None);
            }
            let magic = self.bits.read_u32_le()?;
            self.frames += 1;

            if magic & SKIPPABLE_MASK == SKIPPABLE_MAGIC {
                let size = self.bits.read_u32_le()? as u64;
                tracing::debug!(size, "skipping zstd skippable frame");
                let skipped =
                    std::io::copy(&mut (&mut self.bits).take(size), &mut std::io::sink())?;
                if skipped != size {
                    return Err(Error::UnexpectedEof);
                }
                continue;
            }
            if magic != FRAME_MAGIC {
                return Err(Error::InvalidMagicNumber(magic));
            }

            let header = FrameHeader::parse(&mut self.bits)?;
            if let Some(id) = header.dictionary_id.filter(|&id| id != 0) {
                return Err(Error::DictionaryUnsupported(id));
            }
            if header.window_size > self.max_window_size as u64 {
                return Err(Error::WindowTooLarge {
                    size: header.window_size,
                    max: self.max_window_size,
                });
            }

            tracing::debug!(frame = self.frames, ?header, "zstd frame");
            self.phase = Phase::Blocks(header);
            return Ok(Some(FrameEvent::MemberStart(MemberInfo {
                window_size: header.window_size as usize,
                checksum: header.content_checksum.then_some(ChecksumKind::Xxh64),
            })));
        }
    }

    fn next_block(&mut self, header: FrameHeader) -> Result<FrameEvent> {
        let mut raw = [0u8; 3];
        self.bits.read_bytes(&mut raw)?;
        let info = block_info(u32::from_le_bytes([raw[0], raw[1], raw[2], 0]), header.block_max_size())?;

        let mut payload = vec![0u8; info.compressed_size];
        self.bits.read_bytes(&mut payload)?;
        tracing::trace!(?info, "zstd block");

        if info.last {
            self.phase = Phase::Checksum(header);
        }
        Ok(FrameEvent::Block(RawBlock { info, payload, checksum_mismatch: false }))
    }

    fn end_frame(&mut self, header: FrameHeader) -> Result<FrameEvent> {
        let checksum = if header.content_checksum { Some(self.bits.read_u32_le()?) } else { None };
        self.phase = Phase::FrameStart;
        Ok(FrameEvent::MemberEnd(Trailer {
            checksum,
            content_size: header.content_size.map(ContentSize::Exact),
        }))
    }
}

impl<R: Read> FrameParser for ZstdFrameParser<R> {
    fn next_event(&mut self) -> Result<Option<FrameEvent>> {
        match self.phase {
            Phase::FrameStart => self.start_frame(),
            Phase::Blocks(header) => self.next_block(header).map(Some),
            Phase::Checksum(header) => self.end_frame(header).map(Some),
            Phase::Done => Ok(None),
        }
    }

    fn bytes_consumed(&self) -> u64 {
        self.bits.bytes_consumed()
    }
}
