use crate::bits::BitReader;
use crate::checksum::ChecksumKind;
use crate::error::{Error, Result};
use crate::source::{
    BlockInfo, BlockType, ContentSize, FrameEvent, FrameParser, MemberInfo, RawBlock, Trailer,
};
use std::io::Read;
use xxhash_rust::xxh32::xxh32;

pub const FRAME_MAGIC: u32 = 0x184D_2204;
pub const LEGACY_MAGIC: u32 = 0x184C_2102;
pub const SKIPPABLE_MAGIC: u32 = 0x184D_2A50;
pub const SKIPPABLE_MASK: u32 = 0xFFFF_FFF0;

/// LZ4 offsets are 16 bits
pub const WINDOW_SIZE: usize = 64 * 1024;
/// Uncompressed block size of legacy frames
pub const LEGACY_BLOCK_SIZE: usize = 8 << 20;

/// Top bit of a block size marks an uncompressed block
const UNCOMPRESSED_FLAG: u32 = 0x8000_0000;

/// Frame descriptor flags (FLG byte)
const FLG_BLOCK_INDEPENDENCE: u8 = 1 << 5;
const FLG_BLOCK_CHECKSUM: u8 = 1 << 4;
const FLG_CONTENT_SIZE: u8 = 1 << 3;
const FLG_CONTENT_CHECKSUM: u8 = 1 << 2;
const FLG_RESERVED: u8 = 1 << 1;
const FLG_DICT_ID: u8 = 1 << 0;

/// Parsed LZ4 frame descriptor
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameDescriptor {
    pub block_independence: bool,
    pub block_checksum: bool,
    pub content_checksum: bool,
    pub content_size: Option<u64>,
    pub block_max_size: usize,
}

impl FrameDescriptor {
    /// Parse the descriptor bytes that follow the magic number, including the
    /// trailing header checksum byte. Returns the descriptor and bytes used.
    pub fn parse(bytes: &[u8]) -> Result<(Self, usize)> {
        if bytes.len() < 3 {
            return Err(Error::UnexpectedEof);
        }
        let flg = bytes[0];
        let bd = bytes[1];

        let version = flg >> 6;
        if version != 1 {
            return Err(Error::UnsupportedFrameVersion(version));
        }
        if flg & FLG_RESERVED != 0 || bd & 0x8F != 0 {
            return Err(Error::ReservedBitSet("LZ4 frame descriptor"));
        }

        let block_max_size = match (bd >> 4) & 0x07 {
            4 => 64 << 10,
            5 => 256 << 10,
            6 => 1 << 20,
            7 => 4 << 20,
            _ => return Err(Error::CorruptBlock("invalid LZ4 block maximum size")),
        };

        let mut len = 2;
        let content_size = if flg & FLG_CONTENT_SIZE != 0 {
            let field = bytes.get(len..len + 8).ok_or(Error::UnexpectedEof)?;
            len += 8;
            Some(u64::from_le_bytes(field.try_into().map_err(|_| Error::UnexpectedEof)?))
        } else {
            None
        };
        let dict_id = if flg & FLG_DICT_ID != 0 {
            let field = bytes.get(len..len + 4).ok_or(Error::UnexpectedEof)?;
            len += 4;
            Some(u32::from_le_bytes(field.try_into().map_err(|_| Error::UnexpectedEof)?))
        } else {
            None
        };

        let found = *bytes.get(len).ok_or(Error::UnexpectedEof)?;
        let expected = ((xxh32(&bytes[..len], 0) >> 8) & 0xFF) as u8;
        if found != expected {
            return Err(Error::HeaderChecksumMismatch { expected, found });
        }
        if let Some(id) = dict_id {
            return Err(Error::DictionaryUnsupported(id));
        }

        Ok((
            Self {
                block_independence: flg & FLG_BLOCK_INDEPENDENCE != 0,
                block_checksum: flg & FLG_BLOCK_CHECKSUM != 0,
                content_checksum: flg & FLG_CONTENT_CHECKSUM != 0,
                content_size,
                block_max_size,
            },
            len + 1,
        ))
    }

    /// Descriptor length implied by the FLG byte, header checksum included
    pub fn encoded_len(flg: u8) -> usize {
        let mut len = 3;
        if flg & FLG_CONTENT_SIZE != 0 {
            len += 8;
        }
        if flg & FLG_DICT_ID != 0 {
            len += 4;
        }
        len
    }
}

/// Interpret a frame block size field
pub fn block_info(raw: u32, block_max_size: usize) -> Result<BlockInfo> {
    let size = (raw & !UNCOMPRESSED_FLAG) as usize;
    if size > block_max_size {
        return Err(Error::BlockTooLarge { size, max: block_max_size });
    }
    let block_type =
        if raw & UNCOMPRESSED_FLAG != 0 { BlockType::Raw } else { BlockType::Compressed };
    let regenerated_size = (block_type == BlockType::Raw).then_some(size);
    Ok(BlockInfo { block_type, compressed_size: size, regenerated_size, last: raw == 0 })
}

#[derive(Clone, Copy, Debug)]
enum Phase {
    FrameStart,
    Blocks(FrameDescriptor),
    LegacyBlocks,
    Done,
}

/// Splits LZ4 frames (and legacy frames) into blocks
pub struct Lz4FrameParser<R: Read> {
    bits: BitReader<R>,
    phase: Phase,
    frames: u64,
    /// Magic number read while looking for the end of a legacy frame
    pending_magic: Option<u32>,
}

impl<R: Read> Lz4FrameParser<R> {
    pub fn new(bits: BitReader<R>) -> Self {
        Self { bits, phase: Phase::FrameStart, frames: 0, pending_magic: None }
    }

    fn read_payload(&mut self, size: usize) -> Result<Vec<u8>> {
        let mut payload = vec![0u8; size];
        self.bits.read_bytes(&mut payload)?;
        Ok(payload)
    }

    fn start_frame(&mut self) -> Result<Option<FrameEvent>> {
        loop {
            let magic = match self.pending_magic.take() {
                Some(magic) => magic,
                None => {
                    if self.frames > 0 && self.bits.is_at_end()? {
                        self.phase = Phase::Done;
                        return Ok(None);
                    }
                    self.bits.read_u32_le()?
                }
            };

            match magic {
                FRAME_MAGIC => {
                    let mut head = [0u8; 15];
                    self.bits.read_bytes(&mut head[..1])?;
                    let len = FrameDescriptor::encoded_len(head[0]);
                    self.bits.read_bytes(&mut head[1..len])?;
                    let (descriptor, _) = FrameDescriptor::parse(&head[..len])?;

                    self.frames += 1;
                    self.phase = Phase::Blocks(descriptor);
                    tracing::debug!(frame = self.frames, ?descriptor, "lz4 frame");
                    return Ok(Some(FrameEvent::MemberStart(MemberInfo {
                        window_size: WINDOW_SIZE,
                        checksum: descriptor.content_checksum.then_some(ChecksumKind::Xxh32),
                    })));
                }
                LEGACY_MAGIC => {
                    self.frames += 1;
                    self.phase = Phase::LegacyBlocks;
                    tracing::debug!(frame = self.frames, "lz4 legacy frame");
                    return Ok(Some(FrameEvent::MemberStart(MemberInfo {
                        window_size: WINDOW_SIZE,
                        checksum: None,
                    })));
                }
                m if m & SKIPPABLE_MASK == SKIPPABLE_MAGIC => {
                    let size = self.bits.read_u32_le()? as usize;
                    tracing::debug!(size, "skipping lz4 skippable frame");
                    let skipped =
                        std::io::copy(&mut (&mut self.bits).take(size as u64), &mut std::io::sink())?;
                    if skipped != size as u64 {
                        return Err(Error::UnexpectedEof);
                    }
                    self.frames += 1;
                }
                other => return Err(Error::InvalidMagicNumber(other)),
            }
        }
    }

    fn next_block(&mut self, descriptor: FrameDescriptor) -> Result<FrameEvent> {
        let raw = self.bits.read_u32_le()?;
        if raw == 0 {
            let checksum =
                if descriptor.content_checksum { Some(self.bits.read_u32_le()?) } else { None };
            self.phase = Phase::FrameStart;
            return Ok(FrameEvent::MemberEnd(Trailer {
                checksum,
                content_size: descriptor.content_size.map(ContentSize::Exact),
            }));
        }

        let info = block_info(raw, descriptor.block_max_size)?;
        let payload = self.read_payload(info.compressed_size)?;
        let mut checksum_mismatch = false;
        if descriptor.block_checksum {
            let expected = self.bits.read_u32_le()?;
            checksum_mismatch = xxh32(&payload, 0) != expected;
        }
        tracing::trace!(?info, "lz4 block");
        Ok(FrameEvent::Block(RawBlock { info, payload, checksum_mismatch }))
    }

    fn next_legacy_block(&mut self) -> Result<FrameEvent> {
        if self.bits.is_at_end()? {
            self.phase = Phase::Done;
            return Ok(FrameEvent::MemberEnd(Trailer::default()));
        }
        let size = self.bits.read_u32_le()?;
        if size == FRAME_MAGIC || size == LEGACY_MAGIC || size & SKIPPABLE_MASK == SKIPPABLE_MAGIC {
            self.pending_magic = Some(size);
            self.phase = Phase::FrameStart;
            return Ok(FrameEvent::MemberEnd(Trailer::default()));
        }

        let size = size as usize;
        // Compressed size bound of an 8 MiB block
        let max = LEGACY_BLOCK_SIZE + LEGACY_BLOCK_SIZE / 255 + 16;
        if size > max {
            return Err(Error::BlockTooLarge { size, max });
        }
        let payload = self.read_payload(size)?;
        let info = BlockInfo {
            block_type: BlockType::Compressed,
            compressed_size: size,
            regenerated_size: None,
            last: false,
        };
        Ok(FrameEvent::Block(RawBlock { info, payload, checksum_mismatch: false }))
    }
}

impl<R: Read> FrameParser for Lz4FrameParser<R> {
    fn next_event(&mut self) -> Result<Option<FrameEvent>> {
        match self.phase {
            Phase::FrameStart => self.start_frame(),
            Phase::Blocks(descriptor) => self.next_block(descriptor).map(Some),
            Phase::LegacyBlocks => self.next_legacy_block().map(Some),
            Phase::Done => Ok(None),
        }
    }

    fn bytes_consumed(&self) -> u64 {
        self.bits.bytes_consumed()
    }
}
