use crate::bits::BitReader;
use crate::checksum::ChecksumKind;
use crate::error::{Error, Result};
use crate::source::{BlockInfo, BlockType, FrameEvent, FrameParser, MemberInfo, RawBlock, Trailer};
use std::collections::VecDeque;
use std::io::Read;

/// Body of the stream identifier chunk
pub const STREAM_IDENTIFIER: &[u8; 6] = b"sNaPpY";
/// Largest uncompressed size of one chunk
pub const MAX_CHUNK_SIZE: usize = 65536;

/// Chunk types of the framing format
pub mod chunk {
    pub const COMPRESSED: u8 = 0x00;
    pub const UNCOMPRESSED: u8 = 0x01;
    pub const PADDING: u8 = 0xFE;
    pub const STREAM_IDENTIFIER: u8 = 0xFF;
}

/// Splits a framed Snappy stream into chunks.
///
/// Every data chunk is its own member: chunks never reference each other's
/// output and each carries a masked CRC-32C of its uncompressed bytes.
pub struct SnappyFrameParser<R: Read> {
    bits: BitReader<R>,
    pending: VecDeque<FrameEvent>,
    seen_identifier: bool,
    chunks: u64,
}

impl<R: Read> SnappyFrameParser<R> {
    pub fn new(bits: BitReader<R>) -> Self {
        Self { bits, pending: VecDeque::with_capacity(3), seen_identifier: false, chunks: 0 }
    }

    fn read_body(&mut self, length: usize) -> Result<Vec<u8>> {
        let mut body = vec![0u8; length];
        self.bits.read_bytes(&mut body)?;
        Ok(body)
    }

    /// Read chunks until one carries data, queueing its events
    fn read_chunk(&mut self) -> Result<bool> {
        loop {
            if self.bits.is_at_end()? {
                return Ok(false);
            }
            let mut header = [0u8; 4];
            self.bits.read_bytes(&mut header)?;
            let chunk_type = header[0];
            let length = u32::from_le_bytes([header[1], header[2], header[3], 0]) as usize;

            if !self.seen_identifier && chunk_type != chunk::STREAM_IDENTIFIER {
                return Err(Error::InvalidChunkType(chunk_type));
            }

            match chunk_type {
                chunk::STREAM_IDENTIFIER => {
                    let body = self.read_body(length)?;
                    if body != STREAM_IDENTIFIER {
                        return Err(Error::CorruptBlock("bad Snappy stream identifier"));
                    }
                    self.seen_identifier = true;
                }
                chunk::COMPRESSED | chunk::UNCOMPRESSED => {
                    if length < 4 {
                        return Err(Error::CorruptBlock("Snappy chunk shorter than its checksum"));
                    }
                    let max = if chunk_type == chunk::UNCOMPRESSED {
                        MAX_CHUNK_SIZE
                    } else {
                        // Worst-case compressed size of a 64 KiB chunk
                        32 + MAX_CHUNK_SIZE + MAX_CHUNK_SIZE / 6
                    };
                    if length - 4 > max {
                        return Err(Error::BlockTooLarge { size: length - 4, max });
                    }

                    let checksum = self.bits.read_u32_le()?;
                    let payload = self.read_body(length - 4)?;
                    let block_type = if chunk_type == chunk::UNCOMPRESSED {
                        BlockType::Raw
                    } else {
                        BlockType::Compressed
                    };
                    let info = BlockInfo {
                        block_type,
                        compressed_size: payload.len(),
                        regenerated_size: (block_type == BlockType::Raw).then_some(payload.len()),
                        last: true,
                    };

                    self.chunks += 1;
                    tracing::trace!(chunk = self.chunks, ?block_type, size = payload.len(), "snappy chunk");
                    self.pending.push_back(FrameEvent::MemberStart(MemberInfo {
                        window_size: MAX_CHUNK_SIZE,
                        checksum: Some(ChecksumKind::MaskedCrc32c),
                    }));
                    self.pending.push_back(FrameEvent::Block(RawBlock {
                        info,
                        payload,
                        checksum_mismatch: false,
                    }));
                    self.pending.push_back(FrameEvent::MemberEnd(Trailer {
                        checksum: Some(checksum),
                        content_size: None,
                    }));
                    return Ok(true);
                }
                0x02..=0x7F => return Err(Error::InvalidChunkType(chunk_type)),
                // Padding and reserved skippable chunks
                _ => {
                    std::io::copy(&mut (&mut self.bits).take(length as u64), &mut std::io::sink())
                        .map_err(Error::Io)
                        .and_then(|n| {
                            if n == length as u64 {
                                Ok(())
                            } else {
                                Err(Error::UnexpectedEof)
                            }
                        })?;
                }
            }
        }
    }
}

impl<R: Read> FrameParser for SnappyFrameParser<R> {
    fn next_event(&mut self) -> Result<Option<FrameEvent>> {
        if self.pending.is_empty() && !self.read_chunk()? {
            if !self.seen_identifier {
                return Err(Error::UnexpectedEof);
            }
            return Ok(None);
        }
        Ok(self.pending.pop_front())
    }

    fn bytes_consumed(&self) -> u64 {
        self.bits.bytes_consumed()
    }
}

/// Presents an unframed Snappy block as a single member
pub struct SnappyRawParser<R: Read> {
    bits: BitReader<R>,
    pending: VecDeque<FrameEvent>,
    started: bool,
    /// The whole block is one window, so its declared length is bounded
    max_window_size: usize,
}

impl<R: Read> SnappyRawParser<R> {
    pub fn new(bits: BitReader<R>, max_window_size: usize) -> Self {
        Self { bits, pending: VecDeque::with_capacity(3), started: false, max_window_size }
    }
}

impl<R: Read> FrameParser for SnappyRawParser<R> {
    fn next_event(&mut self) -> Result<Option<FrameEvent>> {
        if !self.started {
            self.started = true;
            let mut payload = Vec::new();
            self.bits.read_to_end(&mut payload)?;
            let (length, _) = super::block::read_preamble(&payload)?;
            if length > self.max_window_size as u64 {
                return Err(Error::WindowTooLarge { size: length, max: self.max_window_size });
            }
            let info = BlockInfo {
                block_type: BlockType::Compressed,
                compressed_size: payload.len(),
                regenerated_size: Some(length as usize),
                last: true,
            };
            tracing::debug!(uncompressed = length, compressed = payload.len(), "raw snappy block");

            self.pending.push_back(FrameEvent::MemberStart(MemberInfo {
                window_size: length as usize,
                checksum: None,
            }));
            self.pending.push_back(FrameEvent::Block(RawBlock {
                info,
                payload,
                checksum_mismatch: false,
            }));
            self.pending.push_back(FrameEvent::MemberEnd(Trailer::default()));
        }
        Ok(self.pending.pop_front())
    }

    fn bytes_consumed(&self) -> u64 {
        self.bits.bytes_consumed()
    }
}
