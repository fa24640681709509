//! Stage interfaces between container parsing, block decoding and the match
//! engine.

use crate::bits::BitReader;
use crate::checksum::ChecksumKind;
use crate::deflate::{Container, DeflateSource};
use crate::error::{Error, Result};
use crate::lz4::{Lz4BlockDecoder, Lz4FrameParser};
use crate::snappy::{SnappyBlockDecoder, SnappyFrameParser, SnappyRawParser};
use crate::token::TokenBlock;
use crate::zstd::{ZstdBlockDecoder, ZstdFrameParser};
use crate::{Codec, DecompressConfig};
use std::io::{Cursor, Read};

/// Start of an independently decodable unit (gzip member, LZ4 frame, ...)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemberInfo {
    /// Largest match offset the member may use
    pub window_size: usize,
    /// Algorithm the trailer checksum was computed with, if any
    pub checksum: Option<ChecksumKind>,
}

/// Uncompressed size recorded by a container
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentSize {
    Exact(u64),
    /// gzip ISIZE: size modulo 2^32
    Modulo32(u32),
}

impl ContentSize {
    pub fn matches(&self, produced: u64) -> bool {
        match *self {
            ContentSize::Exact(size) => size == produced,
            ContentSize::Modulo32(size) => size == produced as u32,
        }
    }
}

/// End of a member: the values its output must be verified against
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Trailer {
    pub checksum: Option<u32>,
    pub content_size: Option<ContentSize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockType {
    /// Payload is the uncompressed data
    Raw,
    /// A single byte repeated `regenerated_size` times
    Rle,
    /// Entropy and/or LZ77 coded
    Compressed,
}

/// Header of one block, as read from the container
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
    pub block_type: BlockType,
    /// Bytes of payload that follow the header
    pub compressed_size: usize,
    /// Uncompressed size when the header records it
    pub regenerated_size: Option<usize>,
    /// Last block of the member
    pub last: bool,
}

/// A block header plus its payload bytes
#[derive(Clone, Debug)]
pub struct RawBlock {
    pub info: BlockInfo,
    pub payload: Vec<u8>,
    /// Set when a per-block checksum over the payload failed
    pub checksum_mismatch: bool,
}

#[derive(Debug)]
pub enum FrameEvent {
    MemberStart(MemberInfo),
    Block(RawBlock),
    MemberEnd(Trailer),
}

#[derive(Debug)]
pub enum StreamEvent {
    MemberStart(MemberInfo),
    Tokens(TokenBlock),
    MemberEnd(Trailer),
}

/// Container stage: splits the input into members and blocks.
///
/// `Ok(None)` means the input is exhausted.
pub trait FrameParser {
    fn next_event(&mut self) -> Result<Option<FrameEvent>>;

    /// Compressed bytes consumed so far
    fn bytes_consumed(&self) -> u64;
}

/// Entropy and token stage: turns one block's payload into tokens.
///
/// State that persists between blocks of a member (repeat tables, repeat
/// offsets) lives in the decoder and is reset by `start_member`.
pub trait BlockDecoder {
    fn start_member(&mut self, info: &MemberInfo) -> Result<()>;

    fn decode_block(&mut self, block: RawBlock) -> Result<TokenBlock>;
}

/// Anything that yields the token stream for the match engine.
///
/// The last `Tokens` event carries the end-of-stream marker.
pub trait TokenSource {
    fn next_event(&mut self) -> Result<Option<StreamEvent>>;

    fn bytes_consumed(&self) -> u64;
}

/// Couples a frame parser with its block decoder on one thread
pub struct FramedSource<F, D> {
    parser: F,
    decoder: D,
    finished: bool,
}

impl<F: FrameParser, D: BlockDecoder> FramedSource<F, D> {
    pub fn new(parser: F, decoder: D) -> Self {
        Self { parser, decoder, finished: false }
    }
}

impl<F: FrameParser, D: BlockDecoder> TokenSource for FramedSource<F, D> {
    fn next_event(&mut self) -> Result<Option<StreamEvent>> {
        if self.finished {
            return Ok(None);
        }
        match self.parser.next_event()? {
            Some(FrameEvent::MemberStart(info)) => {
                self.decoder.start_member(&info)?;
                Ok(Some(StreamEvent::MemberStart(info)))
            }
            Some(FrameEvent::Block(block)) => {
                Ok(Some(StreamEvent::Tokens(self.decoder.decode_block(block)?)))
            }
            Some(FrameEvent::MemberEnd(trailer)) => Ok(Some(StreamEvent::MemberEnd(trailer))),
            None => {
                self.finished = true;
                Ok(Some(StreamEvent::Tokens(TokenBlock::end_of_stream())))
            }
        }
    }

    fn bytes_consumed(&self) -> u64 {
        self.parser.bytes_consumed()
    }
}

impl<T: TokenSource + ?Sized> TokenSource for Box<T> {
    fn next_event(&mut self) -> Result<Option<StreamEvent>> {
        (**self).next_event()
    }

    fn bytes_consumed(&self) -> u64 {
        (**self).bytes_consumed()
    }
}

/// The stages a codec decomposes into
pub enum Stages<'a> {
    /// Byte-aligned blocks: a container parser feeding a block decoder
    Framed {
        parser: Box<dyn FrameParser + Send + 'a>,
        decoder: Box<dyn BlockDecoder + Send + 'a>,
    },
    /// Streams whose block boundaries are not byte aligned (DEFLATE)
    Direct(Box<dyn TokenSource + Send + 'a>),
}

impl<'a> Stages<'a> {
    /// Collapse into a single-threaded token source
    pub fn into_source(self) -> Box<dyn TokenSource + Send + 'a> {
        match self {
            Stages::Framed { parser, decoder } => Box::new(FramedSource::new(parser, decoder)),
            Stages::Direct(source) => source,
        }
    }
}

impl<F: FrameParser + ?Sized> FrameParser for Box<F> {
    fn next_event(&mut self) -> Result<Option<FrameEvent>> {
        (**self).next_event()
    }

    fn bytes_consumed(&self) -> u64 {
        (**self).bytes_consumed()
    }
}

impl<D: BlockDecoder + ?Sized> BlockDecoder for Box<D> {
    fn start_member(&mut self, info: &MemberInfo) -> Result<()> {
        (**self).start_member(info)
    }

    fn decode_block(&mut self, block: RawBlock) -> Result<TokenBlock> {
        (**self).decode_block(block)
    }
}

/// Bytes examined when detecting the codec
const DETECT_BYTES: usize = 16;

/// Skippable frame payload buffered while looking for the first real frame
const MAX_DETECT_SKIP: usize = 1 << 20;

/// Resolve `Codec::Auto` by peeking at the input, returning the codec and a
/// reader that still yields every input byte.
///
/// Leading skippable frames are read through so the frame after them decides
/// between LZ4 and Zstd. Past `MAX_DETECT_SKIP` buffered bytes Zstd is assumed.
pub fn resolve_codec<R: Read>(
    codec: Codec,
    mut input: R,
) -> Result<(Codec, std::io::Chain<Cursor<Vec<u8>>, R>)> {
    let mut prefix = Vec::with_capacity(DETECT_BYTES);
    if codec != Codec::Auto {
        return Ok((codec, Cursor::new(prefix).chain(input)));
    }

    (&mut input).take(DETECT_BYTES as u64).read_to_end(&mut prefix)?;
    let mut start = 0;
    while let Some(size) = skippable_frame_size(&prefix[start..]) {
        let next = start.saturating_add(8).saturating_add(size);
        if next > MAX_DETECT_SKIP {
            tracing::debug!(size, "skippable frame too large to look past");
            break;
        }
        let wanted = (next + DETECT_BYTES).saturating_sub(prefix.len());
        (&mut input).take(wanted as u64).read_to_end(&mut prefix)?;
        if prefix.len() < next {
            break;
        }
        start = next;
    }

    let codec = match Codec::detect(&prefix[start..]) {
        Some(codec) => codec,
        // Nothing but skippable frames
        None if start > 0 => Codec::Zstd,
        None => return Err(Error::UnknownFormat),
    };
    Ok((codec, Cursor::new(prefix).chain(input)))
}

/// Payload size of the skippable frame at the start of `data`, if there is one
fn skippable_frame_size(data: &[u8]) -> Option<usize> {
    let header = data.get(..8)?;
    let magic = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    if magic & crate::zstd::frame::SKIPPABLE_MASK != crate::zstd::frame::SKIPPABLE_MAGIC {
        return None;
    }
    Some(u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize)
}

/// Build the stages decoding `input` as `codec`
pub fn open_stages<'a, R: Read + Send + 'a>(
    codec: Codec,
    input: R,
    config: &DecompressConfig,
) -> Result<Stages<'a>> {
    let (codec, input) = resolve_codec(codec, input)?;
    let reader = BitReader::with_chunk_width(input, config.parallel_bytes.bytes());
    tracing::debug!(?codec, parallel_bytes = config.parallel_bytes.bytes(), "opening stages");

    let stages = match codec {
        Codec::Gzip => Stages::Direct(Box::new(DeflateSource::new(reader, Container::Gzip))),
        Codec::Zlib => Stages::Direct(Box::new(DeflateSource::new(reader, Container::Zlib))),
        Codec::Deflate => Stages::Direct(Box::new(DeflateSource::new(reader, Container::Raw))),
        Codec::Lz4 => Stages::Framed {
            parser: Box::new(Lz4FrameParser::new(reader)),
            decoder: Box::new(Lz4BlockDecoder::new()),
        },
        Codec::Snappy => Stages::Framed {
            parser: Box::new(SnappyFrameParser::new(reader)),
            decoder: Box::new(SnappyBlockDecoder::new()),
        },
        Codec::SnappyRaw => Stages::Framed {
            parser: Box::new(SnappyRawParser::new(reader, config.max_window_size)),
            decoder: Box::new(SnappyBlockDecoder::new()),
        },
        Codec::Zstd => Stages::Framed {
            parser: Box::new(ZstdFrameParser::new(reader, config.max_window_size)),
            decoder: Box::new(ZstdBlockDecoder::new()),
        },
        Codec::Auto => return Err(Error::UnknownFormat),
    };
    Ok(stages)
}

/// Single-threaded token source for `input`
pub fn open_source<'a, R: Read + Send + 'a>(
    codec: Codec,
    input: R,
    config: &DecompressConfig,
) -> Result<Box<dyn TokenSource + Send + 'a>> {
    Ok(open_stages(codec, input, config)?.into_source())
}
