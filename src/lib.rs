pub mod bits;
pub mod checksum;
pub mod deflate;
pub mod error;
pub mod fse;
pub mod gzip;
pub mod history;
pub mod huffman;
pub mod lz4;
pub mod pipeline;
pub mod snappy;
pub mod source;
pub mod token;
pub mod zstd;

pub use error::{Error, Result};
pub use history::{EngineStats, MatchEngine};
pub use pipeline::{BatchDecompressor, PipelinedDecompressor, SingleThreadedDecompressor};
pub use token::{Token, TokenBlock};

use std::io::{Read, Write};

/// Compressed format of the input
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Codec {
    /// Detect from the leading magic bytes
    #[default]
    Auto,
    /// gzip (RFC 1952), possibly multi-member
    Gzip,
    /// zlib (RFC 1950)
    Zlib,
    /// Raw DEFLATE (RFC 1951) with no container
    Deflate,
    /// LZ4 frame format, including legacy frames
    Lz4,
    /// Snappy framing format
    Snappy,
    /// A single unframed Snappy block
    SnappyRaw,
    /// Zstandard (RFC 8878)
    Zstd,
}

impl Codec {
    /// Guess the codec from the first bytes of a stream.
    ///
    /// Raw DEFLATE and unframed Snappy carry no magic and are never detected.
    pub fn detect(data: &[u8]) -> Option<Self> {
        if data.len() < 2 {
            return None;
        }
        if data[0] == 0x1f && data[1] == 0x8b {
            return Some(Codec::Gzip);
        }
        if data.len() >= 4 {
            let magic = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
            match magic {
                zstd::frame::FRAME_MAGIC => return Some(Codec::Zstd),
                lz4::frame::FRAME_MAGIC | lz4::frame::LEGACY_MAGIC => return Some(Codec::Lz4),
                m if m & zstd::frame::SKIPPABLE_MASK == zstd::frame::SKIPPABLE_MAGIC => {
                    // Skippable frames are shared by LZ4 and Zstd: look past one
                    let size = data
                        .get(4..8)
                        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize)?;
                    return data.get(8 + size..).and_then(Self::detect).or(Some(Codec::Zstd));
                }
                _ => {}
            }
        }
        if data.len() >= 10 && data[0] == 0xff && &data[4..10] == snappy::frame::STREAM_IDENTIFIER {
            return Some(Codec::Snappy);
        }
        if gzip::ZlibHeader::check(data[0], data[1]).is_ok() {
            return Some(Codec::Zlib);
        }
        None
    }

    /// Parse a codec name as given on the command line
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "auto" => Some(Codec::Auto),
            "gzip" | "gz" => Some(Codec::Gzip),
            "zlib" => Some(Codec::Zlib),
            "deflate" | "raw-deflate" => Some(Codec::Deflate),
            "lz4" => Some(Codec::Lz4),
            "snappy" | "sz" => Some(Codec::Snappy),
            "snappy-raw" | "raw-snappy" => Some(Codec::SnappyRaw),
            "zstd" | "zst" => Some(Codec::Zstd),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Codec::Auto => "auto",
            Codec::Gzip => "gzip",
            Codec::Zlib => "zlib",
            Codec::Deflate => "deflate",
            Codec::Lz4 => "lz4",
            Codec::Snappy => "snappy",
            Codec::SnappyRaw => "snappy-raw",
            Codec::Zstd => "zstd",
        }
    }
}

/// Bytes the match engine moves per step, and the width of each input chunk
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ParallelBytes {
    One = 1,
    Four = 4,
    #[default]
    Eight = 8,
    Sixteen = 16,
}

impl ParallelBytes {
    pub fn from_bytes(bytes: usize) -> Option<Self> {
        match bytes {
            1 => Some(Self::One),
            4 => Some(Self::Four),
            8 => Some(Self::Eight),
            16 => Some(Self::Sixteen),
            _ => None,
        }
    }

    pub fn bytes(&self) -> usize {
        *self as usize
    }
}

/// Configuration for decompression
#[derive(Clone, Debug)]
pub struct DecompressConfig {
    /// Input format (default: detect)
    pub codec: Codec,
    /// Bytes per match-engine step
    pub parallel_bytes: ParallelBytes,
    /// Run the container and block stages on their own threads
    pub pipelined: bool,
    /// Capacity of each queue between pipelined stages
    pub queue_depth: usize,
    /// Buffer size for I/O operations
    pub buffer_size: usize,
    /// Compare checksums and content sizes against the output
    pub verify_checksums: bool,
    /// Largest Zstd window accepted
    pub max_window_size: usize,
    /// Worker threads for batch decompression (0 = auto)
    pub num_threads: usize,
}

impl Default for DecompressConfig {
    fn default() -> Self {
        Self {
            codec: Codec::Auto,
            parallel_bytes: ParallelBytes::Eight,
            pipelined: false,
            queue_depth: 4,
            buffer_size: 128 * 1024,
            verify_checksums: true,
            max_window_size: 128 << 20,
            num_threads: 0,
        }
    }
}

/// Statistics from a decompression
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DecompressStats {
    pub input_bytes: u64,
    pub output_bytes: u64,
    pub members: u64,
    pub blocks: u64,
    pub tokens: u64,
    pub matches: u64,
    pub literal_bytes: u64,
    /// A checksum or recorded size disagreed with the output. The output is
    /// still complete.
    pub checksum_mismatch: bool,
}

impl DecompressStats {
    pub fn from_engine(input_bytes: u64, engine: EngineStats) -> Self {
        Self {
            input_bytes,
            output_bytes: engine.output_bytes,
            members: engine.members,
            blocks: engine.blocks,
            tokens: engine.tokens,
            matches: engine.matches,
            literal_bytes: engine.literal_bytes,
            checksum_mismatch: engine.checksum_mismatch,
        }
    }
}

/// Trait for the complete decompression operation
pub trait Decompressor {
    /// Decompress `input` into `output`
    fn decompress<R: Read + Send, W: Write>(&mut self, input: R, output: W)
        -> Result<DecompressStats>;
}

/// Output of an in-memory decompression
#[derive(Clone, Debug, Default)]
pub struct Decompressed {
    pub data: Vec<u8>,
    pub stats: DecompressStats,
}

/// Decompress a complete buffer on the calling thread
pub fn decompress(codec: Codec, data: &[u8]) -> Result<Decompressed> {
    let config = DecompressConfig { codec, ..Default::default() };
    decompress_with(&config, data)
}

/// Decompress a complete buffer with an explicit configuration
pub fn decompress_with(config: &DecompressConfig, data: &[u8]) -> Result<Decompressed> {
    let mut out = Vec::with_capacity(data.len().saturating_mul(3));
    let stats = if config.pipelined {
        PipelinedDecompressor::new(config.clone()).decompress(data, &mut out)?
    } else {
        SingleThreadedDecompressor::new(config.clone()).decompress(data, &mut out)?
    };
    Ok(Decompressed { data: out, stats })
}
