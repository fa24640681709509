use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Container header errors
    #[error("Invalid gzip magic bytes: expected 0x1f8b, got 0x{0:04x}")]
    InvalidGzipMagic(u16),

    #[error("Unsupported compression method: {0} (only DEFLATE/8 supported)")]
    UnsupportedCompressionMethod(u8),

    #[error("Gzip header CRC mismatch: expected 0x{expected:04x}, got 0x{found:04x}")]
    GzipHeaderCrcMismatch { expected: u16, found: u16 },

    #[error("Invalid zlib header: 0x{cmf:02x} 0x{flg:02x}")]
    InvalidZlibHeader { cmf: u8, flg: u8 },

    #[error("Invalid magic number: 0x{0:08x}")]
    InvalidMagicNumber(u32),

    #[error("Unsupported frame version: {0}")]
    UnsupportedFrameVersion(u8),

    #[error("Frame header checksum mismatch: expected 0x{expected:02x}, got 0x{found:02x}")]
    HeaderChecksumMismatch { expected: u8, found: u8 },

    #[error("Reserved bit set in {0}")]
    ReservedBitSet(&'static str),

    #[error("Dictionaries are not supported (dictionary id {0})")]
    DictionaryUnsupported(u32),

    #[error("Window size {size} exceeds configured maximum {max}")]
    WindowTooLarge { size: u64, max: usize },

    #[error("Invalid block type: {0}")]
    InvalidBlockType(u8),

    #[error("Invalid chunk type: 0x{0:02x}")]
    InvalidChunkType(u8),

    #[error("Block size {size} exceeds maximum {max}")]
    BlockTooLarge { size: usize, max: usize },

    // Entropy decoding errors
    #[error("Invalid Huffman code length: {0} (max 15)")]
    InvalidCodeLength(u8),

    #[error("Huffman code oversubscribed: more codes than possible for bit length")]
    HuffmanOversubscribed,

    #[error("Huffman code incomplete: not all codes assigned")]
    HuffmanIncomplete,

    #[error("Invalid Huffman code in bitstream")]
    InvalidHuffmanCode,

    #[error("Invalid Huffman symbol: {0}")]
    InvalidHuffmanSymbol(u16),

    #[error("Invalid length code: {0}")]
    InvalidLengthCode(u16),

    #[error("Invalid distance code: {0}")]
    InvalidDistanceCode(u16),

    #[error("FSE accuracy log {log} exceeds maximum {max}")]
    AccuracyLogTooLarge { log: u8, max: u8 },

    #[error("Corrupt FSE distribution: {0}")]
    CorruptDistribution(&'static str),

    #[error("Invalid Huffman weights: {0}")]
    InvalidWeights(&'static str),

    // Token stream errors
    #[error("Match with zero offset")]
    ZeroMatchOffset,

    #[error("Match offset {offset} exceeds {available} bytes of history")]
    OffsetBeyondOutput { offset: u64, available: u64 },

    #[error("Token needs {needed} literal bytes but only {available} remain")]
    LiteralOverrun { needed: usize, available: usize },

    #[error("{0} literal bytes left unused at end of token block")]
    LiteralStreamMismatch(usize),

    #[error("Corrupt block: {0}")]
    CorruptBlock(&'static str),

    #[error("Tokens present after end-of-stream marker")]
    TokensAfterEnd,

    #[error("Stored block length mismatch: LEN={len}, NLEN={nlen}")]
    StoredBlockLengthMismatch { len: u16, nlen: u16 },

    #[error("Size mismatch: expected {expected} bytes, got {found}")]
    SizeMismatch { expected: u64, found: u64 },

    // Stream-level errors
    #[error("Unexpected end of input")]
    UnexpectedEof,

    #[error("Unrecognized compressed format")]
    UnknownFormat,

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
