//! Zstandard (RFC 8878) frames, literals and sequences.

pub mod decoder;
pub mod frame;
pub mod huffman;
pub mod literals;
pub mod sequences;

pub use decoder::ZstdBlockDecoder;
pub use frame::{FrameHeader, ZstdFrameParser};
