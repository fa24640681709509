pub mod block;
pub mod frame;

pub use frame::{SnappyFrameParser, SnappyRawParser};

use crate::error::Result;
use crate::source::{BlockDecoder, BlockType, MemberInfo, RawBlock};
use crate::token::TokenBlock;

/// Turns Snappy chunk payloads into tokens
#[derive(Debug, Default)]
pub struct SnappyBlockDecoder;

impl SnappyBlockDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl BlockDecoder for SnappyBlockDecoder {
    fn start_member(&mut self, _info: &MemberInfo) -> Result<()> {
        Ok(())
    }

    fn decode_block(&mut self, raw: RawBlock) -> Result<TokenBlock> {
        let mut tokens = match raw.info.block_type {
            BlockType::Compressed => block::decode_block(&raw.payload)?,
            _ => TokenBlock::literal_run(raw.payload),
        };
        tokens.checksum_mismatch = raw.checksum_mismatch;
        Ok(tokens)
    }
}
