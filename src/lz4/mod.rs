pub mod block;
pub mod frame;

pub use frame::{FrameDescriptor, Lz4FrameParser};

use crate::error::Result;
use crate::source::{BlockDecoder, BlockType, MemberInfo, RawBlock};
use crate::token::TokenBlock;

/// Turns LZ4 block payloads into tokens. LZ4 keeps no entropy state between
/// blocks, so linked blocks only need the shared member history.
#[derive(Debug, Default)]
pub struct Lz4BlockDecoder;

impl Lz4BlockDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl BlockDecoder for Lz4BlockDecoder {
    fn start_member(&mut self, _info: &MemberInfo) -> Result<()> {
        Ok(())
    }

    fn decode_block(&mut self, block: RawBlock) -> Result<TokenBlock> {
        let mut tokens = match block.info.block_type {
            BlockType::Compressed => block::decode_block(&block.payload)?,
            _ => TokenBlock::literal_run(block.payload),
        };
        tokens.checksum_mismatch = block.checksum_mismatch;
        Ok(tokens)
    }
}
