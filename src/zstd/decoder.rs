use super::frame::MAX_BLOCK_SIZE;
use super::huffman::HuffmanTable;
use super::literals::decode_literals;
use super::sequences::{decode_sequences, SequenceState};
use crate::error::{Error, Result};
use crate::source::{BlockDecoder, BlockType, MemberInfo, RawBlock};
use crate::token::{Token, TokenBlock};

/// Turns Zstd blocks into tokens.
///
/// The literals tree, the three sequence tables and the repeat offsets carry
/// over from block to block within a frame and are reset at each frame.
#[derive(Debug)]
pub struct ZstdBlockDecoder {
    tree: Option<HuffmanTable>,
    sequences: SequenceState,
    /// Most bytes one block may regenerate: the window, capped at 128 KiB
    block_max: usize,
    blocks: u64,
}

impl Default for ZstdBlockDecoder {
    fn default() -> Self {
        Self {
            tree: None,
            sequences: SequenceState::new(),
            block_max: MAX_BLOCK_SIZE,
            blocks: 0,
        }
    }
}

impl ZstdBlockDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn decode_compressed(&mut self, payload: &[u8]) -> Result<TokenBlock> {
        let (literals, used) = decode_literals(payload, &mut self.tree)?;
        let sequences = decode_sequences(&payload[used..], &mut self.sequences)?;

        let mut tokens = Vec::with_capacity(sequences.len() + 1);
        let mut consumed = 0usize;
        let mut regenerated = 0usize;
        for seq in &sequences {
            consumed += seq.literal_length as usize;
            if consumed > literals.len() {
                return Err(Error::LiteralOverrun {
                    needed: consumed,
                    available: literals.len(),
                });
            }
            let token = Token::new(seq.literal_length, seq.match_length, seq.offset);
            regenerated += token.uncompressed_size();
            if regenerated > self.block_max {
                return Err(Error::BlockTooLarge { size: regenerated, max: self.block_max });
            }
            tokens.push(token);
        }
        let rest = literals.len() - consumed;
        if regenerated + rest > self.block_max {
            return Err(Error::BlockTooLarge { size: regenerated + rest, max: self.block_max });
        }
        if rest > 0 {
            tokens.push(Token::literals(rest as u32));
        }
        tracing::trace!(
            block = self.blocks,
            sequences = sequences.len(),
            literals = literals.len(),
            "zstd compressed block"
        );
        Ok(TokenBlock::new(tokens, literals))
    }
}

impl BlockDecoder for ZstdBlockDecoder {
    fn start_member(&mut self, info: &MemberInfo) -> Result<()> {
        self.tree = None;
        self.sequences = SequenceState::new();
        self.block_max = info.window_size.min(MAX_BLOCK_SIZE).max(1);
        Ok(())
    }

    fn decode_block(&mut self, raw: RawBlock) -> Result<TokenBlock> {
        self.blocks += 1;
        let mut block = match raw.info.block_type {
            BlockType::Raw => TokenBlock::literal_run(raw.payload),
            BlockType::Rle => {
                let byte = *raw.payload.first().ok_or(Error::UnexpectedEof)?;
                match raw.info.regenerated_size.unwrap_or(0) {
                    0 => TokenBlock::default(),
                    1 => TokenBlock::literal_run(vec![byte]),
                    // One literal, then a self-overlapping copy at offset 1
                    n => TokenBlock::new(vec![Token::new(1, n as u32 - 1, 1)], vec![byte]),
                }
            }
            BlockType::Compressed => self.decode_compressed(&raw.payload)?,
        };
        block.checksum_mismatch = raw.checksum_mismatch;
        Ok(block)
    }
}
