use super::buffer::HistoryBuffer;
use crate::checksum::Digest;
use crate::error::{Error, Result};
use crate::source::{MemberInfo, StreamEvent, Trailer};
use crate::token::{Token, TokenBlock};
use crate::DecompressConfig;
use std::io::Write;

/// Where the engine is within the current token
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EngineState {
    ReadLengths,
    WriteLiteral { remaining: u32 },
    ReadMatchParams,
    /// Word-at-a-time copy, offset >= parallel width
    CopyMatch { remaining: u32, offset: usize },
    /// Byte-at-a-time copy for offsets shorter than a word
    CopyBytewise { remaining: u32, offset: usize },
    Done,
}

/// Counters kept by the engine
#[derive(Clone, Copy, Debug, Default)]
pub struct EngineStats {
    pub output_bytes: u64,
    pub members: u64,
    pub blocks: u64,
    pub tokens: u64,
    pub matches: u64,
    pub literal_bytes: u64,
    pub checksum_mismatch: bool,
}

/// Resolves tokens against the history buffer and writes the output.
///
/// Literals are emitted and matches copied `parallel` bytes per step. A
/// match whose offset is shorter than one step is copied a byte at a time so
/// that every byte it reads has already been written.
pub struct MatchEngine<W: Write> {
    history: HistoryBuffer,
    parallel: usize,
    output: W,
    pending: Vec<u8>,
    buffer_size: usize,
    verify: bool,
    digest: Option<Digest>,
    state: EngineState,
    stats: EngineStats,
}

impl<W: Write> MatchEngine<W> {
    pub fn new(output: W, config: &DecompressConfig) -> Self {
        let parallel = config.parallel_bytes.bytes();
        let buffer_size = config.buffer_size.max(1);
        Self {
            history: HistoryBuffer::new(32 * 1024, parallel),
            parallel,
            output,
            pending: Vec::with_capacity(buffer_size),
            buffer_size,
            verify: config.verify_checksums,
            digest: None,
            state: EngineState::ReadLengths,
            stats: EngineStats::default(),
        }
    }

    /// Feed one event from a token source
    pub fn handle(&mut self, event: StreamEvent) -> Result<()> {
        match event {
            StreamEvent::MemberStart(info) => self.start_member(&info),
            StreamEvent::Tokens(block) => self.process_block(&block),
            StreamEvent::MemberEnd(trailer) => self.end_member(&trailer),
        }
    }

    pub fn start_member(&mut self, info: &MemberInfo) -> Result<()> {
        if self.state == EngineState::Done {
            return Err(Error::TokensAfterEnd);
        }
        // Bytes still buffered belong to the previous member's digest
        self.flush()?;
        self.history.start_member(info.window_size);
        self.digest = match info.checksum {
            Some(kind) if self.verify => Some(Digest::new(kind)),
            _ => None,
        };
        self.stats.members += 1;
        tracing::debug!(
            member = self.stats.members,
            window = info.window_size,
            checksum = ?info.checksum,
            "member start"
        );
        Ok(())
    }

    pub fn end_member(&mut self, trailer: &Trailer) -> Result<()> {
        self.flush()?;
        let produced = self.history.member_produced();

        if let (Some(digest), Some(expected)) = (self.digest.take(), trailer.checksum) {
            let found = digest.finish();
            if found != expected {
                tracing::warn!(
                    member = self.stats.members,
                    expected = format_args!("{:08x}", expected),
                    found = format_args!("{:08x}", found),
                    "checksum mismatch"
                );
                self.stats.checksum_mismatch = true;
            }
        }

        if let Some(size) = trailer.content_size {
            if self.verify && !size.matches(produced) {
                tracing::warn!(member = self.stats.members, ?size, produced, "content size mismatch");
                self.stats.checksum_mismatch = true;
            }
        }

        tracing::debug!(member = self.stats.members, produced, "member end");
        Ok(())
    }

    /// Run every token of `block` through the state machine
    pub fn process_block(&mut self, block: &TokenBlock) -> Result<()> {
        self.stats.blocks += 1;
        if block.checksum_mismatch && self.verify {
            tracing::warn!(member = self.stats.members, "block checksum mismatch");
            self.stats.checksum_mismatch = true;
        }
        tracing::trace!(tokens = block.tokens.len(), literals = block.literals.len(), "token block");

        let mut literal_pos = 0usize;
        for token in &block.tokens {
            if self.state == EngineState::Done {
                return Err(Error::TokensAfterEnd);
            }
            self.run_token(token, &block.literals, &mut literal_pos)?;
        }

        let leftover = block.literals.len() - literal_pos;
        if leftover != 0 {
            return Err(Error::LiteralStreamMismatch(leftover));
        }
        Ok(())
    }

    fn run_token(&mut self, token: &Token, literals: &[u8], literal_pos: &mut usize) -> Result<()> {
        self.state = EngineState::ReadLengths;
        loop {
            match self.state {
                EngineState::ReadLengths => {
                    self.stats.tokens += 1;
                    let needed = token.literal_length as usize;
                    let available = literals.len() - *literal_pos;
                    if needed > available {
                        return Err(Error::LiteralOverrun { needed, available });
                    }
                    self.state = if token.literal_length > 0 {
                        EngineState::WriteLiteral { remaining: token.literal_length }
                    } else {
                        EngineState::ReadMatchParams
                    };
                }
                EngineState::WriteLiteral { remaining } => {
                    let n = (remaining as usize).min(self.parallel);
                    let start = *literal_pos;
                    self.emit(&literals[start..start + n])?;
                    *literal_pos += n;
                    self.stats.literal_bytes += n as u64;
                    let remaining = remaining - n as u32;
                    self.state = if remaining == 0 {
                        EngineState::ReadMatchParams
                    } else {
                        EngineState::WriteLiteral { remaining }
                    };
                }
                EngineState::ReadMatchParams => {
                    if token.is_end() {
                        self.state = EngineState::Done;
                        return Ok(());
                    }
                    if token.match_length == 0 {
                        return Ok(());
                    }
                    let offset = token.match_offset as usize;
                    if offset == 0 {
                        return Err(Error::ZeroMatchOffset);
                    }
                    let available = self.history.available();
                    if offset as u64 > available {
                        return Err(Error::OffsetBeyondOutput { offset: offset as u64, available });
                    }
                    self.stats.matches += 1;
                    let remaining = token.match_length;
                    self.state = if offset < self.parallel {
                        EngineState::CopyBytewise { remaining, offset }
                    } else {
                        EngineState::CopyMatch { remaining, offset }
                    };
                }
                EngineState::CopyMatch { remaining, offset } => {
                    let n = (remaining as usize).min(self.parallel);
                    let mut word = [0u8; 16];
                    self.history.read_word(offset, &mut word[..n]);
                    self.emit(&word[..n])?;
                    let remaining = remaining - n as u32;
                    if remaining == 0 {
                        return Ok(());
                    }
                    self.state = EngineState::CopyMatch { remaining, offset };
                }
                EngineState::CopyBytewise { remaining, offset } => {
                    let byte = self.history.byte_at(offset);
                    self.emit(&[byte])?;
                    if remaining == 1 {
                        return Ok(());
                    }
                    self.state = EngineState::CopyBytewise { remaining: remaining - 1, offset };
                }
                EngineState::Done => return Err(Error::TokensAfterEnd),
            }
        }
    }

    #[inline]
    fn emit(&mut self, bytes: &[u8]) -> Result<()> {
        self.history.push_slice(bytes);
        self.pending.extend_from_slice(bytes);
        if self.pending.len() >= self.buffer_size {
            self.flush_pending()?;
        }
        Ok(())
    }

    fn flush_pending(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        if let Some(digest) = self.digest.as_mut() {
            digest.update(&self.pending);
        }
        self.stats.output_bytes += self.pending.len() as u64;
        let result = self.output.write_all(&self.pending);
        self.pending.clear();
        result.map_err(Error::Io)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.flush_pending()?;
        self.output.flush()?;
        Ok(())
    }

    /// Whether the end-of-stream marker has been seen
    pub fn is_finished(&self) -> bool {
        self.state == EngineState::Done
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Flush and hand back the writer. Fails if the stream never ended.
    pub fn finish(mut self) -> Result<(W, EngineStats)> {
        self.flush()?;
        if self.state != EngineState::Done {
            return Err(Error::UnexpectedEof);
        }
        Ok((self.output, self.stats))
    }
}
