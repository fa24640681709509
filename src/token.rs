/// One decoded instruction: emit `literal_length` bytes from the block's
/// literal stream, then copy `match_length` bytes from `match_offset` bytes
/// behind the write position.
///
/// A token with both lengths zero is the end-of-stream marker.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Token {
    pub literal_length: u32,
    pub match_length: u32,
    pub match_offset: u32,
}

impl Token {
    /// End-of-stream marker
    pub const END: Token = Token { literal_length: 0, match_length: 0, match_offset: 0 };

    pub fn literals(literal_length: u32) -> Self {
        Self { literal_length, match_length: 0, match_offset: 0 }
    }

    pub fn new(literal_length: u32, match_length: u32, match_offset: u32) -> Self {
        Self { literal_length, match_length, match_offset }
    }

    #[inline]
    pub fn is_end(&self) -> bool {
        self.literal_length == 0 && self.match_length == 0
    }

    /// Returns the uncompressed size this token represents
    pub fn uncompressed_size(&self) -> usize {
        self.literal_length as usize + self.match_length as usize
    }
}

/// A batch of tokens plus the literal bytes they reference, in order.
///
/// Tokens never straddle two blocks: every literal a token names lives in the
/// same block's `literals`.
#[derive(Clone, Debug, Default)]
pub struct TokenBlock {
    pub tokens: Vec<Token>,
    pub literals: Vec<u8>,
    /// Set when an integrity check on the compressed payload failed
    pub checksum_mismatch: bool,
}

impl TokenBlock {
    pub fn new(tokens: Vec<Token>, literals: Vec<u8>) -> Self {
        Self { tokens, literals, checksum_mismatch: false }
    }

    pub fn with_capacity(tokens: usize, literals: usize) -> Self {
        Self::new(Vec::with_capacity(tokens), Vec::with_capacity(literals))
    }

    /// A block holding only the end-of-stream marker
    pub fn end_of_stream() -> Self {
        Self::new(vec![Token::END], Vec::new())
    }

    /// A block that emits `bytes` verbatim
    pub fn literal_run(bytes: Vec<u8>) -> Self {
        if bytes.is_empty() {
            return Self::default();
        }
        let len = bytes.len() as u32;
        Self::new(vec![Token::literals(len)], bytes)
    }

    /// Append literal bytes to the pending run of the next token
    #[inline]
    pub fn push_literal(&mut self, byte: u8) {
        self.literals.push(byte);
    }

    /// Whether this block carries the end-of-stream marker
    pub fn has_end(&self) -> bool {
        self.tokens.last().is_some_and(Token::is_end)
    }

    /// Total uncompressed size of this block
    pub fn uncompressed_size(&self) -> usize {
        self.tokens.iter().map(Token::uncompressed_size).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Accumulates literal bytes between matches and turns them into tokens.
///
/// Parsers that see literals one at a time (DEFLATE) push bytes and close the
/// run when a match or the end of block arrives.
#[derive(Debug, Default)]
pub struct TokenBuilder {
    block: TokenBlock,
    pending_literals: u32,
}

impl TokenBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn literal(&mut self, byte: u8) {
        self.block.push_literal(byte);
        self.pending_literals += 1;
    }

    pub fn literal_slice(&mut self, bytes: &[u8]) {
        self.block.literals.extend_from_slice(bytes);
        self.pending_literals += bytes.len() as u32;
    }

    /// Close the pending literal run with a match
    #[inline]
    pub fn copy(&mut self, length: u32, offset: u32) {
        self.block.tokens.push(Token::new(self.pending_literals, length, offset));
        self.pending_literals = 0;
    }

    /// Close any pending literal run without a match
    pub fn flush_literals(&mut self) {
        if self.pending_literals > 0 {
            self.block.tokens.push(Token::literals(self.pending_literals));
            self.pending_literals = 0;
        }
    }

    /// Number of tokens plus literal bytes held, for batching decisions
    pub fn weight(&self) -> usize {
        self.block.tokens.len() + self.block.literals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.block.tokens.is_empty() && self.pending_literals == 0
    }

    /// Take the finished block, leaving the builder empty
    pub fn take(&mut self) -> TokenBlock {
        self.flush_literals();
        std::mem::take(&mut self.block)
    }
}
