/// Circular history of recently produced bytes.
///
/// Two rings are kept in step: a small fast ring holding the last
/// `8 x parallel` bytes, which serves short-offset matches, and a large ring
/// sized to the member's window, which serves everything else.
pub struct HistoryBuffer {
    large: Vec<u8>,
    large_mask: usize,
    fast: Vec<u8>,
    fast_mask: usize,
    /// Offsets below this are read from the fast ring
    fast_threshold: usize,
    /// Logical write position across the whole invocation
    produced: u64,
    /// Bytes produced in the current member
    member_produced: u64,
}

impl HistoryBuffer {
    pub fn new(window_size: usize, parallel: usize) -> Self {
        let parallel = parallel.max(1);
        let fast_size = (8 * parallel).next_power_of_two();
        let large_size = window_size.max(fast_size).next_power_of_two();
        Self {
            large: vec![0u8; large_size],
            large_mask: large_size - 1,
            fast: vec![0u8; fast_size],
            fast_mask: fast_size - 1,
            fast_threshold: 4 * parallel,
            produced: 0,
            member_produced: 0,
        }
    }

    /// Begin an independent member: earlier bytes become unreachable
    pub fn start_member(&mut self, window_size: usize) {
        self.ensure_capacity(window_size);
        self.member_produced = 0;
    }

    /// Grow the large ring to hold at least `window_size` bytes.
    ///
    /// Only valid between members, as growing discards ring contents.
    pub fn ensure_capacity(&mut self, window_size: usize) {
        if window_size > self.large.len() {
            let size = window_size.next_power_of_two();
            self.large = vec![0u8; size];
            self.large_mask = size - 1;
        }
    }

    #[inline]
    pub fn push_byte(&mut self, byte: u8) {
        let pos = self.produced as usize;
        self.large[pos & self.large_mask] = byte;
        self.fast[pos & self.fast_mask] = byte;
        self.produced += 1;
        self.member_produced += 1;
    }

    pub fn push_slice(&mut self, bytes: &[u8]) {
        // Only the tail can survive in either ring
        let keep_large = bytes.len().min(self.large.len());
        let skipped = (bytes.len() - keep_large) as u64;
        self.produced += skipped;
        self.member_produced += skipped;
        for &b in &bytes[bytes.len() - keep_large..] {
            self.push_byte(b);
        }
    }

    /// Read `out.len()` bytes starting `offset` bytes behind the write position.
    ///
    /// The read must not reach bytes that are not yet written, so
    /// `out.len() <= offset` is required.
    #[inline]
    pub fn read_word(&self, offset: usize, out: &mut [u8]) {
        debug_assert!(out.len() <= offset && offset as u64 <= self.available());
        let start = self.produced as usize - offset;
        if offset < self.fast_threshold {
            for (i, slot) in out.iter_mut().enumerate() {
                *slot = self.fast[(start + i) & self.fast_mask];
            }
        } else {
            for (i, slot) in out.iter_mut().enumerate() {
                *slot = self.large[(start + i) & self.large_mask];
            }
        }
    }

    /// The single byte `offset` bytes behind the write position
    #[inline]
    pub fn byte_at(&self, offset: usize) -> u8 {
        let pos = self.produced as usize - offset;
        if offset < self.fast_threshold {
            self.fast[pos & self.fast_mask]
        } else {
            self.large[pos & self.large_mask]
        }
    }

    /// Largest offset a match may use right now
    pub fn available(&self) -> u64 {
        self.member_produced.min(self.large.len() as u64)
    }

    pub fn produced(&self) -> u64 {
        self.produced
    }

    pub fn member_produced(&self) -> u64 {
        self.member_produced
    }

    pub fn capacity(&self) -> usize {
        self.large.len()
    }
}
