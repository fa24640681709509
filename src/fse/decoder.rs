use super::table::FseTable;
use crate::bits::ReverseBitReader;

/// Decoding state walking an FSE table over a backward bitstream
pub struct FseState<'t> {
    table: &'t FseTable,
    state: usize,
}

impl<'t> FseState<'t> {
    /// Seed the state from the next `accuracy_log` bits
    pub fn new(table: &'t FseTable, bits: &mut ReverseBitReader<'_>) -> Self {
        let state = bits.read_bits(table.accuracy_log()) as usize;
        Self { table, state }
    }

    /// Symbol of the current state
    #[inline]
    pub fn symbol(&self) -> u8 {
        self.table.entry(self.state).symbol
    }

    /// Advance to the next state
    #[inline]
    pub fn update(&mut self, bits: &mut ReverseBitReader<'_>) {
        let entry = self.table.entry(self.state);
        self.state = entry.baseline as usize + bits.read_bits(entry.num_bits) as usize;
    }

    /// Emit the current symbol, then advance
    #[inline]
    pub fn decode(&mut self, bits: &mut ReverseBitReader<'_>) -> u8 {
        let symbol = self.symbol();
        self.update(bits);
        symbol
    }

    pub fn state(&self) -> usize {
        self.state
    }
}
