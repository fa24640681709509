use crate::bits::BitReader;
use crate::error::{Error, Result};

/// Largest accuracy log any FSE table may use
pub const MAX_ACCURACY_LOG: u8 = 15;
/// Smallest accuracy log a table header can encode
pub const MIN_ACCURACY_LOG: u8 = 5;

/// One decoding state: the symbol it emits and how to reach the next state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FseEntry {
    pub symbol: u8,
    pub num_bits: u8,
    pub baseline: u16,
}

/// FSE decoding table of `2^accuracy_log` states
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FseTable {
    entries: Vec<FseEntry>,
    accuracy_log: u8,
}

impl FseTable {
    /// Build from a normalized distribution.
    ///
    /// A count of `-1` marks a "less than one" symbol: it takes a single slot
    /// at the high end of the table and reloads the full state width. All
    /// other symbols are spread through the remaining slots with step
    /// `(size >> 1) + (size >> 3) + 3`.
    pub fn build(counts: &[i16], accuracy_log: u8) -> Result<Self> {
        if accuracy_log > MAX_ACCURACY_LOG {
            return Err(Error::AccuracyLogTooLarge { log: accuracy_log, max: MAX_ACCURACY_LOG });
        }
        if counts.len() > 256 {
            return Err(Error::CorruptDistribution("too many symbols"));
        }

        let table_size = 1usize << accuracy_log;
        let total: i64 = counts.iter().map(|&c| if c == -1 { 1 } else { c as i64 }).sum();
        if total != table_size as i64 || counts.iter().any(|&c| c < -1) {
            return Err(Error::CorruptDistribution("counts do not fill the table"));
        }

        let mut symbols = vec![0u8; table_size];
        let mut next_state = vec![0u32; counts.len()];
        let mut high_threshold = table_size;

        for (symbol, &count) in counts.iter().enumerate() {
            if count == -1 {
                high_threshold -= 1;
                symbols[high_threshold] = symbol as u8;
                next_state[symbol] = 1;
            } else {
                next_state[symbol] = count as u32;
            }
        }

        let mask = table_size - 1;
        let step = (table_size >> 1) + (table_size >> 3) + 3;
        let mut position = 0usize;
        for (symbol, &count) in counts.iter().enumerate() {
            for _ in 0..count.max(0) {
                symbols[position] = symbol as u8;
                loop {
                    position = (position + step) & mask;
                    if position < high_threshold {
                        break;
                    }
                }
            }
        }
        if position != 0 {
            return Err(Error::CorruptDistribution("spread did not cover the table"));
        }

        let entries = symbols
            .iter()
            .map(|&symbol| {
                let state = next_state[symbol as usize];
                next_state[symbol as usize] += 1;
                let high_bit = 31 - state.leading_zeros();
                let num_bits = accuracy_log - high_bit as u8;
                let baseline = ((state << num_bits) - table_size as u32) as u16;
                FseEntry { symbol, num_bits, baseline }
            })
            .collect();

        Ok(Self { entries, accuracy_log })
    }

    /// A table that always yields `symbol` and reads no bits
    pub fn rle(symbol: u8) -> Self {
        Self { entries: vec![FseEntry { symbol, num_bits: 0, baseline: 0 }], accuracy_log: 0 }
    }

    /// Read a table description from the start of `data`.
    ///
    /// Returns the table and the number of bytes its header used.
    pub fn read(data: &[u8], max_symbol: u8, max_log: u8) -> Result<(Self, usize)> {
        let (counts, accuracy_log, used) = read_normalized_counts(data, max_symbol, max_log)?;
        Ok((Self::build(&counts, accuracy_log)?, used))
    }

    #[inline]
    pub fn entry(&self, state: usize) -> FseEntry {
        self.entries[state]
    }

    pub fn accuracy_log(&self) -> u8 {
        self.accuracy_log
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of states emitting `symbol`
    pub fn occurrences(&self, symbol: u8) -> usize {
        self.entries.iter().filter(|e| e.symbol == symbol).count()
    }
}

/// Read a normalized distribution header.
///
/// Layout: 4 bits of `accuracy_log - 5`, then per-symbol variable-width
/// values holding `count + 1`. A zero count is followed by 2-bit repeat flags
/// for further zero-count symbols, continuing while a flag reads 3.
///
/// Returns the counts, the accuracy log, and the bytes consumed.
pub fn read_normalized_counts(
    data: &[u8],
    max_symbol: u8,
    max_log: u8,
) -> Result<(Vec<i16>, u8, usize)> {
    let mut bits = BitReader::new(data);

    let accuracy_log = bits.read_bits(4)? as u8 + MIN_ACCURACY_LOG;
    if accuracy_log > max_log {
        return Err(Error::AccuracyLogTooLarge { log: accuracy_log, max: max_log });
    }

    let table_size = 1i32 << accuracy_log;
    let mut remaining = table_size + 1;
    let mut threshold = table_size;
    let mut nb_bits = accuracy_log + 1;
    let mut counts: Vec<i16> = Vec::with_capacity(max_symbol as usize + 1);

    while remaining > 1 {
        if counts.len() > max_symbol as usize {
            return Err(Error::CorruptDistribution("too many symbols"));
        }

        let max = (2 * threshold - 1) - remaining;
        let (peeked, available) = bits.peek_bits_padded(nb_bits)?;
        let low = peeked as i32 & (threshold - 1);
        let value = if low < max {
            take(&mut bits, nb_bits - 1, available)?;
            low
        } else {
            take(&mut bits, nb_bits, available)?;
            let full = peeked as i32 & (2 * threshold - 1);
            if full >= threshold {
                full - max
            } else {
                full
            }
        };

        let count = value - 1;
        remaining -= count.abs();
        counts.push(count as i16);

        if count == 0 {
            loop {
                let repeat = bits.read_bits(2)?;
                counts.extend(std::iter::repeat(0).take(repeat as usize));
                if repeat != 3 {
                    break;
                }
            }
        }

        while remaining < threshold && nb_bits > 1 {
            nb_bits -= 1;
            threshold >>= 1;
        }
    }

    if remaining != 1 || counts.len() > max_symbol as usize + 1 {
        return Err(Error::CorruptDistribution("probabilities do not sum to table size"));
    }

    Ok((counts, accuracy_log, bits.bytes_consumed() as usize))
}

#[inline]
fn take(bits: &mut BitReader<&[u8]>, n: u8, available: u8) -> Result<()> {
    if n > available {
        return Err(Error::UnexpectedEof);
    }
    bits.consume_bits(n);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::writer::BitWriter;

    const LL_DEFAULT: [i16; 36] = [
        4, 3, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 1, 1, 1, 2, 2, 2, 2, 2, 2, 2, 2, 2, 3, 2, 1, 1, 1,
        1, 1, -1, -1, -1, -1,
    ];

    #[test]
    fn test_table_complete() {
        let table = FseTable::build(&LL_DEFAULT, 6).unwrap();
        assert_eq!(table.len(), 64);
        for (symbol, &count) in LL_DEFAULT.iter().enumerate() {
            let expected = if count == -1 { 1 } else { count as usize };
            assert_eq!(table.occurrences(symbol as u8), expected, "symbol {}", symbol);
        }
    }

    #[test]
    fn test_less_than_one_symbols_at_top() {
        let table = FseTable::build(&LL_DEFAULT, 6).unwrap();
        // Symbols 32..35 fill slots 63 down to 60 and reload all 6 bits
        for (slot, symbol) in (60..64).rev().zip(32u8..36) {
            let entry = table.entry(slot);
            assert_eq!(entry.symbol, symbol);
            assert_eq!(entry.num_bits, 6);
            assert_eq!(entry.baseline, 0);
        }
    }

    #[test]
    fn test_known_entries() {
        // First states of the predefined literal-length table
        let table = FseTable::build(&LL_DEFAULT, 6).unwrap();
        assert_eq!(table.entry(0), FseEntry { symbol: 0, num_bits: 4, baseline: 0 });
        assert_eq!(table.entry(1), FseEntry { symbol: 0, num_bits: 4, baseline: 16 });
        assert_eq!(table.entry(2), FseEntry { symbol: 1, num_bits: 5, baseline: 32 });
    }

    #[test]
    fn test_bad_distribution() {
        assert!(matches!(FseTable::build(&[1, 1, 1], 2), Err(Error::CorruptDistribution(_))));
        assert!(matches!(FseTable::build(&[1], 16), Err(Error::AccuracyLogTooLarge { .. })));
    }

    #[test]
    fn test_read_counts() {
        // Accuracy log 5, counts [16, 16]
        let mut writer = BitWriter::new();
        writer.write_bits(0, 4);
        // Short form: value 17 in 5 bits
        writer.write_bits(17, 5);
        // Threshold 16, max 14: long form 31 decodes to 31 - 14 = 17
        writer.write_bits(31, 5);
        let data = writer.finish();

        let (counts, log, used) = read_normalized_counts(&data, 255, 9).unwrap();
        assert_eq!(log, 5);
        assert_eq!(counts, vec![16, 16]);
        assert_eq!(used, 2);
    }

    #[test]
    fn test_read_counts_zero_repeat() {
        // Accuracy log 5, counts [31, 0, 0, 0, 0, 1]
        let mut writer = BitWriter::new();
        writer.write_bits(0, 4);
        // Long form 62 decodes to 62 - 30 = 32
        writer.write_bits(62, 6);
        // Threshold 2: value 1 is a zero count
        writer.write_bits(1, 2);
        // Repeat flags: three more zeros, then stop
        writer.write_bits(3, 2);
        writer.write_bits(0, 2);
        // Long form 3 decodes to 3 - 1 = 2
        writer.write_bits(3, 2);
        let data = writer.finish();

        let (counts, log, _) = read_normalized_counts(&data, 255, 9).unwrap();
        assert_eq!(log, 5);
        assert_eq!(counts, vec![31, 0, 0, 0, 0, 1]);
        FseTable::build(&counts, log).unwrap();
    }

    #[test]
    fn test_accuracy_log_limit() {
        let data = [0x0F, 0xFF, 0xFF];
        assert!(matches!(
            read_normalized_counts(&data, 255, 9),
            Err(Error::AccuracyLogTooLarge { log: 20, max: 9 })
        ));
    }

    #[test]
    fn test_rle_table() {
        let table = FseTable::rle(7);
        assert_eq!(table.accuracy_log(), 0);
        assert_eq!(table.entry(0).symbol, 7);
    }
}
