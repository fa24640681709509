use crate::bits::ReverseBitReader;
use crate::error::{Error, Result};
use crate::fse::{FseState, FseTable};

pub const LITERAL_LENGTH_DEFAULT: [i16; 36] = [
    4, 3, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 1, 1, 1, 2, 2, 2, 2, 2, 2, 2, 2, 2, 3, 2, 1, 1, 1, 1, 1,
    -1, -1, -1, -1,
];
pub const MATCH_LENGTH_DEFAULT: [i16; 53] = [
    1, 4, 3, 2, 2, 2, 2, 2, 2, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, -1, -1, -1, -1, -1, -1, -1,
];
pub const OFFSET_DEFAULT: [i16; 29] = [
    1, 1, 1, 1, 1, 1, 2, 2, 2, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, -1, -1, -1, -1, -1,
];

/// (baseline, extra bits) for literal length codes 16-35
const LITERAL_LENGTH_CODES: [(u32, u8); 20] = [
    (16, 1), (18, 1), (20, 1), (22, 1), (24, 2), (28, 2), (32, 3), (40, 3), (48, 4), (64, 6),
    (128, 7), (256, 8), (512, 9), (1024, 10), (2048, 11), (4096, 12), (8192, 13), (16384, 14),
    (32768, 15), (65536, 16),
];

/// (baseline, extra bits) for match length codes 32-52
const MATCH_LENGTH_CODES: [(u32, u8); 21] = [
    (35, 1), (37, 1), (39, 1), (41, 1), (43, 2), (47, 2), (51, 3), (59, 3), (67, 4), (83, 4),
    (99, 5), (131, 7), (259, 8), (515, 9), (1027, 10), (2051, 11), (4099, 12), (8195, 13),
    (16387, 14), (32771, 15), (65539, 16),
];

const MAX_LITERAL_LENGTH_CODE: u8 = 35;
const MAX_MATCH_LENGTH_CODE: u8 = 52;
const MAX_OFFSET_CODE: u8 = 31;

/// Which of the three code streams a table serves
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stream {
    LiteralLength,
    Offset,
    MatchLength,
}

impl Stream {
    fn max_symbol(self) -> u8 {
        match self {
            Stream::LiteralLength => MAX_LITERAL_LENGTH_CODE,
            Stream::Offset => MAX_OFFSET_CODE,
            Stream::MatchLength => MAX_MATCH_LENGTH_CODE,
        }
    }

    fn max_log(self) -> u8 {
        match self {
            Stream::Offset => 8,
            _ => 9,
        }
    }

    fn predefined(self) -> Result<FseTable> {
        match self {
            Stream::LiteralLength => FseTable::build(&LITERAL_LENGTH_DEFAULT, 6),
            Stream::Offset => FseTable::build(&OFFSET_DEFAULT, 5),
            Stream::MatchLength => FseTable::build(&MATCH_LENGTH_DEFAULT, 6),
        }
    }
}

/// Compression_Modes for one stream
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Predefined,
    Rle,
    FseCompressed,
    Repeat,
}

impl Mode {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Mode::Predefined,
            1 => Mode::Rle,
            2 => Mode::FseCompressed,
            _ => Mode::Repeat,
        }
    }
}

/// Decoded sequence with its offset already resolved
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sequence {
    pub literal_length: u32,
    pub match_length: u32,
    pub offset: u32,
}

/// Tables and repeat offsets that persist across the blocks of a frame
#[derive(Clone, Debug)]
pub struct SequenceState {
    literal_lengths: Option<FseTable>,
    offsets: Option<FseTable>,
    match_lengths: Option<FseTable>,
    pub repeat_offsets: [u32; 3],
}

impl Default for SequenceState {
    fn default() -> Self {
        Self { literal_lengths: None, offsets: None, match_lengths: None, repeat_offsets: [1, 4, 8] }
    }
}

impl SequenceState {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, stream: Stream) -> &mut Option<FseTable> {
        match stream {
            Stream::LiteralLength => &mut self.literal_lengths,
            Stream::Offset => &mut self.offsets,
            Stream::MatchLength => &mut self.match_lengths,
        }
    }

    /// Install the table `mode` selects, returning the bytes it consumed
    fn update_table(&mut self, stream: Stream, mode: Mode, data: &[u8]) -> Result<usize> {
        let (table, used) = match mode {
            Mode::Predefined => (stream.predefined()?, 0),
            Mode::Rle => {
                let symbol = *data.first().ok_or(Error::UnexpectedEof)?;
                if symbol > stream.max_symbol() {
                    return Err(Error::CorruptBlock("RLE sequence code out of range"));
                }
                (FseTable::rle(symbol), 1)
            }
            Mode::FseCompressed => FseTable::read(data, stream.max_symbol(), stream.max_log())?,
            Mode::Repeat => {
                if self.slot(stream).is_none() {
                    return Err(Error::CorruptBlock("repeat mode without a previous table"));
                }
                return Ok(0);
            }
        };
        *self.slot(stream) = Some(table);
        Ok(used)
    }
}

/// Resolve an offset value against the repeat offsets
fn resolve_offset(rep: &mut [u32; 3], offset_value: u32, literal_length: u32) -> Result<u32> {
    if offset_value > 3 {
        let offset = offset_value - 3;
        *rep = [offset, rep[0], rep[1]];
        return Ok(offset);
    }

    // A zero literal length shifts the repeat index by one
    let index = offset_value + u32::from(literal_length == 0);
    let offset = match index {
        1 => rep[0],
        2 => {
            let offset = rep[1];
            *rep = [offset, rep[0], rep[2]];
            offset
        }
        3 => {
            let offset = rep[2];
            *rep = [offset, rep[0], rep[1]];
            offset
        }
        _ => {
            let offset = rep[0].wrapping_sub(1);
            if offset == 0 {
                return Err(Error::ZeroMatchOffset);
            }
            *rep = [offset, rep[0], rep[1]];
            offset
        }
    };
    Ok(offset)
}

fn literal_length_base(code: u8) -> (u32, u8) {
    if code < 16 {
        (code as u32, 0)
    } else {
        LITERAL_LENGTH_CODES[(code - 16) as usize]
    }
}

fn match_length_base(code: u8) -> (u32, u8) {
    if code < 32 {
        (code as u32 + 3, 0)
    } else {
        MATCH_LENGTH_CODES[(code - 32) as usize]
    }
}

/// Read the Number_of_Sequences field, returning the count and bytes used
pub fn read_sequence_count(data: &[u8]) -> Result<(usize, usize)> {
    let b0 = *data.first().ok_or(Error::UnexpectedEof)? as usize;
    let byte = |i: usize| data.get(i).map(|&b| b as usize).ok_or(Error::UnexpectedEof);
    match b0 {
        0..=127 => Ok((b0, 1)),
        128..=254 => Ok((((b0 - 128) << 8) + byte(1)?, 2)),
        _ => Ok((byte(1)? + (byte(2)? << 8) + 0x7F00, 3)),
    }
}

/// Decode a sequences section.
///
/// With zero sequences the section is just its count byte and the tables
/// carried from earlier blocks stay as they were.
pub fn decode_sequences(data: &[u8], state: &mut SequenceState) -> Result<Vec<Sequence>> {
    let (count, mut pos) = read_sequence_count(data)?;
    if count == 0 {
        if pos != data.len() {
            return Err(Error::CorruptBlock("bytes after an empty sequences section"));
        }
        return Ok(Vec::new());
    }

    let modes = *data.get(pos).ok_or(Error::UnexpectedEof)?;
    pos += 1;
    if modes & 0x03 != 0 {
        return Err(Error::ReservedBitSet("sequence compression modes"));
    }
    for (stream, shift) in
        [(Stream::LiteralLength, 6), (Stream::Offset, 4), (Stream::MatchLength, 2)]
    {
        let mode = Mode::from_bits(modes >> shift);
        pos += state.update_table(stream, mode, &data[pos..])?;
        tracing::trace!(?stream, ?mode, "sequence table");
    }

    let (Some(ll_table), Some(of_table), Some(ml_table)) =
        (&state.literal_lengths, &state.offsets, &state.match_lengths)
    else {
        return Err(Error::Internal("sequence tables missing after mode update".into()));
    };

    let mut bits = ReverseBitReader::new(&data[pos..])?;
    let mut ll_state = FseState::new(ll_table, &mut bits);
    let mut of_state = FseState::new(of_table, &mut bits);
    let mut ml_state = FseState::new(ml_table, &mut bits);
    let mut rep = state.repeat_offsets;

    let mut sequences = Vec::with_capacity(count);
    for i in 0..count {
        let of_code = of_state.symbol();
        let ll_code = ll_state.symbol();
        let ml_code = ml_state.symbol();
        if of_code > MAX_OFFSET_CODE {
            return Err(Error::CorruptBlock("offset code out of range"));
        }

        let offset_value = (1u32 << of_code) + bits.read_bits(of_code);
        let (ml_base, ml_bits) = match_length_base(ml_code);
        let match_length = ml_base + bits.read_bits(ml_bits);
        let (ll_base, ll_bits) = literal_length_base(ll_code);
        let literal_length = ll_base + bits.read_bits(ll_bits);

        let offset = resolve_offset(&mut rep, offset_value, literal_length)?;
        sequences.push(Sequence { literal_length, match_length, offset });

        if i + 1 < count {
            ll_state.update(&mut bits);
            ml_state.update(&mut bits);
            of_state.update(&mut bits);
        }
    }

    if !bits.is_finished() {
        return Err(Error::CorruptBlock("sequence bitstream not fully consumed"));
    }
    state.repeat_offsets = rep;
    Ok(sequences)
}
