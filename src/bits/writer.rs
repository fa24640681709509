/// LSB-first bit writer used by tests to hand-assemble compressed streams.
///
/// `finish` pads a forward stream (DEFLATE). `finish_backward` appends the
/// end marker bit that backward streams (Zstd FSE/Huffman) are read from.
pub struct BitWriter {
    output: Vec<u8>,
    current_byte: u8,
    bits_in_byte: u8,
}

impl BitWriter {
    pub fn new() -> Self {
        Self { output: Vec::new(), current_byte: 0, bits_in_byte: 0 }
    }

    /// Write `n` bits (0-32) from value in LSB-first order
    pub fn write_bits(&mut self, value: u32, n: u8) {
        debug_assert!(n <= 32);
        let mut val = value;
        let mut remaining = n;

        while remaining > 0 {
            let space = 8 - self.bits_in_byte;
            let to_write = remaining.min(space);

            let mask = ((1u64 << to_write) - 1) as u32;
            self.current_byte |= ((val & mask) as u8) << self.bits_in_byte;

            val = ((val as u64) >> to_write) as u32;
            self.bits_in_byte += to_write;
            remaining -= to_write;

            if self.bits_in_byte == 8 {
                self.output.push(self.current_byte);
                self.current_byte = 0;
                self.bits_in_byte = 0;
            }
        }
    }

    /// Write a Huffman code stored MSB-first
    pub fn write_code(&mut self, code: u32, length: u8) {
        let mut reversed = 0u32;
        for i in 0..length {
            reversed |= ((code >> i) & 1) << (length - 1 - i);
        }
        self.write_bits(reversed, length);
    }

    /// Pad to byte boundary with zero bits
    pub fn align_to_byte(&mut self) {
        if self.bits_in_byte > 0 {
            self.output.push(self.current_byte);
            self.current_byte = 0;
            self.bits_in_byte = 0;
        }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.write_bits(b as u32, 8);
        }
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.align_to_byte();
        self.output
    }

    /// Close a backward stream with its end marker bit
    pub fn finish_backward(mut self) -> Vec<u8> {
        self.write_bits(1, 1);
        self.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::{BitReader, ReverseBitReader};

    #[test]
    fn test_write_bits() {
        let mut writer = BitWriter::new();
        writer.write_bits(0b011, 3);
        writer.write_bits(0b11010, 5);
        assert_eq!(writer.finish(), vec![0xD3]);
    }

    #[test]
    fn test_write_code_reversed() {
        let mut writer = BitWriter::new();
        writer.write_code(0b1100, 4);
        let out = writer.finish();
        let mut reader = BitReader::new(out.as_slice());
        assert_eq!(reader.read_bits(4).unwrap(), 0b0011);
    }

    #[test]
    fn test_backward_stream_reads_in_reverse() {
        let mut writer = BitWriter::new();
        writer.write_bits(0b101, 3);
        writer.write_bits(0x3C, 7);
        let out = writer.finish_backward();
        let mut reader = ReverseBitReader::new(&out).unwrap();
        assert_eq!(reader.read_bits(7), 0x3C);
        assert_eq!(reader.read_bits(3), 0b101);
        assert!(reader.is_finished());
    }
}
