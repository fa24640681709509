/// Fixed Huffman literal/length code lengths (RFC 1951 section 3.2.6)
pub fn fixed_literal_lengths() -> [u8; 288] {
    let mut lengths = [0u8; 288];
    lengths[0..=143].fill(8); // 0-143: 8 bits
    lengths[144..=255].fill(9); // 144-255: 9 bits
    lengths[256..=279].fill(7); // 256-279: 7 bits
    lengths[280..=287].fill(8); // 280-287: 8 bits
    lengths
}

/// Fixed Huffman distance code lengths (all 5 bits)
pub fn fixed_distance_lengths() -> [u8; 32] {
    [5u8; 32]
}

/// Assign canonical codes: `(code, length)` per symbol, MSB-first.
///
/// Shorter codes come first; within a length, lower symbols get lower codes.
/// Unused symbols get `(0, 0)`.
pub fn canonical_codes(lengths: &[u8]) -> Vec<(u32, u8)> {
    let mut bl_count = [0u32; 16];
    for &len in lengths {
        if len > 0 {
            bl_count[len as usize] += 1;
        }
    }

    let mut next_code = [0u32; 16];
    let mut code = 0u32;
    for bits in 1..16 {
        code = (code + bl_count[bits - 1]) << 1;
        next_code[bits] = code;
    }

    lengths
        .iter()
        .map(|&len| {
            if len == 0 {
                return (0, 0);
            }
            let code = next_code[len as usize];
            next_code[len as usize] += 1;
            (code, len)
        })
        .collect()
}
