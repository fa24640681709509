//! Integrity checks carried by the supported containers.
//!
//! CRC-32 and xxHash come from `crc32fast` and `xxhash-rust`. Adler-32 (zlib)
//! and CRC-32C (Snappy framing) are small enough to compute here.

use xxhash_rust::xxh32::Xxh32;
use xxhash_rust::xxh64::Xxh64;

/// Checksum algorithm a member's trailer is verified with
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChecksumKind {
    /// gzip trailer
    Crc32,
    /// zlib trailer
    Adler32,
    /// Snappy chunk checksum, stored masked
    MaskedCrc32c,
    /// LZ4 content checksum
    Xxh32,
    /// Zstd content checksum, low 32 bits
    Xxh64,
}

/// Running digest over a member's uncompressed output
pub enum Digest {
    Crc32(crc32fast::Hasher),
    Adler32(Adler32),
    Crc32c(u32),
    Xxh32(Xxh32),
    Xxh64(Box<Xxh64>),
}

impl Digest {
    pub fn new(kind: ChecksumKind) -> Self {
        match kind {
            ChecksumKind::Crc32 => Digest::Crc32(crc32fast::Hasher::new()),
            ChecksumKind::Adler32 => Digest::Adler32(Adler32::new()),
            ChecksumKind::MaskedCrc32c => Digest::Crc32c(0),
            ChecksumKind::Xxh32 => Digest::Xxh32(Xxh32::new(0)),
            ChecksumKind::Xxh64 => Digest::Xxh64(Box::new(Xxh64::new(0))),
        }
    }

    #[inline]
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Digest::Crc32(h) => h.update(data),
            Digest::Adler32(h) => h.update(data),
            Digest::Crc32c(crc) => *crc = crc32c_update(*crc, data),
            Digest::Xxh32(h) => h.update(data),
            Digest::Xxh64(h) => h.update(data),
        }
    }

    /// Final value in the form the container stores it
    pub fn finish(self) -> u32 {
        match self {
            Digest::Crc32(h) => h.finalize(),
            Digest::Adler32(h) => h.finish(),
            Digest::Crc32c(crc) => mask_crc32c(crc),
            Digest::Xxh32(h) => h.digest(),
            Digest::Xxh64(h) => h.digest() as u32,
        }
    }
}

const ADLER_MOD: u32 = 65521;
/// Largest run of bytes before the sums must be reduced to avoid overflow
const ADLER_NMAX: usize = 5552;

/// Adler-32 (RFC 1950)
#[derive(Clone, Copy, Debug)]
pub struct Adler32 {
    a: u32,
    b: u32,
}

impl Adler32 {
    pub fn new() -> Self {
        Self { a: 1, b: 0 }
    }

    pub fn update(&mut self, data: &[u8]) {
        for chunk in data.chunks(ADLER_NMAX) {
            for &byte in chunk {
                self.a += byte as u32;
                self.b += self.a;
            }
            self.a %= ADLER_MOD;
            self.b %= ADLER_MOD;
        }
    }

    pub fn finish(&self) -> u32 {
        (self.b << 16) | self.a
    }
}

impl Default for Adler32 {
    fn default() -> Self {
        Self::new()
    }
}

pub fn adler32(data: &[u8]) -> u32 {
    let mut h = Adler32::new();
    h.update(data);
    h.finish()
}

/// Reflected Castagnoli polynomial
const CRC32C_POLY: u32 = 0x82F6_3B78;

const CRC32C_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut k = 0;
        while k < 8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ CRC32C_POLY } else { crc >> 1 };
            k += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

/// Continue a CRC-32C over `data`
pub fn crc32c_update(crc: u32, data: &[u8]) -> u32 {
    let mut crc = !crc;
    for &byte in data {
        crc = CRC32C_TABLE[((crc ^ byte as u32) & 0xFF) as usize] ^ (crc >> 8);
    }
    !crc
}

pub fn crc32c(data: &[u8]) -> u32 {
    crc32c_update(0, data)
}

/// Snappy framing stores CRCs rotated and offset
pub fn mask_crc32c(crc: u32) -> u32 {
    crc.rotate_right(15).wrapping_add(0xa282_ead8)
}
