use crate::error::{Error, Result};
use std::io::{self, Read};

/// Gzip header flags (RFC 1952)
const FHCRC: u8 = 1 << 1;
const FEXTRA: u8 = 1 << 2;
const FNAME: u8 = 1 << 3;
const FCOMMENT: u8 = 1 << 4;
const FRESERVED: u8 = 0xE0;

/// Parsed gzip header (RFC 1952)
#[derive(Debug, Clone)]
pub struct GzipHeader {
    pub flags: u8,
    pub mtime: u32,
    pub os: u8,
    pub extra: Option<Vec<u8>>,
    pub filename: Option<String>,
    pub comment: Option<String>,
    pub header_crc: Option<u16>,
}

/// Passes bytes through while hashing them for FHCRC
struct HashingReader<'a, R> {
    inner: &'a mut R,
    hasher: crc32fast::Hasher,
}

impl<R: Read> Read for HashingReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}

fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => Error::UnexpectedEof,
        _ => Error::Io(e),
    })
}

impl GzipHeader {
    /// Parse a gzip header from a reader, verifying FHCRC when present
    pub fn parse<R: Read>(reader: &mut R) -> Result<Self> {
        let mut reader = HashingReader { inner: reader, hasher: crc32fast::Hasher::new() };

        let mut buf = [0u8; 10];
        read_exact(&mut reader, &mut buf)?;

        // Check magic bytes
        let magic = u16::from_le_bytes([buf[0], buf[1]]);
        if magic != 0x8b1f {
            return Err(Error::InvalidGzipMagic(magic));
        }

        // Compression method (must be 8 for DEFLATE)
        if buf[2] != 8 {
            return Err(Error::UnsupportedCompressionMethod(buf[2]));
        }

        let flags = buf[3];
        if flags & FRESERVED != 0 {
            return Err(Error::ReservedBitSet("gzip flags"));
        }
        let mtime = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let os = buf[9];

        // Parse optional fields based on flags
        let extra = if flags & FEXTRA != 0 {
            let mut xlen_buf = [0u8; 2];
            read_exact(&mut reader, &mut xlen_buf)?;
            let mut extra_data = vec![0u8; u16::from_le_bytes(xlen_buf) as usize];
            read_exact(&mut reader, &mut extra_data)?;
            Some(extra_data)
        } else {
            None
        };

        let filename =
            if flags & FNAME != 0 { Some(read_null_terminated_string(&mut reader)?) } else { None };

        let comment =
            if flags & FCOMMENT != 0 { Some(read_null_terminated_string(&mut reader)?) } else { None };

        let header_crc = if flags & FHCRC != 0 {
            let expected = reader.hasher.clone().finalize() as u16;
            let mut crc_buf = [0u8; 2];
            read_exact(&mut *reader.inner, &mut crc_buf)?;
            let found = u16::from_le_bytes(crc_buf);
            if found != expected {
                return Err(Error::GzipHeaderCrcMismatch { expected, found });
            }
            Some(found)
        } else {
            None
        };

        Ok(GzipHeader { flags, mtime, os, extra, filename, comment, header_crc })
    }
}

/// Gzip trailer (8 bytes at end of each member)
#[derive(Debug, Clone)]
pub struct GzipTrailer {
    pub crc32: u32,
    pub isize: u32,
}

impl GzipTrailer {
    /// Parse a gzip trailer from a reader
    pub fn parse<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; 8];
        read_exact(reader, &mut buf)?;

        let crc32 = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let isize = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);

        Ok(GzipTrailer { crc32, isize })
    }
}

/// Read a null-terminated string from a reader
fn read_null_terminated_string<R: Read>(reader: &mut R) -> Result<String> {
    let mut bytes = Vec::new();
    let mut byte = [0u8; 1];

    loop {
        read_exact(reader, &mut byte)?;
        if byte[0] == 0 {
            break;
        }
        bytes.push(byte[0]);
    }

    // Gzip uses ISO-8859-1 (Latin-1), but we'll try UTF-8 first
    Ok(String::from_utf8(bytes).unwrap_or_else(|e| e.into_bytes().iter().map(|&b| b as char).collect()))
}
