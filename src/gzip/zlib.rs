use crate::error::{Error, Result};
use std::io::Read;

/// Zlib compression method: DEFLATE.
const CM_DEFLATE: u8 = 8;
/// Largest window exponent (32 KiB)
const MAX_CINFO: u8 = 7;
const FDICT: u8 = 1 << 5;

/// Parsed zlib stream header (RFC 1950)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZlibHeader {
    pub window_size: usize,
    pub level: u8,
}

impl ZlibHeader {
    /// Validate the CMF/FLG pair without reading anything
    pub fn check(cmf: u8, flg: u8) -> Result<Self> {
        if (cmf as u16 * 256 + flg as u16) % 31 != 0 {
            return Err(Error::InvalidZlibHeader { cmf, flg });
        }
        if cmf & 0x0F != CM_DEFLATE {
            return Err(Error::UnsupportedCompressionMethod(cmf & 0x0F));
        }
        let cinfo = cmf >> 4;
        if cinfo > MAX_CINFO {
            return Err(Error::InvalidZlibHeader { cmf, flg });
        }
        Ok(Self { window_size: 1 << (cinfo + 8), level: flg >> 6 })
    }

    pub fn parse<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; 2];
        reader.read_exact(&mut buf).map_err(|_| Error::UnexpectedEof)?;
        let header = Self::check(buf[0], buf[1])?;

        if buf[1] & FDICT != 0 {
            let mut dict_id = [0u8; 4];
            reader.read_exact(&mut dict_id).map_err(|_| Error::UnexpectedEof)?;
            return Err(Error::DictionaryUnsupported(u32::from_be_bytes(dict_id)));
        }
        Ok(header)
    }
}

/// Read the big-endian Adler-32 that ends a zlib stream
pub fn read_adler32<R: Read>(reader: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf).map_err(|_| Error::UnexpectedEof)?;
    Ok(u32::from_be_bytes(buf))
}
