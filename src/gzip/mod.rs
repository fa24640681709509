pub mod header;
pub mod zlib;

pub use header::{GzipHeader, GzipTrailer};
pub use zlib::ZlibHeader;
