pub mod reader;
pub mod reverse;
#[cfg(test)]
pub(crate) mod writer;

pub use reader::BitReader;
pub use reverse::ReverseBitReader;
