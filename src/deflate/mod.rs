pub mod parser;
pub mod tables;

pub use parser::{Container, DeflateSource, WINDOW_SIZE};
