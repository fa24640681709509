pub mod decoder;
pub mod table;

pub use decoder::FseState;
pub use table::{read_normalized_counts, FseEntry, FseTable};
