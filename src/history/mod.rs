pub mod buffer;
pub mod engine;

pub use buffer::HistoryBuffer;
pub use engine::{EngineStats, MatchEngine};
