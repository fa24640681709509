//! Ways of driving the stages: on the caller's thread, as a threaded
//! pipeline, or as a pool over many independent inputs.

pub mod batch;
pub mod single;
pub mod threaded;

pub use batch::BatchDecompressor;
pub use single::SingleThreadedDecompressor;
pub use threaded::PipelinedDecompressor;

use crate::error::Result;
use crate::history::{EngineStats, MatchEngine};
use crate::source::StreamEvent;
use crate::DecompressConfig;
use std::io::Write;

/// Feed events into a fresh match engine until the end marker.
///
/// `events` yields `Ok(None)` once its producer is exhausted.
pub(crate) fn run_engine<W, F>(output: W, config: &DecompressConfig, mut events: F) -> Result<(W, EngineStats)>
where
    W: Write,
    F: FnMut() -> Result<Option<StreamEvent>>,
{
    let mut engine = MatchEngine::new(output, config);
    while let Some(event) = events()? {
        engine.handle(event)?;
    }
    engine.finish()
}
