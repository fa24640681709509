use super::run_engine;
use crate::error::Result;
use crate::source::open_source;
use crate::{DecompressConfig, DecompressStats, Decompressor};
use std::io::{BufReader, BufWriter, Read, Write};

/// Runs every stage on the calling thread, pulling one event at a time
pub struct SingleThreadedDecompressor {
    config: DecompressConfig,
}

impl SingleThreadedDecompressor {
    pub fn new(config: DecompressConfig) -> Self {
        Self { config }
    }
}

impl Decompressor for SingleThreadedDecompressor {
    fn decompress<R: Read + Send, W: Write>(&mut self, input: R, output: W) -> Result<DecompressStats> {
        let reader = BufReader::with_capacity(self.config.buffer_size, input);
        let writer = BufWriter::with_capacity(self.config.buffer_size, output);

        let mut source = open_source(self.config.codec, reader, &self.config)?;
        let (mut writer, engine_stats) = run_engine(writer, &self.config, || source.next_event())?;
        writer.flush()?;

        let stats = DecompressStats::from_engine(source.bytes_consumed(), engine_stats);
        tracing::debug!(?stats, "decompression finished");
        Ok(stats)
    }
}
