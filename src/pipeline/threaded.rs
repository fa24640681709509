//! Pipelined decompressor: each stage on its own thread.
//!
//! Architecture:
//! - Parser thread: container parsing, sends `FrameEvent`s
//! - Decoder thread: entropy decoding and token parsing, sends `StreamEvent`s
//! - Calling thread: match engine and output
//!
//! Stages are joined by bounded queues of `Result`s. An `Err` travels down
//! the pipeline like any other item and ends the run; a stage whose
//! downstream queue has gone away stops producing.

use super::run_engine;
use crate::error::{Error, Result};
use crate::source::{
    open_stages, BlockDecoder, FrameEvent, FrameParser, Stages, StreamEvent, TokenSource,
};
use crate::token::TokenBlock;
use crate::{DecompressConfig, DecompressStats, Decompressor};
use crossbeam::channel::{bounded, Receiver, Sender};
use std::io::{BufReader, BufWriter, Read, Write};

/// Runs the stages concurrently, connected by bounded queues
pub struct PipelinedDecompressor {
    config: DecompressConfig,
}

impl PipelinedDecompressor {
    pub fn new(config: DecompressConfig) -> Self {
        Self { config }
    }
}

impl Decompressor for PipelinedDecompressor {
    fn decompress<R: Read + Send, W: Write>(&mut self, input: R, output: W) -> Result<DecompressStats> {
        let reader = BufReader::with_capacity(self.config.buffer_size, input);
        let writer = BufWriter::with_capacity(self.config.buffer_size, output);
        let depth = self.config.queue_depth.max(1);
        let config = &self.config;

        let stages = open_stages(config.codec, reader, config)?;

        let result = crossbeam::scope(|scope| {
            let (event_tx, event_rx) = bounded::<Result<StreamEvent>>(depth);

            let producer = match stages {
                Stages::Framed { parser, decoder } => {
                    let (frame_tx, frame_rx) = bounded::<Result<FrameEvent>>(depth);
                    let parser_handle = scope.spawn(move |_| parse_stage(parser, frame_tx));
                    scope.spawn(move |_| decode_stage(decoder, frame_rx, event_tx));
                    parser_handle
                }
                Stages::Direct(source) => scope.spawn(move |_| source_stage(source, event_tx)),
            };

            let engine_result = run_engine(writer, config, || receive(&event_rx));
            // Unblock any stage still waiting to send
            drop(event_rx);
            let input_bytes = producer.join().map_err(|_| Error::Internal("Thread panicked".to_string()))?;

            let (mut writer, engine_stats) = engine_result?;
            writer.flush()?;
            Ok::<_, Error>(DecompressStats::from_engine(input_bytes, engine_stats))
        });

        let stats = result.map_err(|_| Error::Internal("Thread panicked".to_string()))??;
        tracing::debug!(?stats, "pipelined decompression finished");
        Ok(stats)
    }
}

/// Next item from an upstream stage; a closed queue means it finished
fn receive<T>(rx: &Receiver<Result<T>>) -> Result<Option<T>> {
    match rx.recv() {
        Ok(item) => item.map(Some),
        Err(_) => Ok(None),
    }
}

/// Container stage. Returns the compressed bytes consumed.
fn parse_stage<P: FrameParser + ?Sized>(mut parser: Box<P>, tx: Sender<Result<FrameEvent>>) -> u64 {
    loop {
        match parser.next_event() {
            Ok(Some(event)) => {
                if tx.send(Ok(event)).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                let _ = tx.send(Err(e));
                break;
            }
        }
    }
    parser.bytes_consumed()
}

/// Block stage: decodes payloads and closes the stream with the end marker
fn decode_stage<D: BlockDecoder + ?Sized>(
    mut decoder: Box<D>,
    rx: Receiver<Result<FrameEvent>>,
    tx: Sender<Result<StreamEvent>>,
) {
    for item in rx {
        let event = item.and_then(|event| match event {
            FrameEvent::MemberStart(info) => {
                decoder.start_member(&info)?;
                Ok(StreamEvent::MemberStart(info))
            }
            FrameEvent::Block(block) => decoder.decode_block(block).map(StreamEvent::Tokens),
            FrameEvent::MemberEnd(trailer) => Ok(StreamEvent::MemberEnd(trailer)),
        });
        let failed = event.is_err();
        if tx.send(event).is_err() || failed {
            return;
        }
    }
    let _ = tx.send(Ok(StreamEvent::Tokens(TokenBlock::end_of_stream())));
}

/// A source that already yields tokens (DEFLATE) runs as one stage
fn source_stage<S: TokenSource + ?Sized>(mut source: Box<S>, tx: Sender<Result<StreamEvent>>) -> u64 {
    loop {
        match source.next_event() {
            Ok(Some(event)) => {
                if tx.send(Ok(event)).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                let _ = tx.send(Err(e));
                break;
            }
        }
    }
    source.bytes_consumed()
}
