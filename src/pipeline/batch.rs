//! Many independent inputs decompressed on a worker pool.
//!
//! Every input is its own invocation with its own history buffer; nothing is
//! shared between jobs. Results come back in input order.

use crate::error::{Error, Result};
use crate::pipeline::SingleThreadedDecompressor;
use crate::{Decompressed, DecompressConfig, Decompressor};
use crossbeam::channel::{bounded, Receiver, Sender};

/// A single input to decompress
struct Job {
    /// Position in the input list, for ordering results
    index: usize,
    data: Vec<u8>,
}

pub struct BatchDecompressor {
    config: DecompressConfig,
}

impl BatchDecompressor {
    pub fn new(config: DecompressConfig) -> Self {
        Self { config }
    }

    fn effective_threads(&self, jobs: usize) -> usize {
        let threads = match self.config.num_threads {
            0 => num_cpus::get().clamp(1, 32),
            n => n.clamp(1, 32),
        };
        threads.min(jobs.max(1))
    }

    /// Decompress every input, returning one result per input in order
    pub fn decompress_all(&self, inputs: Vec<Vec<u8>>) -> Vec<Result<Decompressed>> {
        let total = inputs.len();
        let num_threads = self.effective_threads(total);
        tracing::debug!(inputs = total, threads = num_threads, "batch decompression");

        let mut results: Vec<Option<Result<Decompressed>>> = (0..total).map(|_| None).collect();

        let outcome = crossbeam::scope(|scope| {
            let (job_tx, job_rx): (Sender<Job>, Receiver<Job>) = bounded(num_threads * 2);
            let (result_tx, result_rx) = bounded::<(usize, Result<Decompressed>)>(num_threads * 2);

            for _ in 0..num_threads {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                let config = self.config.clone();
                scope.spawn(move |_| worker_thread(job_rx, result_tx, config));
            }
            drop(job_rx);
            drop(result_tx);

            // Feed jobs from a separate thread so results can drain meanwhile
            scope.spawn(move |_| {
                for (index, data) in inputs.into_iter().enumerate() {
                    if job_tx.send(Job { index, data }).is_err() {
                        break;
                    }
                }
            });

            for (index, result) in result_rx {
                results[index] = Some(result);
            }
        });

        if outcome.is_err() {
            tracing::error!("batch worker panicked");
        }
        results
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| Err(Error::Internal("Thread panicked".to_string()))))
            .collect()
    }
}

fn worker_thread(
    job_rx: Receiver<Job>,
    result_tx: Sender<(usize, Result<Decompressed>)>,
    config: DecompressConfig,
) {
    for job in job_rx {
        let mut data = Vec::with_capacity(job.data.len().saturating_mul(3));
        let result = SingleThreadedDecompressor::new(config.clone())
            .decompress(&job.data[..], &mut data)
            .map(|stats| Decompressed { data, stats });
        if result_tx.send((job.index, result)).is_err() {
            break;
        }
    }
}
