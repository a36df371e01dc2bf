//! Record Writer
//!
//! Accumulates records into a chunk encoder and hands finished chunks to
//! the framing layer. The file signature chunk (and optional metadata
//! chunk) are written on construction; chunks roll when their estimated
//! decoded size reaches `desired_chunk_size`.
//!
//! ## Parallel mode
//!
//! With `parallelism >= 1`, record batches are dispatched round-robin to
//! encoder worker threads over bounded queues, and a sequencer thread owns
//! the `ChunkWriter`, committing encoded chunks strictly in submission
//! order. Backpressure comes from the bounded queues: `write_record`
//! blocks while the pipeline is full. The first failure anywhere latches
//! the shared status and poisons the pipeline; `close` drains and
//! discards outstanding work.

use std::sync::Arc;
use std::thread::JoinHandle;

use bytes::Bytes;
use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{debug, warn};

use chunkstream_core::{Chain, Error, ObjectStatus, RecordPosition, Result};

use crate::chunk::{Chunk, ChunkEncoder};
use crate::config::RecordWriterOptions;
use crate::framing::ChunkWriter;
use crate::io::{ChainWriter, FlushPolicy, Writer};

/// Chunk jobs queued per worker; bounds memory in flight.
const JOBS_PER_WORKER: usize = 1;

pub struct RecordWriter<W: Writer + Send + 'static> {
    options: RecordWriterOptions,
    mode: Mode<W>,
    last_pos: Option<RecordPosition>,
}

enum Mode<W: Writer + Send + 'static> {
    Serial {
        chunk_writer: ChunkWriter<W>,
        encoder: ChunkEncoder,
        /// Where the open chunk will begin.
        chunk_begin: u64,
    },
    Parallel(Pipeline<W>),
    /// A failure latched the writer; the message replays on every call.
    Failed(String),
}

impl<W: Writer + Send + 'static> RecordWriter<W> {
    /// Creates the writer and emits the signature (and metadata) chunks.
    pub fn new(dest: W, options: RecordWriterOptions) -> Result<Self> {
        let mut chunk_writer = ChunkWriter::new(dest);
        chunk_writer.write_chunk(&Chunk::file_signature())?;
        if let Some(metadata) = options.metadata.clone() {
            chunk_writer.write_chunk(&Chunk::file_metadata(metadata))?;
        }

        let mode = if options.parallelism == 0 {
            let chunk_begin = chunk_writer.pos();
            Mode::Serial {
                chunk_writer,
                encoder: ChunkEncoder::new(&options),
                chunk_begin,
            }
        } else {
            Mode::Parallel(Pipeline::start(chunk_writer, &options))
        };

        Ok(Self {
            options,
            mode,
            last_pos: None,
        })
    }

    /// Appends one record.
    pub fn write_record(&mut self, record: &[u8]) -> Result<()> {
        match &mut self.mode {
            Mode::Serial {
                encoder,
                chunk_begin,
                ..
            } => {
                let position = RecordPosition::new(*chunk_begin, encoder.num_records());
                encoder.add_record(record)?;
                self.last_pos = Some(position);
            }
            Mode::Parallel(pipeline) => {
                pipeline.status.check()?;
                let chunk_size = self.options.effective_chunk_size();
                return pipeline.add_record(record, chunk_size);
            }
            Mode::Failed(message) => return Err(Error::Failed(message.clone())),
        }
        if self.chunk_is_full() {
            self.roll_chunk()?;
        }
        Ok(())
    }

    fn chunk_is_full(&self) -> bool {
        match &self.mode {
            Mode::Serial { encoder, .. } => {
                encoder.estimated_size() >= self.options.effective_chunk_size()
            }
            _ => false,
        }
    }

    /// Encodes and writes the open chunk (serial mode only).
    fn roll_chunk(&mut self) -> Result<()> {
        if !matches!(self.mode, Mode::Serial { .. }) {
            return Ok(());
        }
        let Mode::Serial {
            mut chunk_writer,
            encoder,
            ..
        } = std::mem::replace(&mut self.mode, Mode::Failed("rolling chunk".to_string()))
        else {
            unreachable!();
        };

        if !encoder.is_empty() {
            let num_records = encoder.num_records();
            let chunk = match encoder.encode_and_close() {
                Ok(chunk) => chunk,
                Err(err) => return Err(self.latch(err)),
            };
            if let Err(err) = chunk_writer.write_chunk(&chunk) {
                return Err(self.latch(err));
            }
            debug!(
                num_records,
                encoded_size = chunk.header.data_size,
                "rolled chunk"
            );
            let chunk_begin = chunk_writer.pos();
            self.mode = Mode::Serial {
                chunk_writer,
                encoder: ChunkEncoder::new(&self.options),
                chunk_begin,
            };
        } else {
            let chunk_begin = chunk_writer.pos();
            self.mode = Mode::Serial {
                chunk_writer,
                encoder,
                chunk_begin,
            };
        }
        Ok(())
    }

    fn latch(&mut self, err: Error) -> Error {
        self.mode = Mode::Failed(err.to_string());
        err
    }

    /// Finishes the open chunk and flushes the destination as deeply as
    /// the policy asks. With `pad_to_block_boundary` set, the next chunk
    /// will start at a 64 KiB boundary.
    pub fn flush(&mut self, policy: FlushPolicy) -> Result<()> {
        if matches!(self.mode, Mode::Serial { .. }) {
            self.roll_chunk()?;
            let pad = self.options.pad_to_block_boundary;
            let Mode::Serial {
                chunk_writer,
                chunk_begin,
                ..
            } = &mut self.mode
            else {
                unreachable!();
            };
            if pad {
                chunk_writer.pad_to_block_boundary()?;
                *chunk_begin = chunk_writer.pos();
            }
            return chunk_writer.flush(policy);
        }
        match &mut self.mode {
            Mode::Parallel(pipeline) => {
                pipeline.status.check()?;
                pipeline.submit_batch()
            }
            Mode::Failed(message) => Err(Error::Failed(message.clone())),
            Mode::Serial { .. } => unreachable!(),
        }
    }

    /// Position the next record will get. Exact in serial mode; in
    /// parallel mode chunk offsets are unknown until encoding finishes.
    pub fn pos(&self) -> Option<RecordPosition> {
        match &self.mode {
            Mode::Serial {
                encoder,
                chunk_begin,
                ..
            } => Some(RecordPosition::new(*chunk_begin, encoder.num_records())),
            _ => None,
        }
    }

    /// Position of the last written record (serial mode).
    pub fn last_pos(&self) -> Option<RecordPosition> {
        self.last_pos
    }

    /// Finishes all chunks and closes the destination, returning it.
    pub fn close(mut self) -> Result<W> {
        if matches!(self.mode, Mode::Serial { .. }) {
            self.roll_chunk()?;
        }
        match std::mem::replace(&mut self.mode, Mode::Failed("closed".to_string())) {
            Mode::Serial {
                mut chunk_writer, ..
            } => {
                if self.options.pad_to_block_boundary {
                    chunk_writer.pad_to_block_boundary()?;
                }
                chunk_writer.close()
            }
            Mode::Parallel(pipeline) => {
                let mut chunk_writer = pipeline.finish()?;
                if self.options.pad_to_block_boundary {
                    chunk_writer.pad_to_block_boundary()?;
                }
                chunk_writer.close()
            }
            Mode::Failed(message) => Err(Error::Failed(message)),
        }
    }
}

impl RecordWriter<ChainWriter> {
    /// Closes and returns the file bytes, for in-memory destinations.
    pub fn into_chain(self) -> Result<Chain> {
        Ok(self.close()?.into_chain())
    }
}

// ---------------------------------------------------------------------
// Parallel pipeline
// ---------------------------------------------------------------------

struct Job {
    records: Vec<Bytes>,
}

struct Pipeline<W: Writer + Send + 'static> {
    job_txs: Vec<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    sequencer: Option<JoinHandle<ChunkWriter<W>>>,
    status: Arc<ObjectStatus>,
    next_worker: usize,
    batch: Vec<Bytes>,
    batch_size: u64,
}

impl<W: Writer + Send + 'static> Pipeline<W> {
    fn start(chunk_writer: ChunkWriter<W>, options: &RecordWriterOptions) -> Self {
        let parallelism = options.parallelism;
        let status = Arc::new(ObjectStatus::new());

        let mut job_txs = Vec::with_capacity(parallelism);
        let mut workers = Vec::with_capacity(parallelism);
        let mut out_rxs = Vec::with_capacity(parallelism);

        for index in 0..parallelism {
            let (job_tx, job_rx): (Sender<Job>, Receiver<Job>) = bounded(JOBS_PER_WORKER);
            let (out_tx, out_rx): (Sender<Option<Chunk>>, Receiver<Option<Chunk>>) = bounded(1);
            let worker_options = options.clone();
            let worker_status = Arc::clone(&status);
            let handle = std::thread::spawn(move || {
                debug!(worker = index, "encoder worker started");
                for job in job_rx {
                    let output = match encode_job(&job, &worker_options) {
                        Ok(chunk) => Some(chunk),
                        Err(err) => {
                            worker_status.fail(format!("encoding chunk: {err}"));
                            None
                        }
                    };
                    if out_tx.send(output).is_err() {
                        break;
                    }
                }
                debug!(worker = index, "encoder worker stopped");
            });
            job_txs.push(job_tx);
            workers.push(handle);
            out_rxs.push(out_rx);
        }

        let sequencer_status = Arc::clone(&status);
        let sequencer = std::thread::spawn(move || {
            let mut chunk_writer = chunk_writer;
            let mut job_index = 0usize;
            // Commit results strictly in submission order: job n was
            // dispatched to worker n % parallelism.
            loop {
                match out_rxs[job_index % out_rxs.len()].recv() {
                    Ok(Some(chunk)) => {
                        if sequencer_status.healthy() {
                            if let Err(err) = chunk_writer.write_chunk(&chunk) {
                                sequencer_status.fail(format!("writing chunk: {err}"));
                            }
                        }
                    }
                    Ok(None) => {
                        // The producing worker already latched the failure.
                    }
                    Err(_) => break,
                }
                job_index += 1;
            }
            chunk_writer
        });

        Self {
            job_txs,
            workers,
            sequencer: Some(sequencer),
            status,
            next_worker: 0,
            batch: Vec::new(),
            batch_size: 0,
        }
    }

    fn add_record(&mut self, record: &[u8], chunk_size: u64) -> Result<()> {
        self.batch.push(Bytes::copy_from_slice(record));
        self.batch_size += record.len() as u64 + 1;
        if self.batch_size >= chunk_size {
            self.submit_batch()?;
        }
        Ok(())
    }

    /// Ships the accumulated batch to the next worker. Blocks while the
    /// pipeline is full.
    fn submit_batch(&mut self) -> Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let job = Job {
            records: std::mem::take(&mut self.batch),
        };
        self.batch_size = 0;
        let worker = self.next_worker % self.job_txs.len();
        self.next_worker += 1;
        if self.job_txs[worker].send(job).is_err() {
            self.status.fail("encoder worker exited early");
            return self.status.check();
        }
        Ok(())
    }

    /// Drains the pipeline and returns the chunk writer.
    fn finish(mut self) -> Result<ChunkWriter<W>> {
        let submit_result = self.submit_batch();
        self.job_txs.clear(); // disconnect; workers exit once their queues drain
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                self.status.fail("encoder worker panicked");
            }
        }
        let chunk_writer = match self.sequencer.take().expect("finish runs once").join() {
            Ok(chunk_writer) => chunk_writer,
            Err(_) => {
                return Err(Error::Failed("chunk sequencer panicked".to_string()));
            }
        };
        submit_result?;
        if let Err(err) = self.status.check() {
            warn!(error = %err, "parallel pipeline failed; outstanding chunks discarded");
            return Err(err);
        }
        Ok(chunk_writer)
    }
}

fn encode_job(job: &Job, options: &RecordWriterOptions) -> Result<Chunk> {
    let mut encoder = ChunkEncoder::new(options);
    for record in &job.records {
        encoder.add_record(record)?;
    }
    encoder.encode_and_close()
}
