//! Background writer for candidate pairs with group commit.
//!
//! Producers submit pair batches over a bounded channel. A single blocking
//! task owns the output sink, coalesces whatever batches are already queued,
//! and writes them as one group.

use recblock_core::config::{MAX_GROUP_WRITE_PAIRS, PAIR_CHANNEL_CAPACITY};
use recblock_core::{BlockingError, CandidatePair, JsonLinesSink, PairSink};
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Handle to the background pair writer.
pub struct PairWriter {
    submit_tx: mpsc::Sender<Vec<CandidatePair>>,
    task: JoinHandle<Result<u64, BlockingError>>,
}

impl PairWriter {
    /// Opens `path` (truncating unless `append`) and spawns the writer task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn create(path: &Path, append: bool) -> Result<Self, BlockingError> {
        let sink = if append {
            JsonLinesSink::append_to(path)?
        } else {
            JsonLinesSink::new(File::create(path)?)
        };
        tracing::debug!("Writing candidate pairs to {:?} (append={})", path, append);
        Ok(Self::spawn(sink))
    }

    /// Spawns the writer task around an existing sink.
    pub fn spawn<W: Write + Send + 'static>(sink: JsonLinesSink<W>) -> Self {
        let (submit_tx, submit_rx) = mpsc::channel(PAIR_CHANNEL_CAPACITY);
        let task = tokio::task::spawn_blocking(move || writer_loop(submit_rx, sink));
        Self { submit_tx, task }
    }

    /// A sender for producers; blocking producers use `blocking_send`.
    pub fn sender(&self) -> mpsc::Sender<Vec<CandidatePair>> {
        self.submit_tx.clone()
    }

    /// Closes the channel, waits for queued batches to be written, and returns
    /// the number of pairs written.
    pub async fn finish(self) -> Result<u64, BlockingError> {
        drop(self.submit_tx);
        self.task
            .await
            .map_err(|e| BlockingError::Io(io::Error::other(e.to_string())))?
    }
}

/// Error reported to producers once the writer task has exited.
pub fn writer_stopped() -> BlockingError {
    BlockingError::Io(io::Error::new(
        io::ErrorKind::BrokenPipe,
        "pair writer stopped",
    ))
}

fn writer_loop<W: Write>(
    mut rx: mpsc::Receiver<Vec<CandidatePair>>,
    sink: JsonLinesSink<W>,
) -> Result<u64, BlockingError> {
    let mut groups = 0u64;
    while let Some(mut group) = rx.blocking_recv() {
        while group.len() < MAX_GROUP_WRITE_PAIRS {
            match rx.try_recv() {
                Ok(more) => group.extend(more),
                Err(_) => break,
            }
        }
        if let Err(e) = sink.write_batch(&group) {
            tracing::error!("Pair writer failed after {} pairs: {}", sink.written(), e);
            return Err(e);
        }
        groups += 1;
    }
    sink.flush()?;
    tracing::debug!(
        "Pair writer closed: {} pairs in {} writes",
        sink.written(),
        groups
    );
    Ok(sink.written())
}
