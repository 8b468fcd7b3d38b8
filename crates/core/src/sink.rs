//! Output sinks for candidate pairs.
//!
//! A sink takes pairs in batches. Each batch is serialized up front and then
//! written under an exclusive lock, so concurrent producers can share one sink
//! without interleaving partial lines.

use crate::error::BlockingError;
use crate::record::CandidatePair;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

/// Destination for candidate pairs.
pub trait PairSink {
    /// Writes one batch atomically with respect to other batches.
    fn write_batch(&self, pairs: &[CandidatePair]) -> Result<(), BlockingError>;

    /// Flushes buffered output.
    fn flush(&self) -> Result<(), BlockingError>;
}

/// Collects pairs in memory.
impl PairSink for Mutex<Vec<CandidatePair>> {
    fn write_batch(&self, pairs: &[CandidatePair]) -> Result<(), BlockingError> {
        self.lock().extend_from_slice(pairs);
        Ok(())
    }

    fn flush(&self) -> Result<(), BlockingError> {
        Ok(())
    }
}

/// Writes one JSON object per line:
/// `{"first_record_id": "...", "second_record_id": "..."}`.
pub struct JsonLinesSink<W: Write> {
    writer: Mutex<BufWriter<W>>,
    written: AtomicU64,
}

impl JsonLinesSink<File> {
    /// Opens `path` for appending, creating it if needed.
    pub fn append_to(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(file))
    }
}

impl<W: Write> JsonLinesSink<W> {
    /// Wraps a writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(BufWriter::new(writer)),
            written: AtomicU64::new(0),
        }
    }

    /// Pairs written so far.
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    /// Flushes and returns the underlying writer.
    pub fn into_inner(self) -> io::Result<W> {
        self.writer
            .into_inner()
            .into_inner()
            .map_err(io::IntoInnerError::into_error)
    }
}

impl<W: Write> PairSink for JsonLinesSink<W> {
    fn write_batch(&self, pairs: &[CandidatePair]) -> Result<(), BlockingError> {
        if pairs.is_empty() {
            return Ok(());
        }
        let mut buf = Vec::with_capacity(pairs.len() * 64);
        for pair in pairs {
            serde_json::to_writer(&mut buf, pair).map_err(io::Error::from)?;
            buf.push(b'\n');
        }

        let mut w = self.writer.lock();
        w.write_all(&buf)?;
        w.flush()?;
        drop(w);

        self.written.fetch_add(pairs.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    fn flush(&self) -> Result<(), BlockingError> {
        self.writer.lock().flush()?;
        Ok(())
    }
}
