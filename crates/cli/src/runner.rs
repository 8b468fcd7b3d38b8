//! One blocking run: build or load both indexes, then stream candidate pairs
//! to the output file.

use crate::writer::{writer_stopped, PairWriter};
use recblock_core::config::DEFAULT_PAIR_BATCH_SIZE;
use recblock_core::{
    load_index, save_index, BlockIndex, Blocker, BlockingConfig, BlockingError, BuildStats,
    CancelFlag, DatasetSide, GenerationStats, JsonLinesSource,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Where a dataset's index comes from.
#[derive(Debug, Clone)]
pub enum DatasetInput {
    /// Build from a JSON-lines file.
    Records(PathBuf),
    /// Load a previously saved snapshot.
    Snapshot(PathBuf),
}

/// Inputs of a run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config: BlockingConfig,
    pub first: DatasetInput,
    pub second: DatasetInput,
    pub output: PathBuf,
    pub append: bool,
    /// Overrides the configured threshold.
    pub threshold: Option<i64>,
    pub save_first_index: Option<PathBuf>,
    pub save_second_index: Option<PathBuf>,
    pub batch_size: usize,
}

impl RunOptions {
    /// Builds both datasets from record files with default settings.
    pub fn new(
        config: BlockingConfig,
        first: impl Into<PathBuf>,
        second: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            config,
            first: DatasetInput::Records(first.into()),
            second: DatasetInput::Records(second.into()),
            output: output.into(),
            append: false,
            threshold: None,
            save_first_index: None,
            save_second_index: None,
            batch_size: DEFAULT_PAIR_BATCH_SIZE,
        }
    }
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub first: BuildStats,
    pub second: BuildStats,
    pub generation: GenerationStats,
    pub pairs_written: u64,
}

/// Executes a run. Cancelling `cancel` stops in-progress build passes.
pub async fn run(opts: RunOptions, cancel: CancelFlag) -> Result<RunSummary, BlockingError> {
    let started = Instant::now();
    let mut blocker = Blocker::new(&opts.config)?.with_cancel_flag(cancel);
    if let Some(threshold) = opts.threshold {
        blocker = blocker.with_threshold(threshold);
    }
    let blocker = Arc::new(blocker);
    tracing::info!(
        "Blocking with {:?}, threshold {}",
        blocker.tokenizer().method(),
        blocker.threshold()
    );

    let (first, second) = tokio::try_join!(
        prepare_index(
            Arc::clone(&blocker),
            DatasetSide::First,
            opts.first,
            opts.save_first_index
        ),
        prepare_index(
            Arc::clone(&blocker),
            DatasetSide::Second,
            opts.second,
            opts.save_second_index
        ),
    )?;
    let (first_stats, second_stats) = (first.stats(), second.stats());

    let writer = PairWriter::create(&opts.output, opts.append)?;
    let tx = writer.sender();
    let batch_size = opts.batch_size;
    let producer = Arc::clone(&blocker);
    let produced = tokio::task::spawn_blocking(move || {
        producer.emit_batches(&first, &second, batch_size, |batch| {
            tx.blocking_send(batch).map_err(|_| writer_stopped())
        })
    })
    .await
    .map_err(join_error)?;

    // A failed writer makes the producer fail too; its error is the cause.
    let written = writer.finish().await;
    let (generation, pairs_written) = match (produced, written) {
        (Ok(generation), Ok(pairs_written)) => (generation, pairs_written),
        (_, Err(e)) | (Err(e), Ok(_)) => return Err(e),
    };

    let summary = RunSummary {
        first: first_stats,
        second: second_stats,
        generation,
        pairs_written,
    };
    tracing::info!(
        "Run complete in {:.3}s: first read={} skipped={}, second read={} skipped={}, \
         tokens pruned={}, pairs={}",
        started.elapsed().as_secs_f64(),
        summary.first.records_read,
        summary.first.records_skipped,
        summary.second.records_read,
        summary.second.records_skipped,
        summary.generation.tokens_pruned,
        summary.pairs_written
    );
    Ok(summary)
}

async fn prepare_index(
    blocker: Arc<Blocker>,
    side: DatasetSide,
    input: DatasetInput,
    save_dir: Option<PathBuf>,
) -> Result<BlockIndex, BlockingError> {
    let cancel = blocker.cancel_flag().clone();
    let result = tokio::task::spawn_blocking(move || {
        let index = match input {
            DatasetInput::Records(path) => {
                tracing::info!("Building {} index from {:?}", side.as_str(), path);
                let source = JsonLinesSource::open(&path)?;
                blocker.build_index(side, source)?
            }
            DatasetInput::Snapshot(path) => {
                let index = load_index(&path)?;
                if index.tokenizer() != blocker.tokenizer() {
                    return Err(BlockingError::Snapshot(format!(
                        "{:?} was built with {:?}, configuration uses {:?}",
                        path,
                        index.tokenizer(),
                        blocker.tokenizer()
                    )));
                }
                index
            }
        };
        if let Some(dir) = save_dir {
            save_index(&index, &dir)?;
        }
        Ok::<_, BlockingError>(index)
    })
    .await
    .map_err(join_error)?;

    // Stop the sibling pass; its result is discarded anyway.
    if result.is_err() {
        cancel.cancel();
    }
    result
}

fn join_error(e: tokio::task::JoinError) -> BlockingError {
    BlockingError::Io(io::Error::other(format!("blocking task failed: {}", e)))
}
