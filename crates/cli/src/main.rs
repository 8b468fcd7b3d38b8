use clap::Parser;
use recblock_core::config;
use recblock_core::{BlockingConfig, CancelFlag};
use recblock_cli::runner::{run, DatasetInput, RunOptions};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "recblock",
    about = "Block two JSON-lines datasets into candidate record pairs"
)]
struct Args {
    /// Blocking configuration file (JSON)
    #[arg(short, long)]
    config: PathBuf,

    /// First dataset, one JSON record per line
    #[arg(long, required_unless_present = "first_index", conflicts_with = "first_index")]
    first: Option<PathBuf>,

    /// Snapshot of a previously built first-dataset index
    #[arg(long)]
    first_index: Option<PathBuf>,

    /// Second dataset, one JSON record per line
    #[arg(long, required_unless_present = "second_index", conflicts_with = "second_index")]
    second: Option<PathBuf>,

    /// Snapshot of a previously built second-dataset index
    #[arg(long)]
    second_index: Option<PathBuf>,

    /// Output file for candidate pairs (JSON lines)
    #[arg(short, long)]
    output: PathBuf,

    /// Append to the output file instead of truncating it
    #[arg(long, default_value_t = false)]
    append: bool,

    /// Pruning threshold; overrides the config file (<= 0 prunes every token)
    #[arg(long, allow_negative_numbers = true)]
    threshold: Option<i64>,

    /// Directory to save the first dataset's index snapshot into
    #[arg(long)]
    save_first_index: Option<PathBuf>,

    /// Directory to save the second dataset's index snapshot into
    #[arg(long)]
    save_second_index: Option<PathBuf>,

    /// Candidate pairs per output batch
    #[arg(long, default_value_t = config::DEFAULT_PAIR_BATCH_SIZE)]
    batch_size: usize,
}

fn dataset_input(records: Option<PathBuf>, snapshot: Option<PathBuf>) -> Option<DatasetInput> {
    match (records, snapshot) {
        (Some(path), _) => Some(DatasetInput::Records(path)),
        (None, Some(path)) => Some(DatasetInput::Snapshot(path)),
        (None, None) => None,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .json()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("recblock_cli=info".parse()?)
                .add_directive("recblock_core=info".parse()?),
        )
        .init();

    let args = Args::parse();

    if args.batch_size == 0 {
        eprintln!("Error: batch-size must be > 0");
        std::process::exit(1);
    }
    let (Some(first), Some(second)) = (
        dataset_input(args.first, args.first_index),
        dataset_input(args.second, args.second_index),
    ) else {
        eprintln!("Error: each dataset needs either a records file or an index snapshot");
        std::process::exit(1);
    };

    let config = BlockingConfig::from_path(&args.config).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });

    let cancel = CancelFlag::new();
    let signal_flag = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Received SIGINT, cancelling build passes");
                signal_flag.cancel();
            }
            Err(e) => tracing::error!("Failed to install Ctrl+C handler: {}", e),
        }
    });

    let opts = RunOptions {
        config,
        first,
        second,
        output: args.output,
        append: args.append,
        threshold: args.threshold,
        save_first_index: args.save_first_index,
        save_second_index: args.save_second_index,
        batch_size: args.batch_size,
    };

    if let Err(e) = run(opts, cancel).await {
        tracing::error!("Blocking run failed: {}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
    Ok(())
}
