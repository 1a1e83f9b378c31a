//! AtlasPack CLI
//!
//! Packs local files into a store and inspects it.

use std::io::Write;
use std::path::PathBuf;

use atlaspack::storage::LocalStore;
use atlaspack::wal::WalRecovery;
use atlaspack::{Config, Engine, SplitPolicy};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

/// AtlasPack CLI
#[derive(Parser, Debug)]
#[command(name = "atlaspack")]
#[command(about = "Pack small files into large part files with an extendible-hash index")]
#[command(version)]
struct Args {
    /// Store directory
    #[arg(short, long, default_value = "./atlaspack_data")]
    data_dir: PathBuf,

    /// Max entries per bucket before it splits
    #[arg(short, long, default_value = "1024")]
    bucket_capacity: i32,

    /// Replication hint for created files
    #[arg(short, long, default_value = "3")]
    replication: i32,

    /// Part file size in MB before rolling over
    #[arg(short = 'p', long, default_value = "2048")]
    part_mb: u64,

    /// Keep splitting until an overflowing bucket fits
    #[arg(long)]
    split_until_resolved: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Store local files, keyed by file name
    Pack {
        /// Files to store
        files: Vec<PathBuf>,
    },

    /// Write a stored file to stdout
    Get {
        /// The key (file name) to read
        key: String,
    },

    /// Print directory and part file statistics
    Stats,

    /// Replay a leftover WAL and consolidate
    Recover,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,atlaspack=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> atlaspack::Result<()> {
    let config = Config::builder()
        .data_dir(&args.data_dir)
        .bucket_capacity(args.bucket_capacity)
        .replication_factor(args.replication)
        .part_max_size(args.part_mb * 1024 * 1024)
        .split_policy(if args.split_until_resolved {
            SplitPolicy::UntilResolved
        } else {
            SplitPolicy::Once
        })
        .build();

    if let Commands::Stats = args.command {
        let wal = config.data_dir.join(atlaspack::layout::WAL_NAME);
        if wal.exists() {
            let pending = WalRecovery::verify(&LocalStore::new(), &wal)?;
            println!(
                "pending WAL entries: {} (torn tail: {} bytes)",
                pending.entries_recovered, pending.torn_bytes
            );
        }
    }

    let engine = Engine::open(config)?;

    match args.command {
        Commands::Pack { files } => {
            for file in &files {
                engine.put_path(file)?;
            }
            tracing::info!(count = files.len(), "packed files");
        }
        Commands::Get { key } => match engine.get(&key)? {
            Some(bytes) => std::io::stdout().write_all(&bytes)?,
            None => {
                tracing::error!(key = %key, "not found");
                std::process::exit(2);
            }
        },
        Commands::Stats => {
            let stats = engine.stats()?;
            println!("global depth: {}", stats.global_depth);
            println!("buckets:      {}", stats.buckets.len());
            println!(
                "current part: part-{} ({} bytes)",
                stats.current_part_id, stats.current_part_position
            );
            for bucket in &stats.buckets {
                println!(
                    "  index-{:<6} depth {:<3} entries {}",
                    bucket.id, bucket.local_depth, bucket.logical_size
                );
            }
        }
        Commands::Recover => match engine.recovery() {
            Some(result) => println!("replayed {} WAL entries", result.entries_recovered),
            None => println!("no WAL to replay"),
        },
    }

    engine.close()
}
