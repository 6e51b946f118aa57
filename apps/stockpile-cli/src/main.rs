mod config;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use stockpile_kernel::{
    EventStream, EventType, StreamConfig, replay_from_nearest_snapshot, replay_from_start,
};
use stockpile_persist::StreamStore;
use stockpile_tools::{EntryLine, StreamInspector};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stockpile", about = "CLI tool for stockpile event streams")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// YAML file with the stream's snapshot policy
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stream data directory
    #[arg(long, default_value = "./stockpile_data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and store metadata
    Info,
    /// Replay the fridge scenario in memory
    Demo,
    /// Record an event in the stored stream
    Add {
        /// Event type tag, e.g. ADDED_SIX_PACK
        tag: String,
        /// Free-form details stored with the event
        #[arg(default_value = "")]
        details: String,
    },
    /// Snapshot the stored stream's current state
    Snapshot,
    /// Reconstruct the current state both ways
    State,
    /// List the stored stream
    Log {
        /// Newest entries first
        #[arg(short, long)]
        reverse: bool,
    },
    /// Verify the store's integrity manifest
    Verify,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    let stream_config = config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Info => info(&cli.data_dir)?,
        Commands::Demo => demo(stream_config),
        Commands::Add { tag, details } => {
            let (mut store, mut stream) = open(&cli.data_dir, stream_config)?;
            stream
                .record_tagged(&tag, details)
                .with_context(|| format!("recording {tag}"))?;
            store.persist(&stream)?;
            println!("Recorded {tag}; length={}", stream.len());
        }
        Commands::Snapshot => {
            let (mut store, mut stream) = open(&cli.data_dir, stream_config)?;
            if !stream.insert_snapshot() {
                bail!(
                    "stream has {} entries; need at least {} to snapshot",
                    stream.len(),
                    stream.config().snapshot_min_len
                );
            }
            store.persist(&stream)?;
            let state = stream
                .tail()
                .and_then(|entry| entry.as_snapshot())
                .map(|snapshot| snapshot.state);
            println!("Snapshot taken: state={}", state.unwrap_or_default());
        }
        Commands::State => {
            let (_store, stream) = open(&cli.data_dir, stream_config)?;
            print_state(&stream);
        }
        Commands::Log { reverse } => {
            let (_store, stream) = open(&cli.data_dir, stream_config)?;
            let lines = if reverse {
                StreamInspector::reverse_chronological(&stream)
            } else {
                StreamInspector::chronological(&stream)
            };
            print_lines(&lines);
        }
        Commands::Verify => {
            let store = StreamStore::open(&cli.data_dir)?;
            store.verify_integrity()?;
            println!(
                "Integrity OK: {} segments, {} entries",
                store.meta().segment_count,
                store.meta().entry_count
            );
        }
    }

    Ok(())
}

fn open(data_dir: &Path, config: StreamConfig) -> Result<(StreamStore, EventStream)> {
    let store = StreamStore::open(data_dir)
        .with_context(|| format!("opening store at {}", data_dir.display()))?;
    let stream = store.load(config)?;
    Ok((store, stream))
}

fn info(data_dir: &Path) -> Result<()> {
    println!("stockpile v{}", env!("CARGO_PKG_VERSION"));
    if !data_dir.exists() {
        println!("store: none at {}", data_dir.display());
        return Ok(());
    }
    let store = StreamStore::open(data_dir)?;
    let meta = store.meta();
    println!(
        "store: {} (schema v{}/v{})",
        store.root().display(),
        meta.stream_schema_version,
        meta.entry_schema_version
    );
    match meta.stream_id {
        Some(id) => println!("stream: {id}"),
        None => println!("stream: unbound"),
    }
    println!(
        "entries: {}, segments: {}",
        meta.entry_count, meta.segment_count
    );
    Ok(())
}

fn demo(config: StreamConfig) {
    let mut fridge = EventStream::with_config(config);
    fridge.record(EventType::AddedSixPack, "DAVID_BROUGHT_IT_CHA-CHING".to_string());
    fridge.record(EventType::RemovedSingleBeer, "DAVID_THIRSTY".to_string());
    fridge.record(EventType::RemovedSingleBeer, "DAVID_BEER_TWO".to_string());
    fridge.record(EventType::RemovedSingleBeer, "CHUG_CHUG_CHUG_DAVID".to_string());
    fridge.insert_snapshot();
    fridge.record(EventType::RemovedSingleBeer, "GO_DAVID_GO".to_string());
    fridge.record(
        EventType::RemovedSingleBeer,
        "DAVID_MAYBE_ILL_HAVE_ONE_MORE".to_string(),
    );
    fridge.record(
        EventType::RemovedSingleBeer,
        "DAVID_OKAY_ONE_MORE_AFTER_THIS".to_string(),
    );

    println!("Reading events chronologically:\n");
    print_lines(&StreamInspector::chronological(&fridge));
    println!();
    print_state(&fridge);
}

fn print_lines(lines: &[EntryLine]) {
    for line in lines {
        println!("{line}");
    }
}

fn print_state(stream: &EventStream) {
    println!("{}", StreamInspector::summary(stream));
    match (replay_from_start(stream), replay_from_nearest_snapshot(stream)) {
        (Some(full), Some(assisted)) => {
            println!(
                "Full replay: state={} walked={}",
                full.state, full.entries_walked
            );
            println!(
                "Snapshot replay: state={} walked={} anchored={}",
                assisted.state, assisted.entries_walked, assisted.anchored_on_snapshot
            );
            if full.corrections > 0 {
                println!("Drifted snapshots overridden: {}", full.corrections);
            }
            println!(
                "Match: {}",
                if full.state == assisted.state {
                    "OK"
                } else {
                    "MISMATCH"
                }
            );
        }
        _ => println!("Stream is empty: no state"),
    }
}
