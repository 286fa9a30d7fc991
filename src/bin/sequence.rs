//! Sequence inspection tool for the N-back trainer
//!
//! Generates round sequences and reports how close they land to the target
//! match rate.
//! Usage: cargo run --bin nback-sequence -- --events 20 --lag 2 --cardinality 9 --trials 1000

use clap::Parser;
use rustc_hash::FxHashMap;
use serde_json::json;
use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use nback_trainer::SequenceGenerator;

#[derive(Parser, Debug)]
#[command(name = "N-back Trainer - Sequence Tool")]
#[command(about = "Generate N-back sequences and report their match statistics")]
struct Args {
    /// Events per sequence
    #[arg(short, long, default_value = "20")]
    events: usize,

    /// Lag (N)
    #[arg(short, long, default_value = "2")]
    lag: usize,

    /// Distinct values per event
    #[arg(short, long, default_value = "9")]
    cardinality: u32,

    /// Target share of eligible events that match (0-100)
    #[arg(short, long, default_value = "30")]
    percent: u32,

    /// Seed for the first sequence; later trials continue the same stream
    #[arg(short, long)]
    seed: Option<u64>,

    /// Number of sequences to sample for the distribution
    #[arg(short, long, default_value = "1", value_parser = clap::value_parser!(u64).range(1..))]
    trials: u64,

    /// Write the report to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if args.verbose {
            "nback_sequence=debug,nback_trainer=debug"
        } else {
            "warn"
        })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut generator = match args.seed {
        Some(seed) => SequenceGenerator::seeded(seed),
        None => SequenceGenerator::from_entropy(),
    };
    let target = SequenceGenerator::<rand::rngs::StdRng>::target_matches(
        args.events,
        args.lag,
        args.percent,
    );

    let start = Instant::now();
    let first = generator.generate(args.events, args.cardinality, args.percent, args.lag)?;

    // Match count → number of sequences that landed on it
    let mut distribution: FxHashMap<usize, usize> = FxHashMap::default();
    let mut total_collisions = first.collisions();
    *distribution.entry(first.match_count()).or_insert(0) += 1;

    for trial in 1..args.trials {
        let sequence = generator.generate(args.events, args.cardinality, args.percent, args.lag)?;
        total_collisions += sequence.collisions();
        *distribution.entry(sequence.match_count()).or_insert(0) += 1;
        if trial % 10_000 == 0 {
            debug!(trial, "sampling");
        }
    }

    let mut buckets: Vec<(usize, usize)> = distribution.into_iter().collect();
    buckets.sort();
    let exact = buckets
        .iter()
        .find(|(matches, _)| *matches == target)
        .map(|(_, count)| *count)
        .unwrap_or(0);

    let report = json!({
        "events": first.events(),
        "lag": args.lag,
        "cardinality": args.cardinality,
        "eligible": first.eligible(),
        "target_matches": target,
        "actual_matches": first.match_count(),
        "collisions": first.collisions(),
        "trials": args.trials,
        "exact_hit_rate": exact as f64 / args.trials as f64,
        "total_collisions": total_collisions,
        "distribution": buckets
            .iter()
            .map(|(matches, count)| json!({ "matches": matches, "count": count }))
            .collect::<Vec<_>>(),
    });
    info!(
        trials = args.trials,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "sampling complete"
    );

    let rendered = serde_json::to_string_pretty(&report)?;
    match &args.output {
        Some(path) => {
            fs::write(path, rendered)?;
            println!("Report saved to: {}", path.display());
        }
        None => println!("{}", rendered),
    }

    Ok(())
}
