#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(unused_variables)]

use clap::{Parser, Subcommand};
use log::info;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;
use vdscheck::config::ValidationConfig;
use vdscheck::densify::densify_sharded;
use vdscheck::io::load_dataset;
use vdscheck::types::{Contig, GenomicInterval};
use vdscheck::validate::{LayoutValidator, run_validation};

#[derive(Parser)]
#[command(
    name = "vdscheck",
    about = "Consistency checks for sparse variant datasets",
    long_about = "Validates a variant dataset split into reference blocks and variant calls: \
                 sample axis agreement, per-contig reference block invariants and a structural \
                 layout check, plus densification of genomic intervals into a genotype matrix."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full validation over a dataset directory
    Validate {
        /// Dataset directory containing reference_data/ and variant_data/
        #[arg(value_name = "DATASET_DIR")]
        dataset: PathBuf,

        /// TOML run configuration; command-line flags override its values
        #[arg(long)]
        config: Option<PathBuf>,

        /// Contig to check (repeatable); defaults to chr1-22, X, Y, M
        #[arg(long = "contig", value_name = "CONTIG")]
        contigs: Vec<Contig>,

        /// Largest allowed reference block length
        #[arg(long)]
        max_block_length: Option<u32>,

        /// Worker threads
        #[arg(long)]
        threads: Option<usize>,

        /// Interval to densify as a spot check, e.g. chr16:29.5M-29.7M
        #[arg(long)]
        probe: Option<GenomicInterval>,
    },

    /// Densify an interval into a locus x sample genotype table
    Densify {
        #[arg(value_name = "DATASET_DIR")]
        dataset: PathBuf,

        /// Interval to densify, e.g. chr1:100-200
        #[arg(long)]
        interval: GenomicInterval,

        /// Output TSV path; writes to stdout when omitted
        #[arg(long)]
        out: Option<PathBuf>,

        /// Loci per parallel shard
        #[arg(long)]
        shard_width: Option<u32>,

        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show version information
    Version,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Validate {
            dataset,
            config,
            contigs,
            max_block_length,
            threads,
            probe,
        }) => run_validate(
            &dataset,
            config.as_deref(),
            contigs,
            max_block_length,
            threads,
            probe,
        ),
        Some(Commands::Densify {
            dataset,
            interval,
            out,
            shard_width,
            config,
        }) => run_densify(
            &dataset,
            &interval,
            out.as_deref(),
            shard_width,
            config.as_deref(),
        ),
        Some(Commands::Version) => {
            println!("vdscheck {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        None => {
            eprintln!("No subcommand given. Run `vdscheck --help` for usage.");
            process::exit(2);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn load_config(path: Option<&Path>) -> Result<ValidationConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            info!("Loading run configuration from {}", path.display());
            Ok(ValidationConfig::load(path)?)
        }
        None => Ok(ValidationConfig::default()),
    }
}

fn run_validate(
    dataset_dir: &Path,
    config_path: Option<&Path>,
    contigs: Vec<Contig>,
    max_block_length: Option<u32>,
    threads: Option<usize>,
    probe: Option<GenomicInterval>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(config_path)?;
    if !contigs.is_empty() {
        config.contigs = contigs;
    }
    if let Some(max) = max_block_length {
        config.max_block_length = max;
    }
    if let Some(threads) = threads {
        config.threads = threads;
    }
    if probe.is_some() {
        config.probe_interval = probe;
    }
    config.validate()?;

    let dataset = load_dataset(dataset_dir)?;
    let report = run_validation(&dataset, &config, &LayoutValidator)?;

    if let Some(probe) = &report.probe {
        match &probe.error {
            None => println!(
                "Densified {} rows over {} in {:.1}s",
                probe.rows,
                probe.interval,
                probe.elapsed.as_secs_f64()
            ),
            Some(err) => println!("Densify probe over {} failed: {err}", probe.interval),
        }
    }
    for outcome in &report.contigs {
        println!("{}", outcome.message);
    }

    report.ensure_success()?;
    println!("Full VDS validation successful");
    Ok(())
}

fn run_densify(
    dataset_dir: &Path,
    interval: &GenomicInterval,
    out: Option<&Path>,
    shard_width: Option<u32>,
    config_path: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(config_path)?;
    if let Some(width) = shard_width {
        config.densify_shard_width = width;
    }
    config.validate()?;

    let dataset = load_dataset(dataset_dir)?;
    let genome = config.reference_genome();
    let pool = config.thread_pool()?;
    let dense = pool.install(|| {
        densify_sharded(
            &dataset.reference,
            &dataset.variants,
            interval,
            &genome,
            config.densify_shard_width,
        )
    })?;
    info!(
        "Densified {} loci across {} samples",
        dense.nrows(),
        dense.ncols()
    );

    match out {
        Some(path) => {
            let mut writer = BufWriter::new(File::create(path)?);
            dense.write_tsv(&mut writer)?;
            writer.flush()?;
            info!("Wrote dense genotype table to {}", path.display());
        }
        None => {
            let stdout = io::stdout();
            let mut writer = BufWriter::new(stdout.lock());
            dense.write_tsv(&mut writer)?;
            writer.flush()?;
        }
    }
    Ok(())
}
