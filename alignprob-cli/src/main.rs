use clap::{Parser, Subcommand};
use std::path::PathBuf;
use anyhow::{Result, Context};

mod config;
mod commands;
mod error;

use config::Config;
use error::{format_error_with_suggestions, CliError};

#[derive(Parser)]
#[command(name = "alignprob")]
#[command(about = "alignprob - calibrated true/false/invalid calls for alignment placements")]
#[command(version)]
#[command(long_about = "
alignprob scores alignment placements against a per-length calibration table
(mixture weight plus negative binomial parameters for true and invalid
placements) and aggregates the alternative placements of each read into a
posterior.

Examples:
  alignprob inspect --table calibration.tsv --query 100:187
  alignprob classify --table calibration.tsv --input scores.tsv --output calls.tsv
  alignprob config > alignprob.toml
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Number of threads to use
    #[arg(short, long, global = true)]
    pub threads: Option<usize>,

    /// Verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Score alignment candidates grouped by read
    Classify {
        /// Calibration table (TSV, optionally gzipped)
        #[arg(long)]
        table: Option<PathBuf>,

        /// Input TSV: read_id, aligned_length, score ('-' for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Output TSV (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Per-base match reward of the aligner's scoring scheme
        #[arg(long)]
        match_score: Option<i32>,

        /// Prior probability that a placement is true
        #[arg(long)]
        prior: Option<f64>,

        /// Minimum posterior for a true call
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Validate and summarise a calibration table
    Inspect {
        /// Calibration table (TSV, optionally gzipped)
        #[arg(long)]
        table: Option<PathBuf>,

        /// Per-base match reward of the aligner's scoring scheme
        #[arg(long)]
        match_score: Option<i32>,

        /// Evaluate the model at LENGTH:SCORE (repeatable)
        #[arg(long = "query")]
        queries: Vec<String>,

        /// Print the normalised table after the summary
        #[arg(long)]
        dump: bool,
    },

    /// Print (or write) the default configuration as TOML
    Config {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn setup_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn run(cli: Cli) -> Result<()> {
    // Load configuration
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(threads) = cli.threads {
        config.general.threads = threads;
    }

    // Set global thread count
    rayon::ThreadPoolBuilder::new()
        .num_threads(config.general.threads)
        .build_global()
        .context("Failed to set thread count")?;

    // Execute the requested command
    match cli.command {
        Commands::Classify {
            table,
            input,
            output,
            match_score,
            prior,
            threshold,
        } => {
            commands::classify::execute(&config, table, input, output, match_score, prior, threshold)?;
        }

        Commands::Inspect {
            table,
            match_score,
            queries,
            dump,
        } => {
            commands::inspect::execute(&config, table, match_score, queries, dump)?;
        }

        Commands::Config { output } => match output {
            Some(path) => {
                Config::default().save_to_file(&path)?;
                log::info!("Wrote default configuration to {}", path.display());
            }
            None => print!("{}", Config::example_toml()?),
        },
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();

    // Setup logging
    setup_logging(cli.verbose, cli.quiet);

    if let Err(err) = run(cli) {
        match err.downcast_ref::<CliError>() {
            Some(cli_err) => eprintln!("Error: {}", format_error_with_suggestions(cli_err)),
            None => eprintln!("Error: {:#}", err),
        }
        std::process::exit(1);
    }
}
