use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use bytepair::corpus::load_input;
use bytepair::serialization;
use bytepair::{IterationMetrics, Trainer, TrainerConfig};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use env_logger::Env;
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use rayon::ThreadPoolBuilder;
use serde_json::json;

const DEFAULT_OUTPUT: &str = "grammar.bpe";

#[derive(Parser, Debug)]
#[command(author, version, about = "Incremental byte pair encoding trainer", long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Decrease verbosity (-q, -qq)
    #[arg(short = 'q', long, global = true, action = ArgAction::Count)]
    quiet: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train a grammar on a file until no pair repeats
    Train(TrainArgs),
    /// Inspect a trained grammar
    Info(InfoArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Little-endian binary layout
    Bpe,
    /// JSON document
    Json,
}

#[derive(Args, Debug)]
struct TrainArgs {
    /// File to train on
    input: PathBuf,

    /// Output path for the trained grammar
    #[arg(short, long, value_name = "PATH", default_value = DEFAULT_OUTPUT)]
    output: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Bpe)]
    format: OutputFormat,

    /// Emit pretty JSON (with --format json)
    #[arg(long)]
    pretty: bool,

    /// Reduction steps between progress reports
    #[arg(long, value_name = "STEPS")]
    report_interval: Option<usize>,

    /// Disable progress logging and the spinner
    #[arg(long)]
    no_progress: bool,

    /// Stop as soon as no pair repeats, even on the first step
    #[arg(long)]
    no_prime: bool,

    /// Always run the initial pair scan on one thread
    #[arg(long)]
    sequential_seed: bool,

    /// Limit Rayon worker threads
    #[arg(long, value_name = "N")]
    threads: Option<usize>,
}

#[derive(Args, Debug)]
struct InfoArgs {
    /// Trained grammar to inspect (.bpe or JSON)
    #[arg(short = 'm', long, value_name = "PATH")]
    model: PathBuf,

    /// Emit machine-readable JSON summary
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Train(args) => run_train(args),
        Commands::Info(args) => run_info(args),
    }
}

fn init_logging(verbose: u8, quiet: u8) {
    use log::LevelFilter;

    let level = if quiet > 0 {
        match quiet {
            1 => LevelFilter::Warn,
            _ => LevelFilter::Error,
        }
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
    builder.format_timestamp_millis();
    builder.filter_level(level);
    let _ = builder.try_init();
}

fn run_train(args: TrainArgs) -> Result<()> {
    if let Some(threads) = args.threads {
        ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("unable to configure Rayon thread pool")?;
    }

    let mut cfg = TrainerConfig::builder()
        .show_progress(!args.no_progress)
        .prime_first_merge(!args.no_prime)
        .parallel_seed(!args.sequential_seed);
    if let Some(interval) = args.report_interval {
        cfg = cfg.report_interval(interval);
    }
    let trainer_cfg = cfg.build()?;

    let data = load_input(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    info!(
        "loaded {} totalling {:.2} MiB",
        args.input.display(),
        bytes_to_mebibytes(data.len())
    );

    let spinner = if args.no_progress {
        None
    } else {
        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner} {msg} {elapsed}")
            .context("invalid progress template")?
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
        pb.set_style(style);
        pb.set_message("merging pairs...");
        pb.enable_steady_tick(Duration::from_millis(80));
        Some(pb)
    };

    let trainer = Trainer::new(trainer_cfg);
    let start = Instant::now();
    let artifacts = trainer
        .train_with_observer(&data, |snapshot: &IterationMetrics| {
            if let Some(pb) = &spinner {
                pb.set_message(format!(
                    "step {} | tokens {} | vocab {}",
                    snapshot.iteration, snapshot.sequence_len, snapshot.grammar_len
                ));
            }
        })
        .context("training failed")?;
    if let Some(pb) = spinner {
        pb.finish_with_message("training complete");
    }
    let elapsed = start.elapsed();

    let saved = match args.format {
        OutputFormat::Bpe => artifacts.model.save_binary(&args.output),
        OutputFormat::Json => artifacts.model.save_json(&args.output, args.pretty),
    };
    saved.with_context(|| format!("failed to save grammar to {}", args.output.display()))?;

    let merges = artifacts.model.merges().len();
    let ratio = if data.is_empty() {
        1.0
    } else {
        artifacts.model.tokens().len() as f64 / data.len() as f64
    };
    info!(
        "training complete: merges={merges} vocab={} tokens={} duration={elapsed:.2?}",
        artifacts.model.vocab_size(),
        artifacts.model.tokens().len()
    );
    println!(
        "wrote grammar with vocab {} ({} merges) to {}",
        artifacts.model.vocab_size(),
        merges,
        args.output.display()
    );
    println!(
        "   input {} bytes -> {} tokens ({:.3}) | duration {:.2?}",
        data.len(),
        artifacts.model.tokens().len(),
        ratio,
        elapsed
    );

    Ok(())
}

fn run_info(args: InfoArgs) -> Result<()> {
    let model = serialization::load_model(&args.model)
        .with_context(|| format!("failed to load grammar from {}", args.model.display()))?;

    let summary = json!({
        "path": args.model.display().to_string(),
        "iterations": model.iterations(),
        "sequence_len": model.tokens().len(),
        "vocab_size": model.vocab_size(),
        "merges": model.merges().len(),
    });

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Iterations   : {}", model.iterations());
        println!("Sequence len : {}", model.tokens().len());
        println!("Vocab size   : {}", model.vocab_size());
        println!("Merges       : {}", model.merges().len());
        if let Some(first) = model.merges().first() {
            println!("First merge  : {first}");
        }
    }

    Ok(())
}

#[must_use]
fn bytes_to_mebibytes(bytes: usize) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}
