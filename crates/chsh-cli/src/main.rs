//! CLI for chsh-lab: Bell-inequality (CHSH) estimation and convergence sweeps.

mod commands;

use clap::{ArgAction, Parser, Subcommand};

use commands::SamplerArgs;

#[derive(Parser)]
#[command(name = "chsh")]
#[command(about = "chsh — estimate the CHSH parameter S and study its convergence")]
#[command(version = chsh_core::VERSION)]
struct Cli {
    /// JSON experiment config; command-line flags override its values
    #[arg(long, global = true)]
    config: Option<String>,

    /// Log verbosity: -v info, -vv debug, -vvv trace (RUST_LOG overrides)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// One CHSH measurement: four correlations, S, and its distance to 2√2
    Run {
        /// Shots per pairing; omit for exact probabilities
        #[arg(long)]
        shots: Option<u64>,

        /// Measure the four pairings concurrently
        #[arg(long)]
        parallel: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        sampler: SamplerArgs,
    },

    /// Power-of-two sample-size sweep with session recording and statistics.
    /// Ctrl+C stops after the runs in flight and keeps what completed.
    Sweep {
        /// Smallest sample size exponent (2^min)
        #[arg(long)]
        min_exp: Option<u32>,

        /// Largest sample size exponent (2^max)
        #[arg(long)]
        max_exp: Option<u32>,

        /// Trials per sample size
        #[arg(long)]
        trials: Option<usize>,

        /// Concurrent runs (keep within the backend's job limit)
        #[arg(long)]
        workers: Option<usize>,

        /// Measure the four pairings of each run concurrently
        #[arg(long)]
        parallel: bool,

        /// Session directory (default: ./sessions/)
        #[arg(long)]
        output: Option<String>,

        /// Chart data directory (default: ./plots/)
        #[arg(long)]
        plots: Option<String>,

        /// Chart data format
        #[arg(long, value_parser = ["csv", "json"])]
        format: Option<String>,

        /// Metadata tags as key:value pairs
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Session note
        #[arg(long)]
        note: Option<String>,

        /// Do not record a session
        #[arg(long)]
        no_record: bool,

        #[command(flatten)]
        sampler: SamplerArgs,
    },

    /// Rotate Alice's qubit by θ over [0, 2π] and report S(θ)
    Scan {
        /// Number of evenly spaced phases
        #[arg(long, default_value = "20")]
        phases: usize,

        /// Shots per pairing; omit for exact probabilities
        #[arg(long)]
        shots: Option<u64>,

        #[command(flatten)]
        sampler: SamplerArgs,
    },

    /// List recorded sweep sessions, or show one with its convergence summary
    Sessions {
        /// Path to a specific session directory
        session: Option<String>,

        /// Directory containing session recordings (default: ./sessions/)
        #[arg(long)]
        dir: Option<String>,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = commands::load_config(cli.config.as_deref());
    log::debug!("config: {config:?}");

    match cli.command {
        Commands::Run {
            shots,
            parallel,
            json,
            sampler,
        } => {
            sampler.apply(&mut config);
            commands::run::run(&config, shots, parallel, json);
        }
        Commands::Sweep {
            min_exp,
            max_exp,
            trials,
            workers,
            parallel,
            output,
            plots,
            format,
            tags,
            note,
            no_record,
            sampler,
        } => {
            sampler.apply(&mut config);
            if let Some(v) = min_exp {
                config.sweep.min_exponent = v;
            }
            if let Some(v) = max_exp {
                config.sweep.max_exponent = v;
            }
            if let Some(v) = trials {
                config.sweep.trials = v;
            }
            if let Some(v) = workers {
                config.sweep.workers = v;
            }
            if let Some(dir) = output {
                config.output.sessions_dir = dir.into();
            }
            if let Some(dir) = plots {
                config.output.plots_dir = dir.into();
            }
            if let Some(f) = format {
                config.output.chart_format = commands::parse_or_exit(&f);
            }
            commands::sweep::run(
                &config,
                &commands::sweep::SweepCommandConfig {
                    tags: &tags,
                    note: note.as_deref(),
                    record: !no_record,
                    parallel_pairings: parallel,
                },
            );
        }
        Commands::Scan {
            phases,
            shots,
            sampler,
        } => {
            sampler.apply(&mut config);
            commands::scan::run(&config, phases, shots);
        }
        Commands::Sessions { session, dir } => {
            if let Some(dir) = dir {
                config.output.sessions_dir = dir.into();
            }
            commands::sessions::run(session.as_deref(), &config.output.sessions_dir);
        }
    }
}
