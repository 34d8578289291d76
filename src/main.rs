use std::process::ExitCode;

use anyhow::Result;
use clap::error::ErrorKind;
use clap::Parser;

use stagebench::catalog::WorkCatalog;
use stagebench::config::{BenchConfig, Dispatch, Partition};
use stagebench::engine::EngineKind;
use stagebench::io::write_summary;
use stagebench::orchestrator::{GroupSpec, Orchestrator};
use stagebench::worker::DEFAULT_TIME_MULTIPLIER;

#[derive(Parser, Debug)]
#[command(name = "stagebench", version)]
#[command(
    about = "Benchmark a three-stage pipeline under process, thread and hybrid concurrency",
    long_about = None
)]
struct Args {
    /// Number of execution group processes (0 = run in this process)
    #[arg(value_name = "PROCESSES")]
    processes: usize,

    /// Number of worker threads per group (0 = no worker threads)
    #[arg(value_name = "THREADS")]
    threads: usize,

    /// Queue engine used by hybrid groups
    #[arg(short, long, value_enum, default_value_t = EngineKind::Blocking)]
    engine: EngineKind,

    /// How threads claim items in thread-only mode
    #[arg(short, long, value_enum, default_value_t = Dispatch::Spinlock)]
    dispatch: Dispatch,

    /// How the catalog is split across processes
    #[arg(short, long, value_enum, default_value_t = Partition::Greedy)]
    partition: Partition,

    /// CPU iterations burned per unit of item cost
    #[arg(
        short = 'm',
        long,
        env = "STAGEBENCH_TIME_MULTIPLIER",
        default_value_t = DEFAULT_TIME_MULTIPLIER
    )]
    time_multiplier: u64,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Disable logging and the progress bar
    #[arg(short, long)]
    quiet: bool,

    #[arg(long, hide = true)]
    group_index: Option<usize>,

    #[arg(long, hide = true, value_delimiter = ',')]
    group_items: Vec<usize>,
}

fn main() -> Result<ExitCode> {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            err.exit()
        }
        Err(err) => {
            // Usage errors are configuration errors: report and exit 1
            // before any work starts.
            let _ = err.print();
            return Ok(ExitCode::FAILURE);
        }
    };

    setup_logging(args.verbose, args.quiet);

    let catalog = WorkCatalog::builtin();

    if let Some(index) = args.group_index {
        let spec = GroupSpec {
            index,
            items: args.group_items,
            threads: args.threads,
            engine: args.engine,
            time_multiplier: args.time_multiplier,
        };
        spec.run(&catalog)?;
        return Ok(ExitCode::SUCCESS);
    }

    let mut config = BenchConfig::new(args.processes, args.threads, args.time_multiplier)?;
    config.engine = args.engine;
    config.dispatch = args.dispatch;
    config.partition = args.partition;
    config.show_progress = !args.quiet;

    let report = Orchestrator::new(config, catalog)
        .with_verbosity(args.verbose)
        .run()?;

    write_summary(std::io::stdout().lock(), &report)?;
    Ok(ExitCode::SUCCESS)
}

fn setup_logging(verbose: u8, quiet: bool) {
    if quiet {
        return;
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        match verbose {
            0 => tracing_subscriber::EnvFilter::new("warn"),
            1 => tracing_subscriber::EnvFilter::new("info"),
            2 => tracing_subscriber::EnvFilter::new("debug"),
            _ => tracing_subscriber::EnvFilter::new("trace"),
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
