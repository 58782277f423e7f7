//! Binary entry point for the `tx_perf` benchmark tool.
//!
//! Result lines go to stdout, diagnostics and logs go to stderr. This module is excluded from
//! mutation testing because exercising process exit behavior requires spawning subprocesses.

use std::io;
use std::num::NonZero;
use std::process::ExitCode;

use argh::FromArgs;
use tracing::error;
use tracing_subscriber::EnvFilter;
use tx_perf::{IoPattern, RunConfig, Reporter, Runner};

/// Measures the throughput of a transactional memory workload on multiple threads.
#[derive(FromArgs)]
struct Args {
    /// number of worker threads (default 1)
    #[argh(option, short = 't', default = "1")]
    threads: usize,

    /// time budget of each worker, in milliseconds (default 0)
    #[argh(option, short = 'T', default = "0")]
    duration_ms: u64,

    /// memory access pattern of the workload: random or sequential (default random)
    #[argh(option, short = 'P', default = "IoPattern::Random")]
    pattern: IoPattern,

    /// number of loads per transaction (default 0)
    #[argh(option, short = 'L', default = "0")]
    loads: u64,

    /// number of stores per transaction (default 0)
    #[argh(option, short = 'S', default = "0")]
    stores: u64,

    /// print the version and exit
    #[argh(switch, short = 'V')]
    version: bool,
}

// Binary entry point - mutations would require subprocess testing which is impractical.
#[cfg_attr(test, mutants::skip)]
fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let env_args: Vec<String> = std::env::args().collect();
    let str_args: Vec<&str> = env_args.iter().map(String::as_str).collect();

    let program_name = str_args.first().copied().unwrap_or("tx_perf");
    let rest = str_args.get(1..).unwrap_or(&[]);

    if rest.is_empty() {
        println!("Use '{program_name} --help' to list the available options.");
        return ExitCode::SUCCESS;
    }

    let args: Args = match Args::from_args(&[program_name], rest) {
        Ok(args) => args,
        Err(early_exit) => {
            println!("{}", early_exit.output);
            return if early_exit.status.is_ok() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            };
        }
    };

    if args.version {
        println!("{program_name} {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    let Some(thread_count) = NonZero::new(args.threads) else {
        eprintln!("Error: the number of threads must be at least 1");
        return ExitCode::FAILURE;
    };

    let config = match RunConfig::builder()
        .thread_count(thread_count)
        .duration_ms(args.duration_ms)
        .load_count(args.loads)
        .store_count(args.stores)
        .shared_workload(args.pattern.workload())
        .build()
    {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut reporter = Reporter::new(io::stdout().lock());

    match Runner::new(config).run() {
        Ok(result) => match reporter.write_result(&result) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Error: cannot write results: {e}");
                ExitCode::FAILURE
            }
        },
        Err(run_error) => {
            // Lines of workers that finished are still useful for analysis.
            if let Err(e) = reporter.write_completed_from(&run_error) {
                eprintln!("Error: cannot write results: {e}");
            }

            error!(error = %run_error, "benchmark run failed");
            eprintln!("Error: {run_error}");
            ExitCode::FAILURE
        }
    }
}
