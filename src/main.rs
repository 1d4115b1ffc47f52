//! patchcord CLI entry point.
//!
//! Usage: `patchcord [OPTIONS] <seed> [seed]`. With one seed, the other side
//! of the bridge is stdio. SIGINT/SIGTERM tear both endpoints down and exit
//! with status 130.

mod cli;

use std::process::ExitCode;

use clap::Parser;
use patchcord_core::{pair, EndpointError, VERSION};
use patchcord_endpoints::from_seed;

#[tokio::main]
async fn main() -> ExitCode {
    let args = match cli::Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let code = cli::exit_code_for(&err);
            let _ = err.print();
            return ExitCode::from(code);
        }
    };

    if args.version {
        println!("patchcord version {VERSION}");
        return ExitCode::SUCCESS;
    }

    if !args.quiet {
        cli::print_banner(args.nsfw, !args.no_color);
    }
    cli::init_tracing(args.debug, args.no_color);

    if args.seeds.is_empty() {
        eprintln!("missing seed argument; usage: patchcord [OPTIONS] <seed> [seed]");
        return ExitCode::from(cli::EXIT_MISSING_ARGUMENT);
    }
    if args.seeds.len() > 2 {
        eprintln!("at most two seeds may be given");
        return ExitCode::from(cli::EXIT_EXTRA_ARGUMENT);
    }

    match bridge(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if args.verbose {
                eprintln!("error: {err:?}");
            } else {
                eprintln!("error: {err}");
            }
            ExitCode::from(cli::EXIT_EXCEPTION)
        }
    }
}

async fn bridge(args: &cli::Args) -> Result<(), EndpointError> {
    let left = from_seed(&args.seeds[0])?;
    let right = from_seed(args.seeds.get(1).map(String::as_str).unwrap_or("-"))?;

    // The signal handler owns teardown so a blocked bridge cannot swallow
    // an interrupt.
    let signal_left = left.clone();
    let signal_right = right.clone();
    tokio::spawn(async move {
        cli::shutdown_signal().await;
        let _ = signal_left.down().await;
        let _ = signal_right.down().await;
        std::process::exit(i32::from(cli::EXIT_INTERRUPT));
    });

    pair(left, right).await
}
