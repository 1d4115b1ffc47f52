//! Command-line arguments, exit statuses, the banner, and process-wide
//! logging/signal setup.

use std::io::IsTerminal;

use clap::{ArgAction, Parser};
use tracing_subscriber::EnvFilter;

// Exit statuses. Zero is success; SIGINT/SIGTERM exits with 130.
pub const EXIT_INVALID_OPTION: u8 = 1;
pub const EXIT_MISSING_OPTION: u8 = 2;
pub const EXIT_INVALID_ARGUMENT: u8 = 3;
pub const EXIT_MISSING_ARGUMENT: u8 = 4;
pub const EXIT_EXTRA_ARGUMENT: u8 = 5;
pub const EXIT_EXCEPTION: u8 = 6;
pub const EXIT_INTERRUPT: u8 = 130;

/// patchcord CLI arguments.
#[derive(Parser, Debug)]
#[command(
    name = "patchcord",
    about = "Bridge two byte-stream endpoints, socat style",
    long_about = "Bridge two byte-stream endpoints, socat style.\n\n\
        Each seed is TYPE[:ADDR[,OPT[,OPT...]]] where OPT is KEY or \
        KEY=VALUE. Supported types: file, stdio (aliases: -, stdin, \
        stdout), tcp, tcp-listen (tcp-l), tls, tls-listen (tls-l), udp, \
        udp-listen (udp-l). With one seed the other defaults to stdio.",
    disable_version_flag = true
)]
pub struct Args {
    /// Show additional levels of debug messages.
    #[arg(short = 'd', long = "debug", action = ArgAction::Count)]
    pub debug: u8,

    /// Disable colorized output.
    #[arg(long = "no-color")]
    pub no_color: bool,

    /// Show alternate banner.
    #[arg(long = "nsfw", visible_alias = "xxx")]
    pub nsfw: bool,

    /// Do not show banner.
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,

    /// Show verbose errors.
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Show version.
    #[arg(short = 'V', long = "version")]
    pub version: bool,

    /// Seed specifications (one or two; a missing second seed means stdio).
    #[arg(value_name = "seed")]
    pub seeds: Vec<String>,
}

/// Map a clap parse failure onto the documented exit statuses.
pub fn exit_code_for(err: &clap::Error) -> u8 {
    use clap::error::ErrorKind;

    match err.kind() {
        ErrorKind::DisplayHelp
        | ErrorKind::DisplayVersion
        | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => 0,
        ErrorKind::InvalidValue => EXIT_MISSING_OPTION,
        ErrorKind::ValueValidation | ErrorKind::InvalidUtf8 => EXIT_INVALID_ARGUMENT,
        ErrorKind::MissingRequiredArgument => EXIT_MISSING_ARGUMENT,
        ErrorKind::TooManyValues | ErrorKind::WrongNumberOfValues => EXIT_EXTRA_ARGUMENT,
        _ => EXIT_INVALID_OPTION,
    }
}

const BANNER: &str = r#" .-------------------------------------.
 |  p a t c h c o r d                  |
 |  one cord, two jacks, bytes flowing |
 '-------------------------------------'"#;

const BANNER_ALT: &str = r#" .-------------------------------------.
 |  p a t c h c o r d             ;-)  |
 |  plugs into anything, no questions  |
 '-------------------------------------'"#;

/// Print the startup banner, optionally the alternate variant.
pub fn print_banner(alt: bool, color: bool) {
    let art = if alt { BANNER_ALT } else { BANNER };
    if color && std::io::stdout().is_terminal() {
        println!("\x1b[36m{art}\x1b[0m");
    } else {
        println!("{art}");
    }
    println!(" patchcord v{}", patchcord_core::VERSION);
    println!();
}

/// Install the process-wide tracing subscriber. No `-d` means no subscriber
/// and therefore no output from the core.
pub fn init_tracing(debug: u8, no_color: bool) {
    if debug == 0 {
        return;
    }
    let default_level = if debug == 1 { "info" } else { "debug" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(!no_color)
        .with_writer(std::io::stderr)
        .init();
}

/// Wait for SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn args_parse_flags_and_seeds() {
        let args = Args::parse_from(["patchcord", "-dd", "-q", "tcp:1234", "-"]);
        assert_eq!(args.debug, 2);
        assert!(args.quiet);
        assert_eq!(args.seeds, vec!["tcp:1234".to_string(), "-".to_string()]);
    }

    #[test]
    fn xxx_is_an_alias_for_nsfw() {
        let args = Args::parse_from(["patchcord", "--xxx", "-"]);
        assert!(args.nsfw);
    }

    #[test]
    fn unknown_flags_map_to_invalid_option() {
        let err = Args::try_parse_from(["patchcord", "--bogus", "-"]).unwrap_err();
        assert_eq!(exit_code_for(&err), EXIT_INVALID_OPTION);
    }

    #[test]
    fn command_definition_is_consistent() {
        Args::command().debug_assert();
    }
}
