//! relaybot entry point.
//!
//! Binary name: `relaybot`
//!
//! Parses CLI arguments, initializes tracing, then dispatches to `run` or
//! `check-config`. Exit status: 0 on normal completion, 2 when the run ended
//! on a fatal transport event, 1 on setup errors.

mod cli;

use clap::Parser;
use relaybot_observe::{LogFormat, TracingOptions, init_tracing, shutdown_tracing};

use cli::run::Outcome;
use cli::{Cli, Commands};

const SETUP_ERROR_EXIT_CODE: i32 = 1;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let options = TracingOptions {
        default_filter: cli.log_filter().to_string(),
        format: if cli.log_json {
            LogFormat::Json
        } else {
            LogFormat::Text
        },
        otel: cli.otel,
    };
    if let Err(e) = init_tracing(&options) {
        eprintln!("error: failed to initialize logging: {e}");
        std::process::exit(SETUP_ERROR_EXIT_CODE);
    }

    let result = match cli.command {
        Commands::Run(args) => cli::run::run(args).await,
        Commands::CheckConfig(args) => cli::check::check_config(&args).map(|()| Outcome::Completed),
    };

    let code = match result {
        Ok(outcome) => outcome.exit_code(),
        Err(e) => {
            eprintln!("{} {e:#}", console::style("error:").for_stderr().red().bold());
            SETUP_ERROR_EXIT_CODE
        }
    };

    shutdown_tracing();
    // A stdin replay can still be parked in a blocking read; exit without
    // waiting for the runtime to drain it.
    std::process::exit(code);
}
