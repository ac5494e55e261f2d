//! Keel CLI
//!
//! Usage:
//!   keel run -p <ROOTS> <NAME> [ARGS]...   Run a module's entry function
//!   keel locate -p <ROOTS> <SIMPLE_NAME>   List units with a simple name
//!   keel inspect <FILE>                    Describe a compiled unit

mod commands;
mod output;

use std::process::ExitCode;
use std::sync::Once;

use clap::{ArgAction, Parser, Subcommand};
use keel_runtime::RuntimeError;

#[derive(Parser)]
#[command(name = "keel")]
#[command(about = "Locate, load and run Keel modules", long_about = None)]
#[command(version)]
struct Cli {
    /// Log more (-v for debug, -vv for trace); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// When to use colors
    #[arg(long, global = true, value_parser = ["auto", "always", "never"])]
    color: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the entry function of a module in a fresh isolated context
    Run {
        /// Roots to search (directories or archives, `container.zip!/offset`).
        /// May repeat; each value may hold a platform path list
        #[arg(short = 'p', long = "path", value_name = "ROOTS")]
        paths: Vec<String>,

        /// Skip roots that cannot be read instead of failing
        #[arg(long)]
        skip_unavailable: bool,

        /// Load units without verifying their bytecode
        #[arg(long)]
        no_verify: bool,

        /// Module name, fully qualified or simple
        name: String,

        /// Arguments passed to the entry function
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Print the location of every unit with the given simple name
    Locate {
        /// Roots to search
        #[arg(short = 'p', long = "path", value_name = "ROOTS")]
        paths: Vec<String>,

        /// Skip roots that cannot be read instead of failing
        #[arg(long)]
        skip_unavailable: bool,

        /// Simple name (last segment) of the module
        simple_name: String,
    },

    /// Decode a compiled unit and describe its functions
    Inspect {
        /// Path to a `.kbc` file
        file: String,
    },
}

static TRACING_INIT: Once = Once::new();

/// Install the log subscriber once.
///
/// `RUST_LOG` wins when set; otherwise `-v` selects the level. With neither,
/// no subscriber is installed and runtime events go nowhere.
fn init_tracing(verbose: u8) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    TRACING_INIT.call_once(|| {
        let filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => match verbose {
                0 => return,
                1 => EnvFilter::new("keel=debug"),
                _ => EnvFilter::new("keel=trace"),
            },
        };
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_level(true),
            )
            .with(filter)
            .init();
    });
}

/// Exit status for a failed command: 1 when the invoked logic failed, 2 otherwise.
fn failure_status(error: &anyhow::Error) -> u8 {
    match error.downcast_ref::<RuntimeError>() {
        Some(RuntimeError::Invocation(_)) => 1,
        _ => 2,
    }
}

fn report(choice: termcolor::ColorChoice, error: &anyhow::Error) {
    let mut out = output::StyledOutput::new(choice);
    out.stderr_error("error");
    out.stderr_plain(&format!(": {:#}\n", error));

    let mut cause = error
        .downcast_ref::<RuntimeError>()
        .and_then(RuntimeError::as_failure)
        .and_then(|failure| failure.cause());
    while let Some(failure) = cause {
        out.stderr_plain(&format!("  caused by: {}\n", failure));
        cause = failure.cause();
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let choice = output::resolve_color_choice(cli.color.as_deref());

    let result = match cli.command {
        Commands::Run {
            paths,
            skip_unavailable,
            no_verify,
            name,
            args,
        } => commands::run::execute(commands::run::RunArgs {
            paths,
            skip_unavailable,
            no_verify,
            name,
            args,
        }),
        Commands::Locate {
            paths,
            skip_unavailable,
            simple_name,
        } => commands::locate::execute(
            commands::locate::LocateArgs {
                paths,
                skip_unavailable,
                simple_name,
            },
            choice,
        ),
        Commands::Inspect { file } => {
            commands::inspect::execute(commands::inspect::InspectArgs { file }, choice)
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(choice, &e);
            ExitCode::from(failure_status(&e))
        }
    }
}
