// ffbrecon - harvest transaction reconciliation from the command line

mod exit_codes;
mod recon;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use exit_codes::EXIT_SUCCESS;
use recon::ReconCommands;

#[derive(Parser)]
#[command(name = "ffbrecon")]
#[command(about = "Reconcile Kerani harvest entries against Mandor/Asisten verifications")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Log engine progress (debug level) to stderr
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: ReconCommands,
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("GIT_COMMIT_HASH"), ")",
        "\nengine:  ffb-recon ", env!("CARGO_PKG_VERSION"),
        "\ntarget:  ", env!("TARGET"),
    )
}

/// Install the stderr subscriber. `-v` wins over `RUST_LOG`; without either
/// only warnings are shown. The `log` records emitted by the engine are
/// bridged through tracing-subscriber's log compatibility layer.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .try_init()
        .ok();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = recon::cmd_recon(cli.command);

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), hint: None }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<ffb_recon::ReconError> for CliError {
    fn from(err: ffb_recon::ReconError) -> Self {
        Self::new(exit_codes::recon_exit_code(&err), err.to_string())
    }
}
