mod commands;
mod helpers;

use clap::Parser;
use edd_core::domain::EddError;

pub fn run_from_env() -> i32 {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match run(args) {
        Ok(code) => code,
        Err(error) => {
            let edd_error = error.as_edd_error();
            eprintln!("{}", edd_error.diagnostic_line());
            if let Some(summary_line) = edd_error.fatal_exit_line() {
                eprintln!("{}", summary_line);
            }
            edd_error.exit_code()
        }
    }
}

pub fn run<I, S>(args: I) -> Result<i32, CliError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let full_args = std::iter::once("fit-edd".to_string())
        .chain(args.into_iter().map(Into::into))
        .collect::<Vec<_>>();
    parse_and_dispatch(full_args)
}

fn parse_and_dispatch(args: Vec<String>) -> Result<i32, CliError> {
    match Cli::try_parse_from(&args) {
        Ok(cli) => {
            helpers::init_logging(cli.verbose);
            dispatch_parsed(cli.command)
        }
        Err(err) => match err.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                print!("{}", err);
                Ok(0)
            }
            _ => Err(CliError::Usage(err.to_string())),
        },
    }
}

#[derive(Parser)]
#[command(
    name = "fit-edd",
    version,
    about = "Fit EDD detector scans and aggregate per-peak results"
)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(clap::Subcommand)]
enum CliCommand {
    /// Fit every selected scan and write results to the output file
    Fit(commands::FitArgs),
    /// Check a configuration and list the scans it selects
    Validate(commands::ValidateArgs),
}

fn dispatch_parsed(command: CliCommand) -> Result<i32, CliError> {
    match command {
        CliCommand::Fit(args) => commands::run_fit_command(args),
        CliCommand::Validate(args) => commands::run_validate_command(args),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    Compute(EddError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<EddError> for CliError {
    fn from(error: EddError) -> Self {
        Self::Compute(error)
    }
}

impl CliError {
    fn as_edd_error(&self) -> EddError {
        match self {
            Self::Usage(message) => EddError::configuration("INPUT.CLI_USAGE", message.clone()),
            Self::Compute(error) => error.clone(),
            Self::Internal(error) => EddError::internal("RUN.CLI", format!("{error:#}")),
        }
    }
}
