pub mod commands;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use claimflow_core::config::{AppConfig, LoadOptions, LogFormat};
use tracing::Level;

use commands::workflow::{DecideArgs, ListArgs, SubmitArgs};

#[derive(Debug, Parser)]
#[command(
    name = "claimflow",
    about = "Claimflow expense approval CLI",
    long_about = "Submit expenses, walk approval chains, and operate the Claimflow database.",
    after_help = "Examples:\n  claimflow migrate\n  claimflow seed\n  claimflow submit --employee usr-demo-employee --amount 120.50 --currency USD --category meals --description \"Client lunch downtown\"\n  claimflow decide --expense <id> --approver usr-demo-manager --action approve\n  claimflow doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo company, its users and tiered approval rules (idempotent)")]
    Seed,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config, DB connectivity and schema state")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Submit an expense and build its approval chain")]
    Submit(SubmitArgs),
    #[command(about = "Approve or reject the open step of an expense")]
    Decide(DecideArgs),
    #[command(about = "Show the approval chain of an expense with the current step marked")]
    Chain {
        #[arg(long)]
        expense: String,
    },
    #[command(about = "List in-review expenses waiting on an approver")]
    Inbox {
        #[arg(long)]
        approver: String,
    },
    #[command(about = "List expenses of an employee or a company, newest first")]
    Expenses(ListArgs),
}

/// Installs the subscriber on stderr so stdout stays one JSON outcome per command.
fn init_logging(config: &AppConfig) {
    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    if let Ok(config) = AppConfig::load(LoadOptions::default()) {
        init_logging(&config);
    }

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => commands::CommandResult { exit_code: 0, output: commands::config::run() },
        Command::Doctor { json } => {
            let (output, passed) = commands::doctor::run(json);
            commands::CommandResult { exit_code: if passed { 0 } else { 7 }, output }
        }
        Command::Submit(args) => commands::workflow::submit(args),
        Command::Decide(args) => commands::workflow::decide(args),
        Command::Chain { expense } => commands::workflow::chain(expense),
        Command::Inbox { approver } => commands::workflow::inbox(approver),
        Command::Expenses(args) => commands::workflow::expenses(args),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
