//! Balanceline CLI - import password-protected bank statements

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{account, banks, batches, import, logs, review};

/// Balanceline - reconcile bank statements into a local ledger
#[derive(Parser)]
#[command(name = "bl", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage accounts
    Account {
        #[command(subcommand)]
        command: account::AccountCommands,
    },

    /// Import a password-protected statement archive
    Import {
        /// Path to the statement archive (.zip)
        archive: PathBuf,
        /// Account ID to import into
        #[arg(long)]
        account_id: String,
        /// Bank ID (see `bl banks`)
        #[arg(long)]
        bank: String,
        /// Run every check and report, without writing anything
        #[arg(long)]
        preview: bool,
        /// Skip unreadable rows instead of aborting
        #[arg(long)]
        best_effort: bool,
        /// Read the archive password from this environment variable
        #[arg(long)]
        password_env: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List imported statements
    Batches {
        /// Only batches of this account
        #[arg(long)]
        account_id: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show or export the audit trail of one import
    Audit {
        /// Batch ID
        batch_id: String,
        /// Write the records to this CSV file
        #[arg(long)]
        csv: Option<PathBuf>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Resolve rows held back as possible duplicates
    Review {
        #[command(subcommand)]
        command: review::ReviewCommands,
    },

    /// List supported banks
    Banks {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// View and manage the event log
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Account { command } => account::run(command),
        Commands::Import {
            archive,
            account_id,
            bank,
            preview,
            best_effort,
            password_env,
            json,
        } => import::run(archive, account_id, bank, preview, best_effort, password_env, json),
        Commands::Batches { account_id, json } => batches::run_list(account_id, json),
        Commands::Audit {
            batch_id,
            csv,
            json,
        } => batches::run_audit(batch_id, csv, json),
        Commands::Review { command } => review::run(command),
        Commands::Banks { json } => banks::run(json),
        Commands::Logs { command } => logs::run(command),
    }
}
