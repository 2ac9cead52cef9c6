//! Import command - import a password-protected statement archive

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use colored::Colorize;
use dialoguer::Password;
use indicatif::{ProgressBar, ProgressStyle};
use zeroize::Zeroizing;

use super::{get_context, parse_id};
use crate::output::{create_table, format_amount, warning};
use balanceline_core::adapters::EnvSecretProvider;
use balanceline_core::domain::result::SecretError;
use balanceline_core::ports::{ProgressObserver, SecretProvider, SecretRequest};
use balanceline_core::services::{ImportRequest, ImportResult};
use balanceline_core::{ImportMode, ImportState, OperationResult};

/// Hidden interactive password entry; nothing is kept after the prompt
struct PromptSecretProvider;

impl SecretProvider for PromptSecretProvider {
    fn archive_password(&self, request: &SecretRequest) -> Result<Zeroizing<String>, SecretError> {
        if atty::isnt(atty::Stream::Stdin) {
            return Err(SecretError::Unavailable(
                "no terminal to prompt on; use --password-env".to_string(),
            ));
        }
        let prompt = match &request.source_name {
            Some(name) => format!("Password for {}", name),
            None => "Archive password".to_string(),
        };
        Password::new()
            .with_prompt(prompt)
            .interact()
            .map(Zeroizing::new)
            .map_err(|_| SecretError::Cancelled)
    }
}

/// Spinner fed by state transitions
///
/// Stays silent until decryption is over so it never draws over the
/// password prompt.
struct Spinner(ProgressBar);

impl Spinner {
    fn new(hidden: bool) -> Self {
        let bar = if hidden {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
                bar.set_style(style);
            }
            bar
        };
        Self(bar)
    }
}

impl ProgressObserver for Spinner {
    fn on_transition(&self, _from: ImportState, to: ImportState) {
        match to {
            ImportState::Idle | ImportState::Decrypting => {}
            ImportState::Committed | ImportState::Failed => self.0.finish_and_clear(),
            stage => {
                self.0.enable_steady_tick(Duration::from_millis(100));
                self.0.set_message(format!("{}...", stage));
            }
        }
    }
}

pub fn run(
    archive: PathBuf,
    account_id: String,
    bank: String,
    preview: bool,
    best_effort: bool,
    password_env: Option<String>,
    json: bool,
) -> Result<()> {
    let ctx = get_context("import")?;
    let account_id = parse_id(&account_id, "account")?;

    let bytes = std::fs::read(&archive)
        .with_context(|| format!("Failed to read {}", archive.display()))?;
    let secrets: Arc<dyn SecretProvider> = match password_env {
        Some(var) => Arc::new(EnvSecretProvider::new(var)),
        None => Arc::new(PromptSecretProvider),
    };
    let ctx = ctx.with_secret_provider(secrets);

    let mut request = ImportRequest::new(bytes, account_id, bank);
    if let Some(name) = archive.file_name() {
        request = request.with_source_name(name.to_string_lossy());
    }
    if best_effort {
        request = request.with_mode(ImportMode::BestEffort);
    }
    if preview {
        request = request.preview();
    }

    let spinner = Spinner::new(json || atty::isnt(atty::Stream::Stderr));
    let result = ctx.import_service.import_with_progress(request, &spinner);
    spinner.0.finish_and_clear();

    if json {
        let failed = result.is_err();
        let envelope: OperationResult<ImportResult> = result.into();
        println!("{}", serde_json::to_string_pretty(&envelope)?);
        if failed {
            anyhow::bail!("import failed");
        }
        return Ok(());
    }

    match result {
        Ok(result) => {
            print_result(&result);
            Ok(())
        }
        Err(e) => {
            anyhow::bail!("Import failed while {} [{}]: {}", e.stage, e.kind(), e.detail())
        }
    }
}

fn print_result(result: &ImportResult) {
    if result.preview {
        println!("{}", "Preview (nothing was written)".yellow().bold());
    } else {
        println!("{}", "Statement imported".green().bold());
    }
    println!();

    let mut table = create_table();
    table.add_row(vec!["Batch", &result.batch_id.to_string()]);
    table.add_row(vec![
        "Period",
        &format!("{} to {}", result.summary.period_start, result.summary.period_end),
    ]);
    table.add_row(vec!["New", &result.committed_count.to_string()]);
    table.add_row(vec!["Duplicates", &result.duplicate_count.to_string()]);
    table.add_row(vec!["Needs review", &result.manual_review_count.to_string()]);
    table.add_row(vec!["Statement change", &format_amount(result.statement_delta)]);
    table.add_row(vec!["Applied change", &format_amount(result.applied_delta)]);
    table.add_row(vec!["New balance", &format_amount(result.new_account_balance)]);
    println!("{}", table);

    if !result.row_errors.is_empty() {
        println!();
        warning(&format!("{} row(s) skipped:", result.row_errors.len()));
        for error in &result.row_errors {
            println!("  {}", error);
        }
    }

    if !result.review_items.is_empty() {
        println!();
        warning("Possible duplicates held for review:");
        let mut table = create_table();
        table.set_header(vec!["Fingerprint", "Date", "Description", "Amount"]);
        for item in &result.review_items {
            table.add_row(vec![
                item.fingerprint.clone(),
                item.raw.date.to_string(),
                item.raw.description.clone(),
                format_amount(item.raw.amount),
            ]);
        }
        println!("{}", table);
        if !result.preview {
            println!("Resolve with `bl review accept|reject {} <fingerprint>`", result.batch_id);
        }
    }
}
