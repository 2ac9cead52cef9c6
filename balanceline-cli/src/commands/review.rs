//! Review command - settle rows held back as possible duplicates

use anyhow::Result;
use clap::Subcommand;

use super::{get_context, parse_id};
use crate::output::{create_table, format_amount, success};
use balanceline_core::services::ReviewDecision;

#[derive(Subcommand)]
pub enum ReviewCommands {
    /// List pending review items
    List {
        /// Only items of this batch
        #[arg(long)]
        batch_id: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Keep the row as a separate transaction
    Accept {
        batch_id: String,
        fingerprint: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Treat the row as the transaction it matched and undo its balance effect
    Reject {
        batch_id: String,
        fingerprint: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(command: ReviewCommands) -> Result<()> {
    match command {
        ReviewCommands::List { batch_id, json } => run_list(batch_id, json),
        ReviewCommands::Accept {
            batch_id,
            fingerprint,
            json,
        } => run_resolve(batch_id, fingerprint, ReviewDecision::Accept, json),
        ReviewCommands::Reject {
            batch_id,
            fingerprint,
            json,
        } => run_resolve(batch_id, fingerprint, ReviewDecision::Reject, json),
    }
}

fn run_list(batch_id: Option<String>, json: bool) -> Result<()> {
    let ctx = get_context("review list")?;
    let batch_id = batch_id
        .as_deref()
        .map(|id| parse_id(id, "batch"))
        .transpose()?;
    let items = ctx.review_service.pending(batch_id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }
    if items.is_empty() {
        println!("Nothing to review.");
        return Ok(());
    }

    let mut table = create_table();
    table.set_header(vec!["Batch", "Fingerprint", "Date", "Description", "Amount", "Matched"]);
    for item in items {
        table.add_row(vec![
            item.batch_id.to_string(),
            item.fingerprint,
            item.raw.date.to_string(),
            item.raw.description,
            format_amount(item.raw.amount),
            item.matched_transaction_id
                .map(|id| id.to_string())
                .unwrap_or_default(),
        ]);
    }
    println!("{}", table);
    Ok(())
}

fn run_resolve(
    batch_id: String,
    fingerprint: String,
    decision: ReviewDecision,
    json: bool,
) -> Result<()> {
    let ctx = get_context("review resolve")?;
    let batch_id = parse_id(&batch_id, "batch")?;
    let item = ctx
        .review_service
        .resolve(batch_id, fingerprint.trim(), decision)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&item)?);
    } else {
        success(&format!("{} is now {}", item.fingerprint, item.status.as_str()));
    }
    Ok(())
}
