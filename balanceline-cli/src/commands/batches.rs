//! Batches and audit commands - list imports and inspect what they did

use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};

use super::{get_context, parse_id};
use crate::output::{create_table, format_amount, success};

pub fn run_list(account_id: Option<String>, json: bool) -> Result<()> {
    let ctx = get_context("batches")?;
    let account_id = account_id
        .as_deref()
        .map(|id| parse_id(id, "account"))
        .transpose()?;
    let batches = ctx.batch_service.list(account_id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&batches)?);
        return Ok(());
    }
    if batches.is_empty() {
        println!("No imports yet.");
        return Ok(());
    }

    let mut table = create_table();
    table.set_header(vec![
        "Batch", "Created", "Bank", "Period", "Status", "New", "Dup", "Review", "Applied",
    ]);
    for batch in batches {
        table.add_row(vec![
            batch.id.to_string(),
            batch.created_at.format("%Y-%m-%d %H:%M").to_string(),
            batch.bank_id,
            format!("{} to {}", batch.summary.period_start, batch.summary.period_end),
            batch.status.as_str().to_string(),
            batch.counts.new.to_string(),
            batch.counts.duplicate.to_string(),
            batch.counts.manual_review.to_string(),
            format_amount(batch.applied_delta),
        ]);
    }
    println!("{}", table);
    Ok(())
}

pub fn run_audit(batch_id: String, csv: Option<PathBuf>, json: bool) -> Result<()> {
    let ctx = get_context("audit")?;
    let batch_id = parse_id(&batch_id, "batch")?;

    if let Some(path) = csv {
        let file = File::create(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        let written = ctx.batch_service.export_audit_csv(batch_id, file)?;
        if json {
            println!(
                "{}",
                serde_json::json!({"records": written, "path": path.to_string_lossy()})
            );
        } else {
            success(&format!("Wrote {} audit records to {}", written, path.display()));
        }
        return Ok(());
    }

    let records = ctx.batch_service.audit(batch_id)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    let mut table = create_table();
    table.set_header(vec!["#", "Page", "Date", "Description", "Amount", "Result", "Fingerprint"]);
    for record in records {
        table.add_row(vec![
            record.sequence.to_string(),
            (record.raw.page_index + 1).to_string(),
            record.raw.date.to_string(),
            record.raw.description,
            format_amount(record.raw.amount),
            record.classification.as_str().to_string(),
            record.fingerprint,
        ]);
    }
    println!("{}", table);
    Ok(())
}
