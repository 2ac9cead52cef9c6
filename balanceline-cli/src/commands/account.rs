//! Account command - create and list accounts

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use dialoguer::Input;
use rust_decimal::Decimal;

use super::get_context;
use crate::output::{create_table, format_amount};
use balanceline_core::services::NewAccount;

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Create an account to import statements into
    New {
        /// Account name
        #[arg(long)]
        name: Option<String>,
        /// Account number as printed on statements (masked is fine)
        #[arg(long)]
        number: Option<String>,
        /// ISO currency code
        #[arg(long, default_value = "USD")]
        currency: String,
        /// Starting balance
        #[arg(long)]
        balance: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List accounts with their current balance
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(command: AccountCommands) -> Result<()> {
    match command {
        AccountCommands::New {
            name,
            number,
            currency,
            balance,
            json,
        } => run_new(name, number, currency, balance, json),
        AccountCommands::List { json } => run_list(json),
    }
}

fn run_new(
    name: Option<String>,
    number: Option<String>,
    currency: String,
    balance: Option<String>,
    json: bool,
) -> Result<()> {
    let ctx = get_context("account new")?;

    let name = match name {
        Some(n) => n,
        None => Input::new().with_prompt("Account name").interact_text()?,
    };
    let opening_balance = balance
        .map(|b| b.trim().parse::<Decimal>())
        .transpose()
        .context("Invalid balance amount")?;

    let account = ctx.account_service.create(NewAccount {
        name,
        account_number: number,
        currency: Some(currency),
        opening_balance,
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&account)?);
    } else {
        println!("{}", "Account created".green());
        println!("  ID: {}", account.id);
        println!("  Name: {}", account.name);
        if let Some(number) = &account.account_number {
            println!("  Number: {}", number);
        }
        if let Some(balance) = account.balance {
            println!("  Balance: {} {}", format_amount(balance), account.currency);
        }
    }
    Ok(())
}

fn run_list(json: bool) -> Result<()> {
    let ctx = get_context("account list")?;
    let accounts = ctx.account_service.list()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&accounts)?);
        return Ok(());
    }
    if accounts.is_empty() {
        println!("No accounts. Create one with `bl account new`.");
        return Ok(());
    }

    let mut table = create_table();
    table.set_header(vec!["ID", "Name", "Number", "Currency", "Balance"]);
    for account in accounts {
        table.add_row(vec![
            account.id.to_string(),
            account.name,
            account.account_number.unwrap_or_default(),
            account.currency,
            account.balance.map(format_amount).unwrap_or_else(|| "-".to_string()),
        ]);
    }
    println!("{}", table);
    Ok(())
}
