//! Shared fixtures: statement PDFs, encrypted archives and a scratch ledger

#![allow(dead_code)]

use std::io::{Cursor, Write};

use chrono::NaiveDate;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use rust_decimal::Decimal;
use tempfile::TempDir;
use zip::unstable::write::FileOptionsExt;
use zip::write::SimpleFileOptions;
use zip::{AesMode, ZipWriter};

use balanceline_core::domain::Account;
use balanceline_core::services::{EntryPoint, NewAccount};
use balanceline_core::BalancelineContext;

pub const PASSWORD: &str = "meridian-2024";
pub const BANK: &str = "first-meridian";

/// x position of each cell, by number of cells in the row
fn columns(cells: usize) -> &'static [i64] {
    match cells {
        1 => &[40],
        2 => &[40, 330],
        3 => &[40, 110, 330],
        _ => &[40, 110, 330, 430],
    }
}

const TOP: i64 = 800;
const LINE: i64 = 16;

pub fn date(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, month, day).unwrap()
}

pub fn cents(value: i64) -> Decimal {
    Decimal::new(value, 2)
}

/// `-1,234.56` style
pub fn us_amount(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    let whole = (abs / 100).to_string();
    let mut grouped = String::new();
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    format!("{}{}.{:02}", sign, grouped, abs % 100)
}

/// A First Meridian statement, laid out the way the bank prints it
#[derive(Debug, Clone)]
pub struct Statement {
    pub account_number: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub opening: i64,
    pub transactions: Vec<(NaiveDate, String, i64)>,
    pub rows_per_page: usize,
    pub row_balances: bool,
    /// Added to the printed closing balance
    pub closing_error: i64,
    /// Transaction index whose printed balance is off by one cent
    pub misprinted_balance: Option<usize>,
    /// Extra raw rows inserted after the transaction at that index
    pub extra_rows: Vec<(usize, Vec<String>)>,
}

impl Statement {
    pub fn new(period_start: NaiveDate, period_end: NaiveDate, opening: i64) -> Self {
        Self {
            account_number: "****4321".to_string(),
            period_start,
            period_end,
            opening,
            transactions: Vec::new(),
            rows_per_page: 40,
            row_balances: true,
            closing_error: 0,
            misprinted_balance: None,
            extra_rows: Vec::new(),
        }
    }

    pub fn tx(mut self, date: NaiveDate, description: &str, amount: i64) -> Self {
        self.transactions.push((date, description.to_string(), amount));
        self
    }

    pub fn rows_per_page(mut self, rows: usize) -> Self {
        self.rows_per_page = rows.max(1);
        self
    }

    pub fn closing(&self) -> i64 {
        self.opening + self.transactions.iter().map(|(_, _, a)| a).sum::<i64>()
    }

    pub fn delta(&self) -> i64 {
        self.closing() - self.opening
    }

    fn day(d: NaiveDate) -> String {
        d.format("%m/%d/%Y").to_string()
    }

    /// Rows of cells, page by page
    pub fn pages(&self) -> Vec<Vec<Vec<String>>> {
        let mut body: Vec<Vec<String>> = Vec::new();
        let mut running = self.opening;
        for (i, (d, description, amount)) in self.transactions.iter().enumerate() {
            running += amount;
            let mut row = vec![Self::day(*d), description.clone(), us_amount(*amount)];
            if self.row_balances {
                let printed = if self.misprinted_balance == Some(i) {
                    running + 1
                } else {
                    running
                };
                row.push(us_amount(printed));
            }
            body.push(row);
            for (_, extra) in self.extra_rows.iter().filter(|(at, _)| *at == i) {
                body.push(extra.clone());
            }
        }

        let chunks: Vec<Vec<Vec<String>>> = if body.is_empty() {
            vec![Vec::new()]
        } else {
            body.chunks(self.rows_per_page).map(|c| c.to_vec()).collect()
        };
        let page_count = chunks.len();

        chunks
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| {
                let mut rows: Vec<Vec<String>> = Vec::new();
                if i == 0 {
                    rows.push(vec!["FIRST MERIDIAN BANK".to_string()]);
                    rows.push(vec!["Account Number".to_string(), self.account_number.clone()]);
                    rows.push(vec![
                        "Statement Period".to_string(),
                        format!(
                            "{} - {}",
                            Self::day(self.period_start),
                            Self::day(self.period_end)
                        ),
                    ]);
                }
                rows.push(
                    ["Date", "Description", "Amount", "Balance"]
                        .iter()
                        .map(|s| s.to_string())
                        .collect(),
                );
                if i == 0 {
                    rows.push(vec!["Beginning Balance".to_string(), us_amount(self.opening)]);
                }
                rows.extend(chunk);
                if i + 1 == page_count {
                    rows.push(vec![
                        "Ending Balance".to_string(),
                        us_amount(self.closing() + self.closing_error),
                    ]);
                }
                rows.push(vec![format!("Page {} of {}", i + 1, page_count)]);
                rows
            })
            .collect()
    }

    pub fn pdf(&self) -> Vec<u8> {
        statement_pdf(&self.pages())
    }

    /// AES-256 encrypted zip holding the statement PDF
    pub fn archive(&self, password: &str) -> Vec<u8> {
        encrypted_zip(&[("statement.pdf", &self.pdf())], password)
    }
}

/// Ten transactions over March 2024, opening at 1,250.00, closing at 3,784.00
pub fn march_statement() -> Statement {
    Statement::new(date(3, 1), date(3, 31), 125000)
        .tx(date(3, 1), "PAYROLL DEPOSIT", 200000)
        .tx(date(3, 2), "GROCERY MART #12", -8417)
        .tx(date(3, 4), "ELECTRIC UTILITY", -12045)
        .tx(date(3, 5), "COFFEE CORNER", -450)
        .tx(date(3, 8), "RENT PAYMENT", -145000)
        .tx(date(3, 11), "ONLINE TRANSFER IN", 30000)
        .tx(date(3, 15), "PAYROLL DEPOSIT", 200000)
        .tx(date(3, 18), "GAS STATION 88", -4520)
        .tx(date(3, 22), "RESTAURANT LUNA", -6280)
        .tx(date(3, 28), "INTEREST PAYMENT", 112)
}

fn text_at(x: i64, y: i64, text: &str) -> Vec<Operation> {
    vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), 10.into()]),
        Operation::new("Td", vec![x.into(), y.into()]),
        Operation::new("Tj", vec![Object::string_literal(text)]),
        Operation::new("ET", vec![]),
    ]
}

/// One PDF page per entry; each column is drawn top to bottom before the
/// next, so rows only exist after the extractor regroups them
pub fn statement_pdf(pages: &[Vec<Vec<String>>]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for rows in pages {
        let mut operations = Vec::new();
        for column in 0..4 {
            for (r, row) in rows.iter().enumerate() {
                if let Some(cell) = row.get(column) {
                    let x = columns(row.len())[column];
                    let y = TOP - LINE * r as i64;
                    operations.extend(text_at(x, y, cell));
                }
            }
        }
        let page_id = add_page(&mut doc, pages_id, operations);
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

fn add_page(doc: &mut Document, pages_id: ObjectId, operations: Vec<Operation>) -> ObjectId {
    let content = Content { operations };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
    doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    })
}

pub fn encrypted_zip(entries: &[(&str, &[u8])], password: &str) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        let options =
            SimpleFileOptions::default().with_aes_encryption(AesMode::Aes256, password);
        writer.start_file(*name, options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Legacy ZipCrypto container, as older bank portals still produce
pub fn zipcrypto_zip(name: &str, data: &[u8], password: &str) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().with_deprecated_encryption(password.as_bytes());
    writer.start_file(name, options).unwrap();
    writer.write_all(data).unwrap();
    writer.finish().unwrap().into_inner()
}

/// A fresh data directory with one checking account ending in 4321
pub struct TestLedger {
    pub dir: TempDir,
    pub ctx: BalancelineContext,
    pub account: Account,
}

impl TestLedger {
    pub fn new() -> Self {
        Self::with_opening_balance(None)
    }

    pub fn with_opening_balance(balance: Option<Decimal>) -> Self {
        let dir = TempDir::new().unwrap();
        let ctx = BalancelineContext::new(dir.path(), EntryPoint::Library).unwrap();
        let account = ctx
            .account_service
            .create(NewAccount {
                name: "Checking".to_string(),
                account_number: Some("9876-4321".to_string()),
                currency: Some("usd".to_string()),
                opening_balance: balance,
            })
            .unwrap();
        Self { dir, ctx, account }
    }

    pub fn balance(&self) -> Option<Decimal> {
        self.ctx
            .account_service
            .get(self.account.id)
            .unwrap()
            .balance
    }

    pub fn transaction_count(&self) -> usize {
        use balanceline_core::ports::LedgerRepository;
        self.ctx
            .repository
            .get_transactions(self.account.id)
            .unwrap()
            .len()
    }
}
