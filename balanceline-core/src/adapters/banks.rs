//! Built-in bank grammars
//!
//! Row texts are the extracted cells joined by tabs, so every regex below
//! spells out the column boundaries with `\t`.

use crate::domain::{BankGrammar, NumberFormat, RowKind, RowPattern};

/// First Meridian Bank (US layout)
///
/// `MM/DD/YYYY` dates, `1,234.56` amounts, one signed amount column
/// followed by the running balance.
pub fn first_meridian() -> BankGrammar {
    const DATE: &str = r"\d{2}/\d{2}/\d{4}";
    const AMOUNT: &str = r"\(?-?\$?[\d,]+\.\d{2}\)?(?: ?(?:CR|DR))?-?";

    BankGrammar {
        bank_id: "first-meridian".to_string(),
        display_name: "First Meridian Bank".to_string(),
        date_formats: vec!["%m/%d/%Y".to_string(), "%m/%d/%y".to_string()],
        number_format: NumberFormat::us(),
        patterns: vec![
            RowPattern::new("bank-name", RowKind::Header, r"FIRST MERIDIAN BANK.*"),
            RowPattern::new(
                "column-header",
                RowKind::Header,
                r"Date\tDescription\tAmount\tBalance",
            ),
            RowPattern::new(
                "account-number",
                RowKind::AccountInfo,
                r"Account (?:Number|No\.?)\t(?P<account>[*Xx\d -]+)",
            ),
            RowPattern::new(
                "statement-period",
                RowKind::Period,
                format!(r"Statement Period\t(?P<start>{DATE})\s*-\s*(?P<end>{DATE})"),
            ),
            RowPattern::new(
                "beginning-balance",
                RowKind::OpeningBalance,
                format!(r"(?:Beginning Balance|Balance Brought Forward)\t(?P<balance>{AMOUNT})"),
            ),
            RowPattern::new(
                "ending-balance",
                RowKind::ClosingBalance,
                format!(r"(?:Ending Balance|Balance Carried Forward)\t(?P<balance>{AMOUNT})"),
            ),
            RowPattern::new(
                "page-subtotal",
                RowKind::PageSubtotal,
                format!(r"(?:{DATE}\t)?(?:Page )?Subtotal(?:\t{AMOUNT})+"),
            ),
            RowPattern::new("page-number", RowKind::Footer, r"Page \d+ of \d+"),
            RowPattern::new(
                "totals",
                RowKind::Footer,
                format!(r"Total (?:Debits|Credits)\t{AMOUNT}"),
            ),
            RowPattern::new(
                "transaction",
                RowKind::Transaction,
                format!(
                    r"(?P<date>{DATE})\t(?P<description>[^\t]+)\t(?P<amount>{AMOUNT})(?:\t(?P<balance>{AMOUNT}))?"
                ),
            ),
            RowPattern::new("wrapped-description", RowKind::Continuation, r"[^\d\t][^\t]*"),
        ],
    }
}

/// Nordbank (European layout)
///
/// `DD.MM.YYYY` dates (booking lines may omit the year), `1.234,56`
/// amounts. Debits and credits sit in separate columns; debits carry a
/// trailing minus, as do overdrawn balances.
pub fn nordbank() -> BankGrammar {
    const DATE: &str = r"\d{2}\.\d{2}\.(?:\d{4})?";
    const NUMBER: &str = r"[\d.]+,\d{2}";

    BankGrammar {
        bank_id: "nordbank".to_string(),
        display_name: "Nordbank".to_string(),
        date_formats: vec!["%d.%m.%Y".to_string(), "%d.%m.".to_string()],
        number_format: NumberFormat::european(),
        patterns: vec![
            RowPattern::new("bank-name", RowKind::Header, r"NORDBANK.*"),
            RowPattern::new(
                "column-header",
                RowKind::Header,
                r"Date\tText\tDebit\tCredit\tBalance",
            ),
            RowPattern::new(
                "iban",
                RowKind::AccountInfo,
                r"IBAN\t(?P<account>[A-Z]{2}\d{2}[\d ]+)",
            ),
            RowPattern::new(
                "period",
                RowKind::Period,
                r"Period\t(?P<start>\d{2}\.\d{2}\.\d{4})\s*-\s*(?P<end>\d{2}\.\d{2}\.\d{4})",
            ),
            RowPattern::new(
                "opening",
                RowKind::OpeningBalance,
                format!(r"Opening balance\t(?P<balance>{NUMBER}-?)"),
            ),
            RowPattern::new(
                "closing",
                RowKind::ClosingBalance,
                format!(r"Closing balance\t(?P<balance>{NUMBER}-?)"),
            ),
            RowPattern::new(
                "carried-over",
                RowKind::PageSubtotal,
                format!(r"Carried over\t{NUMBER}-?"),
            ),
            RowPattern::new("page-number", RowKind::Footer, r"Page \d+/\d+"),
            RowPattern::new(
                "booking",
                RowKind::Transaction,
                format!(
                    r"(?P<date>{DATE})\t(?P<description>[^\t]+)\t(?:(?P<debit>{NUMBER})-|(?P<credit>{NUMBER}))\t(?P<balance>{NUMBER}-?)"
                ),
            ),
            RowPattern::new("booking-text", RowKind::Continuation, r"[^\d\t][^\t]*"),
        ],
    }
}

/// Every grammar that ships with the crate
pub fn builtin_grammars() -> Vec<BankGrammar> {
    vec![first_meridian(), nordbank()]
}
