//! Configuration management
//!
//! Settings live in `settings.json` in the data directory:
//! ```json
//! {
//!   "import": { "balanceTolerance": "0.005", "dateWindowDays": 2, "mode": "strict" },
//!   "bankGrammars": [ { "bankId": "...", ... } ]
//! }
//! ```
//! Fields this crate does not manage are preserved on save.

use std::collections::HashMap;
use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::adapters::{DEFAULT_CELL_GAP, DEFAULT_ROW_TOLERANCE};
use crate::domain::result::{Error, Result};
use crate::domain::{BankGrammar, ImportMode};
use crate::services::{DEFAULT_DATE_WINDOW_DAYS, DEFAULT_TOLERANCE};

const SETTINGS_FILE: &str = "settings.json";
const MAX_DATE_WINDOW_DAYS: u32 = 31;

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    import: ImportSettings,
    #[serde(default)]
    bank_grammars: Vec<BankGrammar>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

fn default_tolerance() -> Decimal {
    DEFAULT_TOLERANCE
}

fn default_date_window_days() -> u32 {
    DEFAULT_DATE_WINDOW_DAYS
}

fn default_row_tolerance() -> f64 {
    DEFAULT_ROW_TOLERANCE
}

fn default_cell_gap() -> f64 {
    DEFAULT_CELL_GAP
}

/// Tunables of the import pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSettings {
    /// Largest difference tolerated between a declared and a computed balance
    #[serde(default = "default_tolerance")]
    pub balance_tolerance: Decimal,
    /// Days either side of a row's date searched for near duplicates
    #[serde(default = "default_date_window_days")]
    pub date_window_days: u32,
    #[serde(default)]
    pub mode: ImportMode,
    /// Vertical distance (points) within which text runs share a row
    #[serde(default = "default_row_tolerance")]
    pub row_tolerance: f64,
    /// Horizontal gap (points) above which adjacent runs become separate cells
    #[serde(default = "default_cell_gap")]
    pub cell_gap: f64,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            balance_tolerance: DEFAULT_TOLERANCE,
            date_window_days: DEFAULT_DATE_WINDOW_DAYS,
            mode: ImportMode::default(),
            row_tolerance: DEFAULT_ROW_TOLERANCE,
            cell_gap: DEFAULT_CELL_GAP,
            other: HashMap::new(),
        }
    }
}

impl ImportSettings {
    pub fn validate(&self) -> Result<()> {
        if self.balance_tolerance.is_sign_negative() || self.balance_tolerance >= Decimal::ONE {
            return Err(Error::config(format!(
                "import.balanceTolerance must be >= 0 and < 1, got {}",
                self.balance_tolerance
            )));
        }
        if self.date_window_days > MAX_DATE_WINDOW_DAYS {
            return Err(Error::config(format!(
                "import.dateWindowDays must be between 0 and {}, got {}",
                MAX_DATE_WINDOW_DAYS, self.date_window_days
            )));
        }
        if !self.row_tolerance.is_finite() || self.row_tolerance <= 0.0 {
            return Err(Error::config("import.rowTolerance must be a positive number"));
        }
        if !self.cell_gap.is_finite() || self.cell_gap < 0.0 {
            return Err(Error::config("import.cellGap must not be negative"));
        }
        Ok(())
    }
}

/// Balanceline configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub import: ImportSettings,
    /// User grammars, registered alongside the built-in ones
    pub bank_grammars: Vec<BankGrammar>,
    // Keep the raw settings for preservation when saving
    _raw_settings: SettingsFile,
}

impl Config {
    /// Load config from the data directory
    ///
    /// A missing file means defaults. The import mode can be overridden
    /// with BALANCELINE_IMPORT_MODE (`strict` / `best-effort`).
    pub fn load(data_dir: &Path) -> Result<Self> {
        let settings_path = data_dir.join(SETTINGS_FILE);

        let raw: SettingsFile = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)?;
            serde_json::from_str(&content).map_err(|e| {
                Error::config(format!("{}: {}", settings_path.display(), e))
            })?
        } else {
            SettingsFile::default()
        };

        let mut import = raw.import.clone();
        if let Ok(value) = std::env::var("BALANCELINE_IMPORT_MODE") {
            import.mode = ImportMode::parse(&value).ok_or_else(|| {
                Error::config(format!(
                    "BALANCELINE_IMPORT_MODE must be 'strict' or 'best-effort', got '{}'",
                    value
                ))
            })?;
        }
        import.validate()?;

        let mut seen = std::collections::HashSet::new();
        for grammar in &raw.bank_grammars {
            if !seen.insert(grammar.bank_id.as_str()) {
                return Err(Error::config(format!(
                    "bank grammar '{}' is defined more than once",
                    grammar.bank_id
                )));
            }
        }

        Ok(Self {
            import,
            bank_grammars: raw.bank_grammars.clone(),
            _raw_settings: raw,
        })
    }

    /// Save config to the data directory, preserving fields it does not manage
    pub fn save(&self, data_dir: &Path) -> Result<()> {
        self.import.validate()?;
        let settings_path = data_dir.join(SETTINGS_FILE);

        let mut settings = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)?;
            serde_json::from_str::<SettingsFile>(&content)
                .unwrap_or_else(|_| self._raw_settings.clone())
        } else {
            self._raw_settings.clone()
        };

        settings.import = self.import.clone();
        settings.bank_grammars = self.bank_grammars.clone();

        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(&settings_path, content)?;
        Ok(())
    }
}
