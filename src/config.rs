// ⚙️ Pipeline configuration - every knob has a default, TOML overrides

use crate::error::LedgerError;
use anyhow::Context;
use bigdecimal::{BigDecimal, Signed};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Column labels in the fixed order the statements print them.
pub const DEFAULT_HEADER: [&str; 6] = ["Date", "Type", "Description", "Paid in", "Paid out", "Balance"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// First-cell label that marks a repeated header row
    pub header_label: String,

    /// chrono formats tried in order for the Date column
    pub date_formats: Vec<String>,

    /// Symbols stripped from amount cells before parsing
    pub currency_symbols: Vec<String>,

    /// Filename convention for the account id; exactly two capture groups
    pub account_pattern: String,

    /// File-name pattern used when enumerating an input folder
    pub document_pattern: String,

    /// Largest |delta| still considered consistent
    pub tolerance: BigDecimal,

    /// Worker threads for per-document processing
    pub workers: usize,

    /// Per-document time limit; `None` waits forever
    pub document_timeout_secs: Option<u64>,

    pub output: OutputNames,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputNames {
    pub combined_csv: String,
    pub combined_xlsx: String,
    pub validation_csv: String,
    /// Write the spreadsheet mirror (ignored without the `xlsx` feature)
    pub write_xlsx: bool,
}

impl Default for OutputNames {
    fn default() -> Self {
        OutputNames {
            combined_csv: "all_transactions_combined.csv".to_string(),
            combined_xlsx: "all_transactions_combined.xlsx".to_string(),
            validation_csv: "balance_validation.csv".to_string(),
            write_xlsx: true,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            header_label: "Date".to_string(),
            date_formats: vec!["%d %b %Y".to_string(), "%d %B %Y".to_string()],
            currency_symbols: vec!["£".to_string(), "$".to_string(), "€".to_string()],
            account_pattern: r"--(\d+)-(\d+)--".to_string(),
            document_pattern: "*.pdf".to_string(),
            tolerance: default_tolerance(),
            workers: default_workers(),
            document_timeout_secs: Some(120),
            output: OutputNames::default(),
        }
    }
}

fn default_tolerance() -> BigDecimal {
    BigDecimal::new(1.into(), 2)
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl PipelineConfig {
    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml(source: &str) -> Result<Self, LedgerError> {
        let config: PipelineConfig =
            toml::from_str(source).map_err(|e| LedgerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, LedgerError> {
        let source = fs::read_to_string(path)
            .with_context(|| format!("read {}", path.display()))
            .map_err(|e| LedgerError::Config(format!("{:#}", e)))?;
        Self::from_toml(&source)
    }

    pub fn to_toml(&self) -> Result<String, LedgerError> {
        toml::to_string_pretty(self).map_err(|e| LedgerError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.header_label.trim().is_empty() {
            return Err(LedgerError::Config("header_label must not be empty".to_string()));
        }
        if self.date_formats.is_empty() {
            return Err(LedgerError::Config("at least one date format is required".to_string()));
        }
        if self.workers == 0 {
            return Err(LedgerError::Config("workers must be at least 1".to_string()));
        }
        if self.tolerance.is_negative() {
            return Err(LedgerError::Config("tolerance must not be negative".to_string()));
        }
        Ok(())
    }
}
