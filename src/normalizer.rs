// 🧹 Record Normalizer - raw rows → typed transaction records
//
// Every step is fault tolerant on its own: a bad amount degrades that one
// field to the missing marker, a bad date drops the row (statements print
// running totals and carried-forward lines without a date).

use crate::config::{PipelineConfig, DEFAULT_HEADER};
use crate::error::LedgerError;
use crate::reader::{RawDocument, RawRow, COLUMNS};
use crate::record::{to_cents, Amount, TransactionRecord};
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::Serialize;
use std::str::FromStr;

const DATE: usize = 0;
const TYPE: usize = 1;
const DESCRIPTION: usize = 2;
const PAID_IN: usize = 3;
const PAID_OUT: usize = 4;
const BALANCE: usize = 5;

// ============================================================================
// NORMALIZATION REPORT
// ============================================================================

/// A cell that failed numeric coercion after cleanup
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldIssue {
    pub original_order: usize,
    pub field: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NormalizationReport {
    pub rows_in: usize,
    pub empty_rows: usize,
    pub undated_rows: usize,
    pub records_out: usize,
    pub field_issues: Vec<FieldIssue>,
}

impl NormalizationReport {
    pub fn summary(&self) -> String {
        format!(
            "{} rows in, {} records out ({} empty, {} undated, {} unparseable amounts)",
            self.rows_in,
            self.records_out,
            self.empty_rows,
            self.undated_rows,
            self.field_issues.len()
        )
    }
}

#[derive(Debug, Clone)]
pub struct Normalized {
    pub records: Vec<TransactionRecord>,
    pub report: NormalizationReport,
}

// ============================================================================
// FIELD PARSERS
// ============================================================================

/// Parse one amount cell.
///
/// Missing, blank and "nan" cells count as zero. Currency symbols and comma
/// grouping are stripped first. Whatever still fails is a `FieldParse` error.
pub fn parse_amount(
    field: &'static str,
    cell: Option<&str>,
    currency_symbols: &[String],
) -> Result<BigDecimal, LedgerError> {
    let raw = cell.map(str::trim).unwrap_or("");
    let raw = if raw.is_empty() || raw.eq_ignore_ascii_case("nan") {
        "0"
    } else {
        raw
    };

    let mut cleaned = raw.replace(',', "");
    for symbol in currency_symbols {
        cleaned = cleaned.replace(symbol.as_str(), "");
    }

    let cleaned = cleaned.trim();
    let parse_error = || LedgerError::FieldParse {
        field,
        value: raw.to_string(),
    };

    if !is_plain_decimal(cleaned) {
        return Err(parse_error());
    }

    BigDecimal::from_str(cleaned)
        .map(|value| to_cents(&value))
        .map_err(|_| parse_error())
}

/// `[+-]digits[.digits]` only. Exponents are rejected: rounding `1e999999999`
/// to cents would materialize every digit.
fn is_plain_decimal(text: &str) -> bool {
    let unsigned = text.strip_prefix(['+', '-']).unwrap_or(text);
    let (units, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());

    !(units.is_empty() && fraction.is_empty()) && all_digits(units) && all_digits(fraction)
}

/// Parse a statement date such as "05 Jan 2024".
pub fn parse_date(cell: Option<&str>, formats: &[String]) -> Result<NaiveDate, LedgerError> {
    let raw = cell.unwrap_or("");
    let text = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    formats
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(&text, format).ok())
        .ok_or_else(|| LedgerError::FieldParse {
            field: "Date",
            value: raw.to_string(),
        })
}

/// Collapse embedded newlines to single spaces and trim.
pub fn clean_description(cell: Option<&str>) -> String {
    cell.unwrap_or("")
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_blank_row(row: &RawRow) -> bool {
    row.iter()
        .all(|cell| cell.as_deref().map(|c| c.trim().is_empty()).unwrap_or(true))
}

// ============================================================================
// NORMALIZER
// ============================================================================

pub struct RecordNormalizer {
    date_formats: Vec<String>,
    currency_symbols: Vec<String>,
}

impl RecordNormalizer {
    pub fn new(config: &PipelineConfig) -> Self {
        RecordNormalizer {
            date_formats: config.date_formats.clone(),
            currency_symbols: config.currency_symbols.clone(),
        }
    }

    /// Convert a document's raw rows, keeping their order.
    pub fn normalize(&self, raw: &RawDocument) -> Normalized {
        let columns = column_map(&raw.header);
        let mut report = NormalizationReport {
            rows_in: raw.rows.len(),
            ..Default::default()
        };
        let mut records = Vec::with_capacity(raw.rows.len());

        for (original_order, row) in raw.rows.iter().enumerate() {
            if is_blank_row(row) {
                report.empty_rows += 1;
                continue;
            }

            let cell = move |column: usize| row[columns[column]].as_deref();

            let paid_in = self.amount(&mut report, original_order, "Paid in", cell(PAID_IN));
            let paid_out = self.amount(&mut report, original_order, "Paid out", cell(PAID_OUT));
            let balance = self.amount(&mut report, original_order, "Balance", cell(BALANCE));

            let date = match parse_date(cell(DATE), &self.date_formats) {
                Ok(date) => date,
                Err(e) => {
                    tracing::debug!(original_order, "dropping row: {}", e);
                    report.undated_rows += 1;
                    continue;
                }
            };

            let transaction_type = cell(TYPE).unwrap_or("").trim().to_string();
            let description = clean_description(cell(DESCRIPTION));

            records.push(TransactionRecord::new(
                date,
                transaction_type,
                description,
                paid_in,
                paid_out,
                balance,
                original_order,
            ));
        }

        report.records_out = records.len();
        Normalized { records, report }
    }

    fn amount(
        &self,
        report: &mut NormalizationReport,
        original_order: usize,
        field: &'static str,
        cell: Option<&str>,
    ) -> Amount {
        match parse_amount(field, cell, &self.currency_symbols) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!(original_order, "{}", e);
                report.field_issues.push(FieldIssue {
                    original_order,
                    field,
                    value: cell.unwrap_or("").to_string(),
                });
                None
            }
        }
    }
}

/// Position of each canonical column in the detected header.
///
/// Labels are matched case-insensitively; a label that is not found keeps
/// its canonical position.
fn column_map(header: &[String]) -> [usize; COLUMNS] {
    let mut map = [0usize; COLUMNS];
    for (index, canonical) in DEFAULT_HEADER.iter().enumerate() {
        map[index] = header
            .iter()
            .position(|label| label.trim().eq_ignore_ascii_case(canonical))
            .filter(|&pos| pos < COLUMNS)
            .unwrap_or(index);
    }
    map
}
