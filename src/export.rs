// 📤 Export - per-document CSVs, combined ledger (CSV + XLSX), balance validation
//
// Column names and file names are consumed by downstream spreadsheets and
// must stay exactly as written here.

use crate::error::LedgerError;
use crate::ledger::{DocumentLedger, Ledger};
use crate::reconciliation::ReconciliationReport;
use crate::record::{format_amount, TransactionRecord, DPC_FIELDS, POS_FIELDS};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

const STATEMENT_COLUMNS: [&str; 6] = ["Date", "Type", "Description", "Paid in", "Paid out", "Balance"];

const DATE_FORMAT: &str = "%Y-%m-%d";

// ============================================================================
// OUTPUT LOCATION
// ============================================================================

/// Create the output directory and make sure files can be written into it.
pub fn ensure_output_dir(dir: &Path) -> Result<(), LedgerError> {
    let output_error = |source| LedgerError::OutputLocation {
        path: dir.to_path_buf(),
        source,
    };

    fs::create_dir_all(dir).map_err(output_error)?;

    let probe = dir.join(".statement-ledger-write-test");
    fs::write(&probe, b"").map_err(output_error)?;
    fs::remove_file(&probe).map_err(output_error)?;
    Ok(())
}

/// `<stem>.csv` for a source document
pub fn document_csv_name(source_file: &str) -> String {
    let stem = Path::new(source_file)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(source_file);
    format!("{}.csv", stem)
}

// ============================================================================
// HEADERS
// ============================================================================

fn part_columns() -> Vec<String> {
    let dpc = (1..=DPC_FIELDS).map(|i| format!("DPC{}", i));
    let pos = (1..=POS_FIELDS).map(|i| format!("POS{}", i));
    dpc.chain(pos).collect()
}

pub fn document_header() -> Vec<String> {
    let mut header: Vec<String> = STATEMENT_COLUMNS.iter().map(|s| s.to_string()).collect();
    header.extend(
        ["File_Path", "Source_File", "Account_Number", "Original_Order"]
            .iter()
            .map(|s| s.to_string()),
    );
    header.extend(part_columns());
    header
}

pub fn combined_header() -> Vec<String> {
    let mut header: Vec<String> = ["Account_Number", "File_Path", "Source_File"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    header.extend(STATEMENT_COLUMNS.iter().map(|s| s.to_string()));
    header.push("Original_Order".to_string());
    header.extend(part_columns());
    header
}

pub fn validation_header() -> Vec<String> {
    [
        "Account_Number",
        "Date",
        "Type",
        "Description",
        "Paid in",
        "Paid out",
        "Balance",
        "Source_File",
        "Original_Order",
        "Next_Balance",
        "Expected_Next_Balance",
        "Balance_Delta",
        "Has_Discrepancy",
        "Check_Status",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

// ============================================================================
// ROW PROJECTIONS
// ============================================================================

fn statement_fields(record: &TransactionRecord) -> Vec<String> {
    vec![
        record.date.format(DATE_FORMAT).to_string(),
        record.transaction_type.clone(),
        record.description.clone(),
        format_amount(&record.paid_in),
        format_amount(&record.paid_out),
        format_amount(&record.balance),
    ]
}

fn part_fields(record: &TransactionRecord) -> impl Iterator<Item = String> + '_ {
    record.dpc.iter().chain(record.pos.iter()).cloned()
}

fn document_row(record: &TransactionRecord) -> Vec<String> {
    let mut row = statement_fields(record);
    row.push(record.source_path.clone());
    row.push(record.source_file.clone());
    row.push(record.account_number.clone());
    row.push(record.original_order.to_string());
    row.extend(part_fields(record));
    row
}

fn combined_row(record: &TransactionRecord) -> Vec<String> {
    let mut row = vec![
        record.account_number.clone(),
        record.source_path.clone(),
        record.source_file.clone(),
    ];
    row.extend(statement_fields(record));
    row.push(record.original_order.to_string());
    row.extend(part_fields(record));
    row
}

fn bool_field(value: Option<bool>) -> String {
    match value {
        Some(true) => "True".to_string(),
        Some(false) => "False".to_string(),
        None => String::new(),
    }
}

// ============================================================================
// CSV WRITERS
// ============================================================================

fn write_csv<I>(path: &Path, header: &[String], rows: I) -> Result<()>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::NonNumeric)
        .from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    writer.write_record(header).context("Failed to write header")?;
    for row in rows {
        writer.write_record(&row).context("Failed to write row")?;
    }
    writer.flush().context("Failed to flush CSV")?;
    Ok(())
}

/// One document's records in extraction order, as `<dir>/<stem>.csv`.
pub fn write_document_csv(dir: &Path, document: &DocumentLedger) -> Result<PathBuf, LedgerError> {
    let path = dir.join(document_csv_name(&document.source_file));

    let mut records: Vec<&TransactionRecord> = document.records.iter().collect();
    records.sort_by_key(|r| r.original_order);

    write_csv(&path, &document_header(), records.into_iter().map(document_row))
        .map_err(|e| LedgerError::export(&path, e))?;

    tracing::debug!(path = %path.display(), records = document.len(), "wrote document CSV");
    Ok(path)
}

pub fn write_combined_csv(path: &Path, ledger: &Ledger) -> Result<(), LedgerError> {
    write_csv(path, &combined_header(), ledger.records().iter().map(combined_row))
        .map_err(|e| LedgerError::export(path, e))?;

    tracing::info!(path = %path.display(), records = ledger.len(), "wrote combined ledger");
    Ok(())
}

pub fn write_validation_csv(path: &Path, report: &ReconciliationReport<'_>) -> Result<(), LedgerError> {
    let rows = report.rows.iter().map(|row| {
        let record = row.record;
        vec![
            record.account_number.clone(),
            record.date.format(DATE_FORMAT).to_string(),
            record.transaction_type.clone(),
            record.description.clone(),
            format_amount(&record.paid_in),
            format_amount(&record.paid_out),
            format_amount(&record.balance),
            record.source_file.clone(),
            record.original_order.to_string(),
            format_amount(&row.next_balance),
            format_amount(&row.expected_next_balance),
            format_amount(&row.balance_delta),
            bool_field(row.has_discrepancy),
            row.status.label().to_string(),
        ]
    });

    write_csv(path, &validation_header(), rows).map_err(|e| LedgerError::export(path, e))?;

    tracing::info!(path = %path.display(), rows = report.rows.len(), "wrote balance validation");
    Ok(())
}

// ============================================================================
// XLSX WRITER
// ============================================================================

#[cfg(feature = "xlsx")]
mod xlsx {
    use super::*;
    use bigdecimal::ToPrimitive;
    use chrono::{Datelike, NaiveDate};
    use rust_xlsxwriter::{Format, Workbook, Worksheet};

    // 1899-12-30 counted from 0001-01-01; Excel's serial day zero
    const EXCEL_EPOCH_DAYS: i32 = 693_594;

    fn excel_serial(date: NaiveDate) -> f64 {
        f64::from(date.num_days_from_ce() - EXCEL_EPOCH_DAYS)
    }

    fn write_amount(
        sheet: &mut Worksheet,
        row: u32,
        col: u16,
        amount: &crate::record::Amount,
        format: &Format,
    ) -> Result<()> {
        if let Some(value) = amount.as_ref().and_then(|v| v.to_f64()) {
            sheet.write_number_with_format(row, col, value, format)?;
        }
        Ok(())
    }

    pub(super) fn write(path: &Path, ledger: &Ledger) -> Result<()> {
        let mut workbook = Workbook::new();
        let bold = Format::new().set_bold();
        let date_format = Format::new().set_num_format("yyyy-mm-dd");
        let money = Format::new().set_num_format("0.00");

        let sheet = workbook.add_worksheet();
        sheet.set_name("Transactions")?;

        for (col, label) in combined_header().iter().enumerate() {
            sheet.write_string_with_format(0, col as u16, label, &bold)?;
        }

        for (index, record) in ledger.records().iter().enumerate() {
            let row = index as u32 + 1;
            sheet.write_string(row, 0, &record.account_number)?;
            sheet.write_string(row, 1, &record.source_path)?;
            sheet.write_string(row, 2, &record.source_file)?;
            sheet.write_number_with_format(row, 3, excel_serial(record.date), &date_format)?;
            sheet.write_string(row, 4, &record.transaction_type)?;
            sheet.write_string(row, 5, &record.description)?;
            write_amount(sheet, row, 6, &record.paid_in, &money)?;
            write_amount(sheet, row, 7, &record.paid_out, &money)?;
            write_amount(sheet, row, 8, &record.balance, &money)?;
            sheet.write_number(row, 9, record.original_order as f64)?;
            for (offset, part) in record.dpc.iter().chain(record.pos.iter()).enumerate() {
                if !part.is_empty() {
                    sheet.write_string(row, 10 + offset as u16, part)?;
                }
            }
        }

        sheet.set_column_width(3, 12)?;
        sheet.set_column_width(5, 48)?;

        workbook
            .save(path)
            .with_context(|| format!("Failed to save XLSX file: {}", path.display()))?;
        Ok(())
    }

}

/// Spreadsheet mirror of the combined ledger.
#[cfg(feature = "xlsx")]
pub fn write_combined_xlsx(path: &Path, ledger: &Ledger) -> Result<(), LedgerError> {
    xlsx::write(path, ledger).map_err(|e| LedgerError::export(path, e))?;
    tracing::info!(path = %path.display(), records = ledger.len(), "wrote combined spreadsheet");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerBuilder;
    use crate::normalizer::{NormalizationReport, Normalized};
    use crate::reconciliation::BalanceReconciler;
    use bigdecimal::BigDecimal;
    use chrono::NaiveDate;
    use std::str::FromStr;

    const FILE: &str = "Transactions--601730-01606158--01-01-2024-31-01-2024.pdf";

    fn money(s: &str) -> Option<BigDecimal> {
        Some(BigDecimal::from_str(s).unwrap())
    }

    fn document() -> DocumentLedger {
        let records = vec![
            TransactionRecord::new(
                NaiveDate::from_ymd_opt(2024, 1, 6).unwrap(),
                "POS".to_string(),
                "1234 05JAN24, TESCO \"EXPRESS\"".to_string(),
                money("0"),
                money("10"),
                None,
                3,
            ),
            TransactionRecord::new(
                NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
                "DPC".to_string(),
                "A, B, C, D, E".to_string(),
                money("0.00"),
                money("10.00"),
                money("90.00"),
                0,
            ),
        ];
        let normalized = Normalized {
            records,
            report: NormalizationReport::default(),
        };
        LedgerBuilder::default().build_document(&Path::new("/in").join(FILE), normalized)
    }

    #[test]
    fn test_headers_are_exact() {
        assert_eq!(
            document_header().join(","),
            "Date,Type,Description,Paid in,Paid out,Balance,File_Path,Source_File,Account_Number,Original_Order,DPC1,DPC2,DPC3,DPC4,DPC5,POS1,POS2,POS3,POS4"
        );
        assert_eq!(
            combined_header().join(","),
            "Account_Number,File_Path,Source_File,Date,Type,Description,Paid in,Paid out,Balance,Original_Order,DPC1,DPC2,DPC3,DPC4,DPC5,POS1,POS2,POS3,POS4"
        );
        assert_eq!(validation_header().len(), 14);
    }

    #[test]
    fn test_document_csv_name() {
        assert_eq!(document_csv_name(FILE), "Transactions--601730-01606158--01-01-2024-31-01-2024.csv");
        assert_eq!(document_csv_name("plain"), "plain.csv");
    }

    #[test]
    fn test_document_csv_is_in_original_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_document_csv(dir.path(), &document()).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("\"Date\",\"Type\""));
        assert!(lines[1].starts_with("\"2024-01-05\",\"DPC\",\"A, B, C, D, E\",0.00,10.00,90.00,"));
        assert!(lines[1].contains("\"601730-01606158\",0,\"A\",\"B\",\"C\",\"D\",\"E\""));
        // embedded quotes are doubled
        assert!(lines[2].contains("\"TESCO \"\"EXPRESS\"\"\",0.00,10.00,"));
    }

    #[test]
    fn test_combined_and_validation_csv() {
        let dir = tempfile::tempdir().unwrap();
        let builder = LedgerBuilder::default();
        let ledger = builder.merge(&[document()]).ledger;
        let report = BalanceReconciler::new().reconcile(&ledger);

        let combined = dir.path().join("all_transactions_combined.csv");
        write_combined_csv(&combined, &ledger).unwrap();
        let mut reader = csv::Reader::from_path(&combined).unwrap();
        assert_eq!(reader.headers().unwrap().len(), 19);
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][0], "601730-01606158");
        assert_eq!(&rows[0][3], "2024-01-05");

        let validation = dir.path().join("balance_validation.csv");
        write_validation_csv(&validation, &report).unwrap();
        let mut reader = csv::Reader::from_path(&validation).unwrap();
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][12], "");
        assert_eq!(&rows[0][13], "Unavailable");
        assert_eq!(&rows[1][9], "");
        assert_eq!(&rows[1][13], "Closing");
    }

    #[test]
    fn test_validation_booleans() {
        assert_eq!(bool_field(Some(true)), "True");
        assert_eq!(bool_field(Some(false)), "False");
        assert_eq!(bool_field(None), "");
    }

    #[test]
    fn test_unwritable_output_location() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        fs::write(&file, b"x").unwrap();

        let err = ensure_output_dir(&file.join("out")).unwrap_err();
        assert!(matches!(err, LedgerError::OutputLocation { .. }));
        assert!(err.is_fatal());
    }

    #[cfg(feature = "xlsx")]
    #[test]
    fn test_combined_xlsx_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = LedgerBuilder::default().merge(&[document()]).ledger;
        let path = dir.path().join("all_transactions_combined.xlsx");

        write_combined_xlsx(&path, &ledger).unwrap();

        let bytes = fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"PK"), "xlsx is a zip container");
    }
}
