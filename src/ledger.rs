// 📚 Ledger Builder - per-document ledgers → one deduplicated master ledger
//
// Consecutive statement exports overlap at their boundaries, so the same
// transaction can appear in two documents. Duplicates are exact matches on
// the record fingerprint (date, account, description, type, amounts); the
// first occurrence in document order wins.

use crate::account::AccountIdentifier;
use crate::normalizer::{NormalizationReport, Normalized};
use crate::reader::document_name;
use crate::record::TransactionRecord;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

// ============================================================================
// DOCUMENT LEDGER
// ============================================================================

/// Records of one document with provenance attached, in row order
#[derive(Debug, Clone)]
pub struct DocumentLedger {
    pub source_file: String,
    pub source_path: String,
    pub account_number: String,
    pub records: Vec<TransactionRecord>,
    pub report: NormalizationReport,
}

impl DocumentLedger {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ============================================================================
// DUPLICATE MATCH
// ============================================================================

/// Which record survived and which one was dropped
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateMatch {
    pub fingerprint: String,
    pub date: NaiveDate,
    pub account_number: String,

    /// `source_file` and `original_order` of the surviving record
    pub kept: (String, usize),

    /// `source_file` and `original_order` of the dropped record
    pub dropped: (String, usize),
}

// ============================================================================
// MASTER LEDGER
// ============================================================================

/// Deduplicated records sorted by (account, date)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ledger {
    records: Vec<TransactionRecord>,
}

impl Ledger {
    pub fn records(&self) -> &[TransactionRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<TransactionRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct account ids, sorted
    pub fn accounts(&self) -> Vec<&str> {
        self.by_account().into_keys().collect()
    }

    /// Earliest and latest transaction date
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let min = self.records.iter().map(|r| r.date).min()?;
        let max = self.records.iter().map(|r| r.date).max()?;
        Some((min, max))
    }

    /// Records grouped per account, each group in ledger order
    pub fn by_account(&self) -> BTreeMap<&str, Vec<&TransactionRecord>> {
        let mut groups: BTreeMap<&str, Vec<&TransactionRecord>> = BTreeMap::new();
        for record in &self.records {
            groups
                .entry(record.account_number.as_str())
                .or_default()
                .push(record);
        }
        groups
    }
}

#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    pub ledger: Ledger,
    pub duplicates: Vec<DuplicateMatch>,
}

impl MergeOutcome {
    pub fn duplicates_removed(&self) -> usize {
        self.duplicates.len()
    }
}

// ============================================================================
// LEDGER BUILDER
// ============================================================================

pub struct LedgerBuilder {
    identifier: AccountIdentifier,
}

impl LedgerBuilder {
    pub fn new(identifier: AccountIdentifier) -> Self {
        LedgerBuilder { identifier }
    }

    /// Attach file name, path and account id to every record of a document.
    pub fn build_document(&self, document: &Path, normalized: Normalized) -> DocumentLedger {
        let source_file = document_name(document);
        let source_path = document.display().to_string();
        let account_number = self.identifier.identify(&source_file);

        let records = normalized
            .records
            .into_iter()
            .map(|record| record.with_provenance(&source_file, &source_path, &account_number))
            .collect();

        DocumentLedger {
            source_file,
            source_path,
            account_number,
            records,
            report: normalized.report,
        }
    }

    /// Concatenate in document order, drop duplicates, sort by (account, date).
    ///
    /// The sort is stable: records with the same account and date keep their
    /// concatenation order.
    pub fn merge(&self, documents: &[DocumentLedger]) -> MergeOutcome {
        let total: usize = documents.iter().map(DocumentLedger::len).sum();
        let records = documents.iter().flat_map(|doc| doc.records.iter().cloned());

        let outcome = dedup_and_sort(records, total);

        tracing::info!(
            documents = documents.len(),
            records_in = total,
            duplicates = outcome.duplicates.len(),
            ledger = outcome.ledger.len(),
            "merged ledger"
        );

        outcome
    }

    /// Merge an already built ledger again. Returns an equal ledger.
    pub fn remerge(&self, ledger: &Ledger) -> MergeOutcome {
        dedup_and_sort(ledger.records.iter().cloned(), ledger.len())
    }
}

impl Default for LedgerBuilder {
    fn default() -> Self {
        Self::new(AccountIdentifier::default())
    }
}

fn dedup_and_sort(
    records: impl Iterator<Item = TransactionRecord>,
    capacity: usize,
) -> MergeOutcome {
    // fingerprint → (source_file, original_order) of the first occurrence
    let mut seen: HashMap<String, (String, usize)> = HashMap::with_capacity(capacity);
    let mut kept = Vec::with_capacity(capacity);
    let mut duplicates = Vec::new();

    for record in records {
        let fingerprint = record.fingerprint();
        if let Some(first) = seen.get(&fingerprint) {
            duplicates.push(DuplicateMatch {
                fingerprint,
                date: record.date,
                account_number: record.account_number.clone(),
                kept: first.clone(),
                dropped: (record.source_file.clone(), record.original_order),
            });
            continue;
        }
        seen.insert(
            fingerprint,
            (record.source_file.clone(), record.original_order),
        );
        kept.push(record);
    }

    kept.sort_by(|a, b| {
        a.account_number
            .cmp(&b.account_number)
            .then(a.date.cmp(&b.date))
    });

    MergeOutcome {
        ledger: Ledger { records: kept },
        duplicates,
    }
}
