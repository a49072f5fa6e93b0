// Statement Ledger - Core Library
// Bank statement tables → deduplicated, balance-checked transaction ledger

pub mod account;
pub mod config;
pub mod error;
pub mod export;
pub mod ledger;
pub mod normalizer;
pub mod pipeline;
pub mod reader;
pub mod reconciliation;
pub mod record;

// Re-export commonly used types
pub use account::{AccountIdentifier, UNKNOWN_ACCOUNT};
pub use config::{OutputNames, PipelineConfig};
pub use error::LedgerError;
pub use ledger::{DocumentLedger, DuplicateMatch, Ledger, LedgerBuilder, MergeOutcome};
pub use normalizer::{FieldIssue, NormalizationReport, Normalized, RecordNormalizer};
pub use pipeline::{discover_documents, Pipeline, PipelineEvent, RunSummary, SkippedDocument};
pub use reader::{JsonGridExtractor, PageTable, RawDocument, RawRow, RawTableReader, TableExtractor};
pub use reconciliation::{
    AccountSummary, BalanceReconciler, CheckStatus, ReconciliationReport, ReconciliationRow,
};
pub use record::{Amount, TransactionRecord};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
