// 🚦 Error taxonomy - what to skip, what to degrade, what aborts the run

use chrono::NaiveDate;
use std::path::PathBuf;

/// Every failure the pipeline can report.
///
/// Only [`LedgerError::is_fatal`] errors stop a run. Everything else is
/// recovered where it happens: a document is skipped, a field degrades to a
/// missing marker, or a balance check is reported as unavailable.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// No extractable rows (or the extractor failed on this document)
    #[error("no extractable rows in {document}{}", cause_suffix(.cause))]
    EmptyDocument {
        document: String,
        cause: Option<String>,
    },

    /// A single cell failed numeric or date coercion
    #[error("cannot parse {field} value {value:?}")]
    FieldParse { field: &'static str, value: String },

    /// Not enough data to compare a balance with the next one
    #[error("cannot reconcile {account} on {date}: missing {missing}")]
    ReconciliationUnavailable {
        account: String,
        date: NaiveDate,
        missing: &'static str,
    },

    /// Input folder cannot be listed
    #[error("input location {} is not readable: {source}", .path.display())]
    InputLocation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Output directory cannot be created or is not writable
    #[error("output location {} is not usable: {source}", .path.display())]
    OutputLocation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An output artifact could not be written
    #[error("failed to write {}: {message}", .path.display())]
    Export { path: PathBuf, message: String },

    /// Bad configuration (TOML, account pattern, document pattern)
    #[error("configuration error: {0}")]
    Config(String),
}

fn cause_suffix(cause: &Option<String>) -> String {
    match cause {
        Some(c) => format!(" ({})", c),
        None => String::new(),
    }
}

impl LedgerError {
    pub fn empty(document: impl Into<String>) -> Self {
        LedgerError::EmptyDocument {
            document: document.into(),
            cause: None,
        }
    }

    pub fn empty_because(document: impl Into<String>, cause: impl Into<String>) -> Self {
        LedgerError::EmptyDocument {
            document: document.into(),
            cause: Some(cause.into()),
        }
    }

    pub fn export(path: impl Into<PathBuf>, err: anyhow::Error) -> Self {
        LedgerError::Export {
            path: path.into(),
            message: format!("{:#}", err),
        }
    }

    /// Structural failures abort the run; the rest are handled locally.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LedgerError::InputLocation { .. }
                | LedgerError::OutputLocation { .. }
                | LedgerError::Export { .. }
                | LedgerError::Config(_)
        )
    }
}
